use std::io::Write;

use anyhow::Context;
use prettytable::format::consts::FORMAT_BOX_CHARS;
use prettytable::{Cell, Row, Table};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Column layout for the table renderer. JSON and YAML ignore the view
/// and serialize the rows as-is.
pub struct View<T> {
    pub columns: Vec<Column<T>>,
}

pub struct Column<T> {
    pub name: &'static str,
    pub value: Box<dyn Fn(&T) -> String>,
}

/// Column from a getter; anything Display works as a cell.
pub fn col<T, V, F>(name: &'static str, getter: F) -> Column<T>
where
    V: std::fmt::Display,
    F: Fn(&T) -> V + 'static,
{
    Column {
        name,
        value: Box::new(move |row| getter(row).to_string()),
    }
}

pub fn print_formatted<T: Serialize>(
    format: OutputFormat,
    rows: &[T],
    view: &View<T>,
) -> anyhow::Result<()> {
    render(&mut std::io::stdout(), format, rows, view)
}

pub fn render<W, T>(w: &mut W, format: OutputFormat, rows: &[T], view: &View<T>) -> anyhow::Result<()>
where
    W: Write,
    T: Serialize,
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(rows).context("unable to marshal rows")?;
            writeln!(w, "{json}")?;
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml_ng::to_string(rows).context("unable to marshal rows")?;
            write!(w, "{yaml}")?;
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_format(*FORMAT_BOX_CHARS);
            table.set_titles(Row::new(
                view.columns.iter().map(|c| Cell::new(c.name)).collect(),
            ));
            for row in rows {
                table.add_row(Row::new(
                    view.columns
                        .iter()
                        .map(|c| Cell::new(&(c.value)(row)))
                        .collect(),
                ));
            }
            table.print(w).context("unable to render table")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Item {
        name: String,
        count: u32,
    }

    fn rows() -> Vec<Item> {
        vec![
            Item {
                name: "alpha".into(),
                count: 3,
            },
            Item {
                name: "beta".into(),
                count: 7,
            },
        ]
    }

    fn view() -> View<Item> {
        View {
            columns: vec![
                col("Name", |i: &Item| i.name.clone()),
                col("Count", |i: &Item| i.count),
            ],
        }
    }

    #[test]
    fn json_output_is_the_serialized_rows() {
        let mut out = Vec::new();
        render(&mut out, OutputFormat::Json, &rows(), &view()).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["name"], "alpha");
        assert_eq!(parsed[1]["count"], 7);
    }

    #[test]
    fn yaml_output_round_trips() {
        let mut out = Vec::new();
        render(&mut out, OutputFormat::Yaml, &rows(), &view()).unwrap();
        let parsed: Vec<serde_yaml_ng::Value> =
            serde_yaml_ng::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn table_output_uses_the_view_columns() {
        let mut out = Vec::new();
        render(&mut out, OutputFormat::Table, &rows(), &view()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Name"));
        assert!(text.contains("Count"));
        assert!(text.contains("alpha"));
        assert!(text.contains('7'));
    }
}
