use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::CloudClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub flavor: FlavorRef,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlavorRef {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: Vec<Server>,
}

#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub filter: Option<String>,
    pub limit: Option<u32>,
}

pub fn list(client: &CloudClient, args: &ListArgs) -> anyhow::Result<Vec<Server>> {
    let url = format!(
        "{}/v2.1/{}/servers/detail",
        client.service_endpoint("ecs"),
        client.project_id()?
    );

    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(name) = &args.filter {
        query.push(("name", name.clone()));
    }
    if let Some(limit) = args.limit {
        query.push(("limit", limit.to_string()));
    }

    let value = client.get(&url, &query)?;
    let response: ServersResponse =
        serde_json::from_value(value).context("unexpected servers response shape")?;
    Ok(response.servers)
}

pub fn start_server(client: &CloudClient, name: &str) -> anyhow::Result<()> {
    server_action(client, name, json!({ "os-start": null }))
}

pub fn stop_server(client: &CloudClient, name: &str) -> anyhow::Result<()> {
    server_action(client, name, json!({ "os-stop": { "type": "SOFT" } }))
}

fn server_action(client: &CloudClient, name: &str, body: serde_json::Value) -> anyhow::Result<()> {
    let server = find_by_name(client, name)?;
    let url = format!(
        "{}/v2.1/{}/servers/{}/action",
        client.service_endpoint("ecs"),
        client.project_id()?,
        server.id
    );
    client.post(&url, &body)?;
    Ok(())
}

fn find_by_name(client: &CloudClient, name: &str) -> anyhow::Result<Server> {
    let servers = list(
        client,
        &ListArgs {
            filter: Some(name.to_string()),
            limit: None,
        },
    )?;

    // The name query is a substring filter server-side; insist on an
    // exact match before acting on anything.
    let mut exact = servers.into_iter().filter(|s| s.name == name);
    let server = exact
        .next()
        .with_context(|| format!("no ECS server named '{name}'"))?;
    if exact.next().is_some() {
        anyhow::bail!("multiple ECS servers named '{name}'; refusing to pick one");
    }
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servers_response_parses_the_fields_the_views_use() {
        let payload = json!({
            "servers": [{
                "id": "srv-1",
                "name": "web-1",
                "status": "ACTIVE",
                "flavor": { "id": "s3.medium.2", "links": [] },
                "created": "2024-06-01T10:20:30Z",
                "metadata": { "ignored": "yes" }
            }]
        });

        let response: ServersResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(response.servers.len(), 1);
        let server = &response.servers[0];
        assert_eq!(server.id, "srv-1");
        assert_eq!(server.flavor.id, "s3.medium.2");
        assert!(server.created.is_some());
    }

    #[test]
    fn missing_optional_fields_do_not_break_parsing() {
        let payload = json!({
            "servers": [{ "id": "srv-2", "name": "bare", "status": "SHUTOFF" }]
        });
        let response: ServersResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(response.servers[0].flavor.id, "");
        assert!(response.servers[0].created.is_none());
    }
}
