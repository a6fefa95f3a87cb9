use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::client::CloudClient;
use crate::formats::{self, col, OutputFormat, View};
use crate::login::{self, LoginArgs, LoginFlags};
use crate::services::{cce, ecs, rds};
use crate::storage::{resolve_from_env, CommonFlags, ConfigStore, EffectiveConfig};

fn open_store() -> Result<ConfigStore> {
    ConfigStore::from_default_location()
}

fn resolve_effective(store: &ConfigStore, common: &CommonFlags) -> Result<EffectiveConfig> {
    let clouds = store.load()?;
    Ok(resolve_from_env(common, &clouds))
}

fn service_client(common: &CommonFlags) -> Result<CloudClient> {
    let store = open_store()?;
    let effective = resolve_effective(&store, common)?;
    CloudClient::new(&effective)
}

// -- login --------------------------------------------------------------------

pub fn cmd_login(common: &CommonFlags, flags: &LoginFlags) -> Result<()> {
    let store = open_store()?;
    let effective = resolve_effective(&store, common)?;
    let args = LoginArgs::resolve(flags, &effective)?;

    login::run_login(
        &store,
        &effective,
        &args,
        &login::harvest::PollConfig::default(),
    )
}

// -- clouds -------------------------------------------------------------------

#[derive(Serialize)]
struct CloudRow {
    cloud: String,
    region: String,
    auth_type: String,
    project: String,
    expires_at: String,
}

pub fn cmd_clouds_list(format: OutputFormat) -> Result<()> {
    let store = open_store()?;
    let clouds = store.load()?;

    if clouds.clouds.is_empty() {
        eprintln!("No clouds configured. Run `ssokey login` to get started.");
        return Ok(());
    }

    let selected = clouds.selected_cloud.as_deref().unwrap_or("");
    let rows: Vec<CloudRow> = clouds
        .clouds
        .iter()
        .map(|(name, profile)| {
            let marker = if name == selected { " *" } else { "" };
            CloudRow {
                cloud: format!("{name}{marker}"),
                region: profile.region_name.clone().unwrap_or_default(),
                auth_type: profile.auth_type.clone().unwrap_or_default(),
                project: profile.auth.project_name.clone().unwrap_or_default(),
                expires_at: profile.auth.expires_at.clone().unwrap_or_default(),
            }
        })
        .collect();

    let view = View {
        columns: vec![
            col("Cloud", |r: &CloudRow| r.cloud.clone()),
            col("Region", |r: &CloudRow| r.region.clone()),
            col("Auth Type", |r: &CloudRow| r.auth_type.clone()),
            col("Project", |r: &CloudRow| r.project.clone()),
            col("Credentials Expire", |r: &CloudRow| r.expires_at.clone()),
        ],
    };
    formats::print_formatted(format, &rows, &view)
}

/// Prints one profile as it would appear in the clouds file. Secrets are
/// the point of the store, so nothing is masked; this reads the same
/// file the user already owns.
pub fn cmd_clouds_show(common: &CommonFlags, name: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let name = match name {
        Some(n) => n.to_string(),
        None => resolve_effective(&store, common)?.cloud_name,
    };

    let profile = store
        .profile(&name)?
        .ok_or(crate::error::Error::ProfileNotFound(name.clone()))?;
    print!("{}", serde_yaml_ng::to_string(&profile)?);
    Ok(())
}

// -- ecs ----------------------------------------------------------------------

pub fn cmd_ecs_list(
    common: &CommonFlags,
    filter: Option<String>,
    limit: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let client = service_client(common)?;
    let servers = ecs::list(&client, &ecs::ListArgs { filter, limit })?;

    if servers.is_empty() {
        eprintln!("No ECS servers found");
        return Ok(());
    }
    formats::print_formatted(format, &servers, &servers_view())
}

pub fn cmd_ecs_start(common: &CommonFlags, name: &str) -> Result<()> {
    let client = service_client(common)?;
    ecs::start_server(&client, name)?;
    eprintln!("Start requested for ECS server '{name}'");
    Ok(())
}

pub fn cmd_ecs_stop(common: &CommonFlags, name: &str) -> Result<()> {
    let client = service_client(common)?;
    ecs::stop_server(&client, name)?;
    eprintln!("Stop requested for ECS server '{name}'");
    Ok(())
}

fn servers_view() -> View<ecs::Server> {
    View {
        columns: vec![
            col("ID", |s: &ecs::Server| s.id.clone()),
            col("Name", |s: &ecs::Server| s.name.clone()),
            col("Status", |s: &ecs::Server| s.status.clone()),
            col("Flavor", |s: &ecs::Server| s.flavor.id.clone()),
            col("Created At", |s: &ecs::Server| {
                s.created.map(|t| t.to_rfc3339()).unwrap_or_default()
            }),
        ],
    }
}

// -- cce ----------------------------------------------------------------------

pub fn cmd_cce_list(common: &CommonFlags, format: OutputFormat) -> Result<()> {
    let client = service_client(common)?;
    let clusters = cce::list(&client)?;

    if clusters.is_empty() {
        eprintln!("No CCE clusters found");
        return Ok(());
    }
    formats::print_formatted(format, &clusters, &clusters_view())
}

pub fn cmd_cce_config(common: &CommonFlags, cluster: &str, output: Option<&Path>) -> Result<()> {
    let client = service_client(common)?;
    let kubeconfig = cce::cluster_cert(&client, cluster, -1)?;
    let rendered = serde_json::to_string_pretty(&kubeconfig)?;

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            eprintln!("Kubeconfig written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn clusters_view() -> View<cce::Cluster> {
    View {
        columns: vec![
            col("ID", |c: &cce::Cluster| c.metadata.uid.clone()),
            col("Name", |c: &cce::Cluster| c.metadata.name.clone()),
            col("Status", |c: &cce::Cluster| c.status.phase.clone()),
            col("Version", |c: &cce::Cluster| c.spec.version.clone()),
        ],
    }
}

// -- rds ----------------------------------------------------------------------

pub fn cmd_rds_list(
    common: &CommonFlags,
    filter: Option<String>,
    limit: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let client = service_client(common)?;
    let instances = rds::list(&client, &rds::ListArgs { filter, limit })?;

    if instances.is_empty() {
        eprintln!("No RDS instances found");
        return Ok(());
    }
    formats::print_formatted(format, &instances, &instances_view())
}

fn instances_view() -> View<rds::Instance> {
    View {
        columns: vec![
            col("ID", |i: &rds::Instance| i.id.clone()),
            col("Name", |i: &rds::Instance| i.name.clone()),
            col("Status", |i: &rds::Instance| i.status.clone()),
            col("Datastore Type", |i: &rds::Instance| i.datastore.kind.clone()),
            col("Datastore Version", |i: &rds::Instance| {
                i.datastore.version.clone()
            }),
        ],
    }
}
