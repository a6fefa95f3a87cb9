use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::client::CloudClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub datastore: Datastore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Datastore {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct InstancesResponse {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub filter: Option<String>,
    pub limit: Option<u32>,
}

pub fn list(client: &CloudClient, args: &ListArgs) -> anyhow::Result<Vec<Instance>> {
    let url = format!(
        "{}/v3/{}/instances",
        client.service_endpoint("rds"),
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
    let response: InstancesResponse =
        serde_json::from_value(value).context("unexpected instances response shape")?;
    Ok(response.instances)
}
