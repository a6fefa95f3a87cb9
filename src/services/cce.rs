use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::CloudClient;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub metadata: ClusterMetadata,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterMetadata {
    #[serde(default)]
    pub uid: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSpec {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: String,
}

#[derive(Debug, Deserialize)]
struct ClustersResponse {
    #[serde(default)]
    items: Vec<Cluster>,
}

pub fn list(client: &CloudClient) -> anyhow::Result<Vec<Cluster>> {
    let url = format!(
        "{}/api/v3/projects/{}/clusters",
        client.service_endpoint("cce"),
        client.project_id()?
    );
    let value = client.get(&url, &[])?;
    let response: ClustersResponse =
        serde_json::from_value(value).context("unexpected clusters response shape")?;
    Ok(response.items)
}

/// Kubeconfig for one cluster, addressed by name. A negative duration
/// asks for a certificate that does not expire.
pub fn cluster_cert(
    client: &CloudClient,
    cluster_name: &str,
    duration_days: i64,
) -> anyhow::Result<serde_json::Value> {
    let cluster = list(client)?
        .into_iter()
        .find(|c| c.metadata.name == cluster_name)
        .with_context(|| format!("cluster '{cluster_name}' not found"))?;

    let url = format!(
        "{}/api/v3/projects/{}/clusters/{}/clustercert",
        client.service_endpoint("cce"),
        client.project_id()?,
        cluster.metadata.uid
    );
    client
        .post(&url, &json!({ "duration": duration_days }))
        .with_context(|| format!("unable to retrieve kubeconfig for '{cluster_name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clusters_response_parses_the_fields_the_views_use() {
        let payload = json!({
            "kind": "Cluster",
            "items": [{
                "metadata": { "uid": "c-1", "name": "prod-cluster" },
                "spec": { "version": "v1.29", "type": "VirtualMachine" },
                "status": { "phase": "Available" }
            }]
        });

        let response: ClustersResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(response.items.len(), 1);
        let cluster = &response.items[0];
        assert_eq!(cluster.metadata.name, "prod-cluster");
        assert_eq!(cluster.spec.version, "v1.29");
        assert_eq!(cluster.status.phase, "Available");
    }

    #[test]
    fn an_empty_listing_has_no_items() {
        let response: ClustersResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.items.is_empty());
    }
}
