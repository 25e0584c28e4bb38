use reqwest::Url;
use serde::Deserialize;

use crate::{
    request_executor::RequestExecutorError,
    server_node::{ServerNode, ServerRole},
    topology::Topology,
};

/// Wire form of `GET /topology?name=<db>`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseTopologyInfo {
    pub nodes: Vec<ServerNodeInfo>,
    pub etag: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerNodeInfo {
    pub url: Url,
    pub database: String,
    pub cluster_tag: Option<String>,
    #[serde(default)]
    pub server_role: ServerRole,
}

impl TryFrom<DatabaseTopologyInfo> for Topology {
    type Error = RequestExecutorError;

    /// An empty node list is a malformed response, not "no nodes": a cached
    /// topology must never become empty.
    fn try_from(info: DatabaseTopologyInfo) -> Result<Self, Self::Error> {
        if info.nodes.is_empty() {
            return Err(RequestExecutorError::InvalidServerResponse(
                "topology response contains no nodes".to_string(),
            ));
        }

        let nodes = info
            .nodes
            .into_iter()
            .map(|n| ServerNode {
                url: n.url,
                database: n.database,
                cluster_tag: n.cluster_tag,
                server_role: n.server_role,
            })
            .collect();

        Ok(Topology::new(info.etag, nodes))
    }
}

#[cfg(test)]
mod tests {
    use crate::{request_executor::RequestExecutorError, topology::Topology};

    use super::DatabaseTopologyInfo;

    #[test]
    fn decodes_server_payload_into_ordered_topology() {
        let payload = serde_json::json!({
            "Nodes": [
                {"Url": "http://a.cluster:8080", "Database": "northwind", "ClusterTag": "A", "ServerRole": "Member"},
                {"Url": "http://b.cluster:8080", "Database": "northwind", "ClusterTag": "B", "ServerRole": "Rehab"}
            ],
            "Etag": 42
        });

        let info: DatabaseTopologyInfo = serde_json::from_value(payload).unwrap();
        let topology = Topology::try_from(info).unwrap();

        assert_eq!(topology.etag, 42);
        assert_eq!(topology.nodes.len(), 2);
        assert_eq!(topology.nodes[0].cluster_tag.as_deref(), Some("A"));
        assert_eq!(topology.nodes[1].url.as_str(), "http://b.cluster:8080/");
    }

    #[test]
    fn empty_node_list_is_an_invalid_response() {
        let payload = serde_json::json!({"Nodes": [], "Etag": 1});

        let info: DatabaseTopologyInfo = serde_json::from_value(payload).unwrap();
        let result = Topology::try_from(info);

        assert!(matches!(
            result,
            Err(RequestExecutorError::InvalidServerResponse(_))
        ));
    }
}
