use std::collections::HashMap;

use reqwest::Url;
use serde::Deserialize;

use crate::{
    request_executor::RequestExecutorError, server_node::create_server_nodes_from_cluster_topology,
    topology::Topology,
};

/// Wire form of `GET /cluster/topology`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterTopologyInfo {
    pub topology: ClusterTopology,
    pub etag: i64,
    #[serde(default)]
    pub leader: String,
    #[serde(default)]
    pub current_state: String,
    #[serde(default)]
    pub node_tag: String,
    #[serde(default)]
    pub status: HashMap<String, NodeStatus>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterTopology {
    #[serde(default)]
    pub topology_id: String,
    pub all_nodes: HashMap<String, Url>,
    #[serde(default)]
    pub members: HashMap<String, Url>,
    #[serde(default)]
    pub promotables: HashMap<String, Url>,
    #[serde(default)]
    pub watchers: HashMap<String, Url>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct NodeStatus {
    pub name: Option<String>,
    #[serde(default)]
    pub connected: bool,
    pub error_details: Option<String>,
}

impl TryFrom<ClusterTopologyInfo> for Topology {
    type Error = RequestExecutorError;

    fn try_from(info: ClusterTopologyInfo) -> Result<Self, Self::Error> {
        if info.topology.all_nodes.is_empty() {
            return Err(RequestExecutorError::InvalidServerResponse(
                "cluster topology response contains no nodes".to_string(),
            ));
        }

        let nodes = create_server_nodes_from_cluster_topology(&info);
        Ok(Topology::new(info.etag, nodes))
    }
}

#[cfg(test)]
mod tests {
    use crate::{server_node::ServerRole, topology::Topology};

    use super::ClusterTopologyInfo;

    #[test]
    fn converts_cluster_payload_into_tag_ordered_nodes() {
        let payload = serde_json::json!({
            "Topology": {
                "TopologyId": "0a28ed2b",
                "AllNodes": {
                    "B": "http://b.cluster:8080",
                    "A": "http://a.cluster:8080",
                    "C": "http://c.cluster:8080"
                },
                "Members": {"A": "http://a.cluster:8080", "B": "http://b.cluster:8080"},
                "Promotables": {"C": "http://c.cluster:8080"},
                "Watchers": {}
            },
            "Etag": 9,
            "Leader": "A",
            "NodeTag": "A"
        });

        let info: ClusterTopologyInfo = serde_json::from_value(payload).unwrap();
        let topology = Topology::try_from(info).unwrap();

        assert_eq!(topology.etag, 9);
        let tags: Vec<_> = topology
            .nodes
            .iter()
            .map(|n| n.cluster_tag.clone().unwrap())
            .collect();
        assert_eq!(tags, vec!["A", "B", "C"]);
        assert_eq!(topology.nodes[0].server_role, ServerRole::Member);
        assert_eq!(topology.nodes[2].server_role, ServerRole::Promotable);
    }
}
