use reqwest::Url;
use serde::Deserialize;

use crate::cluster_topology::ClusterTopologyInfo;

/// One member of a database cluster. Value type, immutable after
/// construction, freely copied around the executor and selector.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ServerNode {
    pub url: Url,
    pub database: String,
    pub cluster_tag: Option<String>,
    pub server_role: ServerRole,
}

impl ServerNode {
    pub fn new(url: Url, database: String) -> Self {
        Self {
            url,
            database,
            cluster_tag: None,
            server_role: ServerRole::default(),
        }
    }

    pub fn with_tag(url: Url, database: String, cluster_tag: String) -> Self {
        Self {
            url,
            database,
            cluster_tag: Some(cluster_tag),
            server_role: ServerRole::default(),
        }
    }
}

/// Builds the node list for a cluster-wide topology response. Nodes are
/// ordered by cluster tag so the preference order is stable across calls;
/// the `database` field stays empty because the cluster topology is not
/// scoped to any one database.
pub fn create_server_nodes_from_cluster_topology(topology: &ClusterTopologyInfo) -> Vec<ServerNode> {
    let mut tags: Vec<&String> = topology.topology.all_nodes.keys().collect();
    tags.sort();

    tags.into_iter()
        .map(|tag| {
            let url = topology.topology.all_nodes[tag].clone();
            let server_role = if topology.topology.members.contains_key(tag) {
                ServerRole::Member
            } else if topology.topology.promotables.contains_key(tag) {
                ServerRole::Promotable
            } else {
                ServerRole::None
            };
            ServerNode {
                url,
                database: String::default(),
                cluster_tag: Some(tag.clone()),
                server_role,
            }
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Deserialize)]
pub enum ServerRole {
    #[default]
    None,
    Promotable,
    Member,
    Rehab,
}

/// A cluster tag normalized at the boundary: commands that target a
/// specific node accept either a [`ServerNode`] or a raw tag string and
/// both collapse to this one type, so no call site branches on shape.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NodeTag(String);

impl NodeTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&ServerNode> for NodeTag {
    fn from(node: &ServerNode) -> Self {
        NodeTag(node.cluster_tag.clone().unwrap_or_default())
    }
}

impl From<&str> for NodeTag {
    fn from(tag: &str) -> Self {
        NodeTag(tag.to_string())
    }
}

impl From<String> for NodeTag {
    fn from(tag: String) -> Self {
        NodeTag(tag)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Url;

    use super::{NodeTag, ServerNode};

    #[test]
    fn node_tag_normalizes_server_node_and_raw_string_the_same_way() {
        let node = ServerNode::with_tag(
            Url::parse("http://localhost:8080").unwrap(),
            "northwind".to_string(),
            "B".to_string(),
        );

        assert_eq!(NodeTag::from(&node), NodeTag::from("B"));
    }

    #[test]
    fn node_tag_from_untagged_node_is_empty() {
        let node = ServerNode::new(
            Url::parse("http://localhost:8080").unwrap(),
            "northwind".to_string(),
        );

        assert_eq!(NodeTag::from(&node).as_str(), "");
    }
}
