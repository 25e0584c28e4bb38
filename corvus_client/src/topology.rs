use crate::server_node::ServerNode;

/// Versioned membership list for one database. `nodes` is the preference
/// order for untagged selection and is never empty once a topology has been
/// fetched; decoding enforces that. A topology is never mutated in place,
/// only replaced wholesale when a higher etag arrives.
#[derive(Debug, Clone)]
pub struct Topology {
    pub etag: i64,
    pub nodes: Vec<ServerNode>,
}

impl Topology {
    pub fn new(etag: i64, nodes: Vec<ServerNode>) -> Self {
        Self { etag, nodes }
    }

    /// A topology replaces another only when its etag is strictly greater.
    /// Guards against a slow, stale response from one node overwriting a
    /// fresher topology already obtained from another.
    pub fn supersedes(&self, other: &Topology) -> bool {
        self.etag > other.etag
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Url;

    use crate::server_node::ServerNode;

    use super::Topology;

    fn node(port: u16) -> ServerNode {
        ServerNode::new(
            Url::parse(&format!("http://127.0.0.1:{port}")).unwrap(),
            "northwind".to_string(),
        )
    }

    #[test]
    fn higher_etag_supersedes_lower() {
        let older = Topology::new(3, vec![node(8080)]);
        let newer = Topology::new(4, vec![node(8080), node(8081)]);

        assert!(newer.supersedes(&older));
        assert!(!older.supersedes(&newer));
    }

    #[test]
    fn equal_etag_does_not_supersede() {
        let a = Topology::new(7, vec![node(8080)]);
        let b = Topology::new(7, vec![node(8081)]);

        assert!(!a.supersedes(&b));
    }
}
