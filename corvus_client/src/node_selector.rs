//! Node selection and quarantine.
//!
//! The selector maintains the current topology and a failure record per
//! node. Selection is a deterministic ordered preference: reads rotate
//! through the healthy nodes round-robin, writes put the first healthy
//! `Member` node up front. Speed-test based selection is intentionally not
//! implemented.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::{
    server_node::{ServerNode, ServerRole},
    topology::Topology,
};

/// Per-node failure record. Owned exclusively by one executor; a node whose
/// consecutive failures reach the threshold is excluded from selection
/// until the cooldown elapses or a topology refresh clears the slate.
#[derive(Debug, Default, Clone)]
pub(crate) struct NodeFailureState {
    pub failed_at: Option<Instant>,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
pub(crate) struct NodeSelector {
    topology: Topology,
    failures: HashMap<ServerNode, NodeFailureState>,
    cooldown: Duration,
    threshold: u32,
}

impl NodeSelector {
    pub(crate) fn new(topology: Topology, cooldown: Duration, threshold: u32) -> Self {
        Self {
            topology,
            failures: HashMap::new(),
            cooldown,
            threshold,
        }
    }

    pub(crate) fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Installs `candidate` only if it strictly supersedes the current
    /// topology. Returns whether a replacement happened, so stale or
    /// duplicate responses are observably ignored.
    pub(crate) fn update_topology(&mut self, candidate: Topology) -> bool {
        if !candidate.supersedes(&self.topology) {
            return false;
        }
        self.topology = candidate;
        self.failures.clear();
        true
    }

    /// A successful refresh vouches for the cluster as a whole; quarantined
    /// nodes get another chance even when the membership did not change.
    pub(crate) fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub(crate) fn record_failure(&mut self, node: &ServerNode, now: Instant) {
        let state = self.failures.entry(node.clone()).or_default();
        state.failed_at = Some(now);
        state.consecutive_failures += 1;
    }

    pub(crate) fn record_success(&mut self, node: &ServerNode) {
        self.failures.remove(node);
    }

    pub(crate) fn is_quarantined(&self, node: &ServerNode, now: Instant) -> bool {
        let Some(state) = self.failures.get(node) else {
            return false;
        };
        if state.consecutive_failures < self.threshold {
            return false;
        }
        match state.failed_at {
            Some(failed_at) => now.duration_since(failed_at) < self.cooldown,
            None => false,
        }
    }

    /// Healthy nodes in the order the executor should try them. Empty means
    /// every node is quarantined.
    pub(crate) fn candidates(&self, is_read: bool, offset: usize, now: Instant) -> Vec<ServerNode> {
        let healthy: Vec<ServerNode> = self
            .topology
            .nodes
            .iter()
            .filter(|node| !self.is_quarantined(node, now))
            .cloned()
            .collect();

        if healthy.is_empty() {
            return healthy;
        }

        if is_read {
            let start = offset % healthy.len();
            let mut ordered = Vec::with_capacity(healthy.len());
            ordered.extend_from_slice(&healthy[start..]);
            ordered.extend_from_slice(&healthy[..start]);
            ordered
        } else {
            let mut ordered = healthy;
            if let Some(pos) = ordered
                .iter()
                .position(|node| node.server_role == ServerRole::Member)
            {
                let leader = ordered.remove(pos);
                ordered.insert(0, leader);
            }
            ordered
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use reqwest::Url;

    use crate::{
        server_node::{ServerNode, ServerRole},
        topology::Topology,
    };

    use super::NodeSelector;

    const COOLDOWN: Duration = Duration::from_secs(300);

    fn node(tag: &str, role: ServerRole) -> ServerNode {
        let mut node = ServerNode::with_tag(
            Url::parse(&format!("http://{}.cluster:8080", tag.to_lowercase())).unwrap(),
            "northwind".to_string(),
            tag.to_string(),
        );
        node.server_role = role;
        node
    }

    fn three_node_selector() -> NodeSelector {
        let topology = Topology::new(
            1,
            vec![
                node("A", ServerRole::Member),
                node("B", ServerRole::None),
                node("C", ServerRole::None),
            ],
        );
        NodeSelector::new(topology, COOLDOWN, 1)
    }

    #[test]
    fn never_selects_a_quarantined_node_while_a_healthy_one_exists() {
        let mut selector = three_node_selector();
        let now = Instant::now();
        let quarantined = selector.topology().nodes[1].clone();

        selector.record_failure(&quarantined, now);

        for offset in 0..7 {
            let candidates = selector.candidates(true, offset, now);
            assert!(!candidates.is_empty());
            assert!(candidates.iter().all(|n| *n != quarantined));
        }
    }

    #[test]
    fn quarantine_expires_after_the_cooldown() {
        let mut selector = three_node_selector();
        let now = Instant::now();
        let failing = selector.topology().nodes[0].clone();

        selector.record_failure(&failing, now);

        assert!(selector.is_quarantined(&failing, now));
        assert!(!selector.is_quarantined(&failing, now + COOLDOWN));
    }

    #[test]
    fn all_nodes_quarantined_yields_no_candidates() {
        let mut selector = three_node_selector();
        let now = Instant::now();

        for node in selector.topology().nodes.clone() {
            selector.record_failure(&node, now);
        }

        assert!(selector.candidates(true, 0, now).is_empty());
    }

    #[test]
    fn reads_rotate_round_robin() {
        let selector = three_node_selector();
        let now = Instant::now();

        let first = selector.candidates(true, 0, now);
        let second = selector.candidates(true, 1, now);

        assert_eq!(first[0].cluster_tag.as_deref(), Some("A"));
        assert_eq!(second[0].cluster_tag.as_deref(), Some("B"));
        assert_eq!(second.last().unwrap().cluster_tag.as_deref(), Some("A"));
    }

    #[test]
    fn writes_prefer_the_healthy_member_node() {
        let topology = Topology::new(
            1,
            vec![
                node("A", ServerRole::Promotable),
                node("B", ServerRole::Member),
                node("C", ServerRole::None),
            ],
        );
        let selector = NodeSelector::new(topology, COOLDOWN, 1);

        let candidates = selector.candidates(false, 5, Instant::now());

        assert_eq!(candidates[0].cluster_tag.as_deref(), Some("B"));
    }

    #[test]
    fn writes_fall_back_to_preference_order_when_the_member_is_quarantined() {
        let topology = Topology::new(
            1,
            vec![node("A", ServerRole::Member), node("B", ServerRole::None)],
        );
        let mut selector = NodeSelector::new(topology, COOLDOWN, 1);
        let now = Instant::now();
        let member = selector.topology().nodes[0].clone();

        selector.record_failure(&member, now);
        let candidates = selector.candidates(false, 0, now);

        assert_eq!(candidates[0].cluster_tag.as_deref(), Some("B"));
    }

    #[test]
    fn stale_etag_never_replaces_the_topology() {
        let mut selector = three_node_selector();
        let stale = Topology::new(1, vec![node("Z", ServerRole::None)]);
        let duplicate = Topology::new(0, vec![node("Z", ServerRole::None)]);

        assert!(!selector.update_topology(stale));
        assert!(!selector.update_topology(duplicate));
        assert_eq!(selector.topology().nodes.len(), 3);
    }

    #[test]
    fn newer_etag_replaces_and_clears_quarantine() {
        let mut selector = three_node_selector();
        let now = Instant::now();
        let failing = selector.topology().nodes[0].clone();
        selector.record_failure(&failing, now);

        let newer = Topology::new(2, vec![failing.clone(), node("D", ServerRole::None)]);

        assert!(selector.update_topology(newer));
        assert!(!selector.is_quarantined(&failing, now));
        assert_eq!(selector.topology().etag, 2);
    }

    #[test]
    fn success_resets_the_consecutive_failure_count() {
        let mut selector = three_node_selector();
        let now = Instant::now();
        let node = selector.topology().nodes[2].clone();

        selector.record_failure(&node, now);
        selector.record_success(&node);

        assert!(!selector.is_quarantined(&node, now));
    }
}
