use std::time::Duration;

/// Client-wide behavior knobs. The retry/failover thresholds are explicit
/// configuration rather than hard-coded constants; the defaults are
/// exercised and documented by the executor tests.
#[derive(Clone, Debug)]
pub struct DocumentConventions {
    disable_topology_updates: bool,
    topology_cache_ttl: Duration,
    failure_cooldown: Duration,
    failure_threshold: u32,
    max_node_attempts: Option<usize>,
    request_timeout: Duration,
    identity_parts_separator: char,
}

impl Default for DocumentConventions {
    fn default() -> Self {
        Self {
            disable_topology_updates: false,
            topology_cache_ttl: Duration::from_secs(300),
            failure_cooldown: Duration::from_secs(300),
            failure_threshold: 1,
            max_node_attempts: None,
            request_timeout: Duration::from_secs(30),
            identity_parts_separator: '/',
        }
    }
}

// Mutators
impl DocumentConventions {
    pub fn default_for_single_server() -> Self {
        Self {
            disable_topology_updates: true,
            ..Default::default()
        }
    }

    pub fn set_disable_topology_updates(mut self, disable: bool) -> Self {
        self.disable_topology_updates = disable;
        self
    }

    pub fn set_topology_cache_ttl(mut self, ttl: Duration) -> Self {
        self.topology_cache_ttl = ttl;
        self
    }

    pub fn set_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    pub fn set_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Caps how many nodes one `execute` call may try before the forced
    /// topology refresh. `None` means "as many nodes as the topology has".
    pub fn set_max_node_attempts(mut self, attempts: usize) -> Self {
        self.max_node_attempts = Some(attempts);
        self
    }

    pub fn set_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// Getters
impl DocumentConventions {
    pub fn disable_topology_updates(&self) -> bool {
        self.disable_topology_updates
    }

    pub fn topology_cache_ttl(&self) -> Duration {
        self.topology_cache_ttl
    }

    pub fn failure_cooldown(&self) -> Duration {
        self.failure_cooldown
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn max_node_attempts(&self) -> Option<usize> {
        self.max_node_attempts
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn identity_parts_separator(&self) -> char {
        self.identity_parts_separator
    }
}
