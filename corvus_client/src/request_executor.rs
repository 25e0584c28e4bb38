//! Command execution with topology-aware routing and failover.
//!
//! The executor resolves the database topology lazily, caches it with a
//! TTL, picks a node per command through the [`NodeSelector`], and retries
//! node-level failures against the remaining candidates. Request-level
//! failures are never retried; they would fail the same way anywhere.

mod request_executor_error;

pub use request_executor_error::{NodeAttempt, RequestExecutorError};

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Instant,
};

use reqwest::{
    header::{HeaderValue, CONTENT_TYPE},
    StatusCode,
};
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use crate::{
    commands::databases::GetTopologyCommand,
    node_selector::NodeSelector,
    raven_command::{RavenCommand, RequestSpec, ResponsePayload},
    server_node::ServerNode,
    topology::Topology,
    DnsOverrides, DocumentConventions,
};

const REFRESH_TOPOLOGY_HEADER: &str = "refresh-topology";

/// Transport options forwarded to the underlying HTTP client.
#[derive(Default)]
pub struct TransportConfig {
    pub client_identity: Option<reqwest::Identity>,
    pub dns_overrides: Option<DnsOverrides>,
    pub proxy_address: Option<String>,
}

/// Cheap-clone handle over the shared executor state. One executor per
/// database; clones share the topology cache, the failure records and the
/// pooled HTTP client.
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    inner: Arc<ExecutorInner>,
}

#[derive(Debug)]
struct ExecutorInner {
    database: String,
    initial_urls: Vec<Url>,
    conventions: DocumentConventions,
    single_node: bool,
    /// Reqwest client maintains an internal connection pool. Reuse it so
    /// long as this RequestExecutor lives.
    client: reqwest::Client,
    application_id: Uuid,
    state: Mutex<ExecutorState>,
    /// Serializes topology fetches so concurrent stale readers produce one
    /// refresh, not one each.
    refresh_gate: tokio::sync::Mutex<()>,
    round_robin: AtomicUsize,
}

#[derive(Debug, Default)]
struct ExecutorState {
    selector: Option<NodeSelector>,
    last_topology_update: Option<Instant>,
}

enum AttemptFailure {
    /// The node could not be reached or answered like a broken node.
    /// Fail over to the next candidate.
    NodeLevel(RequestExecutorError),
    /// The request itself was rejected or produced an unusable body.
    /// Surfaces immediately.
    RequestLevel(RequestExecutorError),
}

impl AttemptFailure {
    fn into_error(self) -> RequestExecutorError {
        match self {
            AttemptFailure::NodeLevel(error) | AttemptFailure::RequestLevel(error) => error,
        }
    }
}

impl RequestExecutor {
    /// Executor for a normal cluster: topology is fetched from the seed
    /// urls on first use and refreshed when stale.
    pub fn create(
        initial_urls: Vec<Url>,
        database: impl Into<String>,
        conventions: DocumentConventions,
        transport: TransportConfig,
    ) -> Result<Self, RequestExecutorError> {
        Self::new_internal(initial_urls, database.into(), conventions, transport, false)
    }

    /// Executor pinned to a single node. Skips all topology fetches and
    /// always targets the one configured url.
    pub fn create_for_single_node(
        url: Url,
        database: impl Into<String>,
        conventions: DocumentConventions,
        transport: TransportConfig,
    ) -> Result<Self, RequestExecutorError> {
        Self::new_internal(vec![url], database.into(), conventions, transport, true)
    }

    fn new_internal(
        initial_urls: Vec<Url>,
        database: String,
        conventions: DocumentConventions,
        transport: TransportConfig,
        single_node: bool,
    ) -> Result<Self, RequestExecutorError> {
        if initial_urls.is_empty() {
            return Err(RequestExecutorError::UnexpectedError(anyhow::anyhow!(
                "a request executor needs at least one url"
            )));
        }
        let client = build_client(&transport)?;

        Ok(Self {
            inner: Arc::new(ExecutorInner {
                database,
                initial_urls,
                conventions,
                single_node,
                client,
                application_id: Uuid::new_v4(),
                state: Mutex::new(ExecutorState::default()),
                refresh_gate: tokio::sync::Mutex::new(()),
                round_robin: AtomicUsize::new(0),
            }),
        })
    }

    pub fn database(&self) -> &str {
        &self.inner.database
    }

    pub fn conventions(&self) -> &DocumentConventions {
        &self.inner.conventions
    }

    /// Snapshot of the cached topology, if one has been fetched.
    pub fn cached_topology(&self) -> Option<Topology> {
        self.lock_state()
            .selector
            .as_ref()
            .map(|selector| selector.topology().clone())
    }

    /// Runs `command` against the cluster, failing over across nodes on
    /// node-level failures. Returns the command's parsed result verbatim.
    #[instrument(
        level = "debug",
        skip(self, command),
        fields(database = %self.inner.database, application_id = %self.inner.application_id)
    )]
    pub async fn execute<C: RavenCommand>(
        &self,
        command: &C,
    ) -> Result<C::Result, RequestExecutorError> {
        self.ensure_topology().await?;

        let offset = self.inner.round_robin.fetch_add(1, Ordering::Relaxed);
        let mut attempts: Vec<NodeAttempt> = Vec::new();
        let mut refreshed = false;

        loop {
            let candidates = {
                let state = self.lock_state();
                state
                    .selector
                    .as_ref()
                    .map(|selector| {
                        selector.candidates(command.is_read_request(), offset, Instant::now())
                    })
                    .unwrap_or_default()
            };

            if candidates.is_empty() {
                if !refreshed && !self.inner.single_node {
                    refreshed = true;
                    if self.update_topology(true).await.is_ok() {
                        continue;
                    }
                }
                if attempts.is_empty() {
                    return Err(RequestExecutorError::NoHealthyNodes);
                }
                break;
            }

            let max_attempts = self
                .inner
                .conventions
                .max_node_attempts()
                .unwrap_or(candidates.len())
                .max(1);

            for node in candidates.into_iter().take(max_attempts) {
                match self.try_node(command, &node).await {
                    Ok(result) => {
                        let mut state = self.lock_state();
                        if let Some(selector) = state.selector.as_mut() {
                            selector.record_success(&node);
                        }
                        return Ok(result);
                    }
                    Err(AttemptFailure::NodeLevel(error)) => {
                        tracing::debug!(
                            "Node-level failure from `{}`: {}. Failing over.",
                            node.url,
                            error
                        );
                        {
                            let mut state = self.lock_state();
                            if let Some(selector) = state.selector.as_mut() {
                                selector.record_failure(&node, Instant::now());
                            }
                        }
                        upsert_attempt(&mut attempts, node.url.clone(), error);
                    }
                    Err(AttemptFailure::RequestLevel(error)) => {
                        // Retrying against another node would not change
                        // the outcome.
                        return Err(error);
                    }
                }
            }

            if !refreshed && !self.inner.single_node {
                refreshed = true;
                // The cluster may have changed while we were failing; one
                // forced refresh, one more selection cycle.
                if self.update_topology(true).await.is_ok() {
                    continue;
                }
            }
            break;
        }

        Err(RequestExecutorError::AllNodesFailed { attempts })
    }

    /// Fetches a fresh topology and installs it under the etag guard.
    /// `force` bypasses the TTL check. Holding the refresh gate across the
    /// fetch is what keeps concurrent stale readers down to one request;
    /// the state mutex itself is never held across a network call.
    #[instrument(level = "debug", skip(self))]
    pub async fn update_topology(&self, force: bool) -> Result<(), RequestExecutorError> {
        if self.inner.single_node {
            let mut state = self.lock_state();
            if let Some(selector) = state.selector.as_mut() {
                selector.clear_failures();
            }
            return Ok(());
        }

        let _gate = self.inner.refresh_gate.lock().await;
        if !force && self.topology_is_fresh() {
            // Another caller refreshed while we waited on the gate.
            return Ok(());
        }

        // Preferred node first, then the rest of the current topology, then
        // the statically configured seed urls.
        let mut sources: Vec<ServerNode> = {
            let state = self.lock_state();
            state
                .selector
                .as_ref()
                .map(|selector| selector.topology().nodes.clone())
                .unwrap_or_default()
        };
        for url in &self.inner.initial_urls {
            if sources.iter().all(|node| node.url != *url) {
                sources.push(ServerNode::new(url.clone(), self.inner.database.clone()));
            }
        }

        let command = GetTopologyCommand::new();
        let mut attempts: Vec<(Url, String)> = Vec::new();
        for node in sources {
            match self.try_node(&command, &node).await {
                Ok(topology) => {
                    self.install_topology(topology);
                    tracing::debug!("Topology updated and stored.");
                    return Ok(());
                }
                Err(failure) => {
                    let error = failure.into_error();
                    tracing::debug!("Could not fetch topology from `{}`: {}", node.url, error);
                    attempts.push((node.url, error.to_string()));
                }
            }
        }

        Err(RequestExecutorError::TopologyUnavailable { attempts })
    }

    async fn ensure_topology(&self) -> Result<(), RequestExecutorError> {
        if self.inner.single_node {
            let mut state = self.lock_state();
            if state.selector.is_none() {
                let node = ServerNode::new(
                    self.inner.initial_urls[0].clone(),
                    self.inner.database.clone(),
                );
                state.selector = Some(self.new_selector(Topology::new(-1, vec![node])));
                state.last_topology_update = Some(Instant::now());
            }
            return Ok(());
        }

        if self.topology_is_fresh() {
            return Ok(());
        }
        self.update_topology(false).await
    }

    async fn try_node<C: RavenCommand>(
        &self,
        command: &C,
        node: &ServerNode,
    ) -> Result<C::Result, AttemptFailure> {
        let spec = command
            .create_request(node)
            .map_err(AttemptFailure::RequestLevel)?;
        let request = self
            .build_request(spec, node)
            .map_err(AttemptFailure::RequestLevel)?;

        let response = self.inner.client.execute(request).await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!(
                    "timed out after {:?}",
                    self.inner.conventions.request_timeout()
                )
            } else {
                e.to_string()
            };
            AttemptFailure::NodeLevel(RequestExecutorError::NodeUnreachable {
                url: node.url.clone(),
                reason,
            })
        })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            return Err(AttemptFailure::NodeLevel(
                RequestExecutorError::NodeUnreachable {
                    url: node.url.clone(),
                    reason: format!("server answered with status {status}"),
                },
            ));
        }

        if let Some(value) = response.headers().get(REFRESH_TOPOLOGY_HEADER) {
            if value.to_str().unwrap_or("false") == "true" {
                // Invalidate the cache; the next execute call refreshes.
                let mut state = self.lock_state();
                state.last_topology_update = None;
            }
        }

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::RequestLevel(
                RequestExecutorError::RequestRejected {
                    url: node.url.clone(),
                    status,
                    body,
                },
            ));
        }

        let body = response.text().await.map_err(|e| {
            AttemptFailure::NodeLevel(RequestExecutorError::NodeUnreachable {
                url: node.url.clone(),
                reason: format!("could not read response body: {e}"),
            })
        })?;

        command
            .parse_response(ResponsePayload { status, body })
            .map_err(AttemptFailure::RequestLevel)
    }

    fn build_request(
        &self,
        spec: RequestSpec,
        node: &ServerNode,
    ) -> Result<reqwest::Request, RequestExecutorError> {
        let mut url = node.url.join(&spec.end_point).map_err(|e| {
            RequestExecutorError::UnexpectedError(anyhow::anyhow!(
                "invalid end point `{}`: {e}",
                spec.end_point
            ))
        })?;
        if !spec.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &spec.params {
                pairs.append_pair(key, value);
            }
        }

        let mut request = reqwest::Request::new(spec.method, url);
        if let Some(body) = &spec.body {
            let bytes = serde_json::to_vec(body).map_err(|e| {
                RequestExecutorError::UnexpectedError(anyhow::anyhow!(
                    "could not serialize request body: {e}"
                ))
            })?;
            *request.body_mut() = Some(bytes.into());
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let etag = self
            .lock_state()
            .selector
            .as_ref()
            .map(|selector| selector.topology().etag)
            .unwrap_or_default();
        if let Ok(value) = HeaderValue::from_str(&etag.to_string()) {
            request.headers_mut().insert("Topology-Etag", value);
        }

        *request.timeout_mut() = Some(self.inner.conventions.request_timeout());
        Ok(request)
    }

    fn install_topology(&self, topology: Topology) {
        let mut state = self.lock_state();
        match state.selector.as_mut() {
            Some(selector) => {
                if !selector.update_topology(topology) {
                    tracing::debug!("Discarding topology response with stale etag.");
                }
                selector.clear_failures();
            }
            None => {
                state.selector = Some(self.new_selector(topology));
            }
        }
        state.last_topology_update = Some(Instant::now());
    }

    fn topology_is_fresh(&self) -> bool {
        let state = self.lock_state();
        match (&state.selector, state.last_topology_update) {
            (Some(_), Some(at)) => at.elapsed() < self.inner.conventions.topology_cache_ttl(),
            _ => false,
        }
    }

    fn new_selector(&self, topology: Topology) -> NodeSelector {
        NodeSelector::new(
            topology,
            self.inner.conventions.failure_cooldown(),
            self.inner.conventions.failure_threshold(),
        )
    }

    fn lock_state(&self) -> MutexGuard<'_, ExecutorState> {
        // A panic while holding this lock leaves only per-node counters
        // behind, all of which stay valid; keep going with the data.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The aggregate failure lists every node tried exactly once, keeping the
/// most recent reason per node.
fn upsert_attempt(attempts: &mut Vec<NodeAttempt>, url: Url, error: RequestExecutorError) {
    if let Some(existing) = attempts.iter_mut().find(|attempt| attempt.url == url) {
        existing.error = error;
    } else {
        attempts.push(NodeAttempt { url, error });
    }
}

fn build_client(transport: &TransportConfig) -> Result<reqwest::Client, RequestExecutorError> {
    let mut builder = reqwest::Client::builder();

    if let Some(identity) = transport.client_identity.clone() {
        builder = builder.identity(identity).use_rustls_tls();
    }

    for (domain, address) in transport.dns_overrides.clone().unwrap_or_default() {
        tracing::trace!(
            "Adding `{}->{}` to dns overrides for this client.",
            domain,
            address
        );
        builder = builder.resolve(domain.as_str(), SocketAddr::new(address, 0));
    }

    if let Some(proxy) = &transport.proxy_address {
        tracing::trace!("Proxy set to `{}`", proxy);
        let proxy = reqwest::Proxy::http(proxy).map_err(|e| {
            RequestExecutorError::UnexpectedError(anyhow::anyhow!("invalid proxy address: {e}"))
        })?;
        builder = builder.proxy(proxy);
    } else {
        tracing::trace!("No proxy defined. Using system settings.");
    }

    builder.build().map_err(|e| {
        RequestExecutorError::UnexpectedError(anyhow::anyhow!("could not build http client: {e}"))
    })
}
