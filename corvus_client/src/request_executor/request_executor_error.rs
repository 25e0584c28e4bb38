use reqwest::StatusCode;
use url::Url;

use crate::error_chain_fmt;

/// Everything `execute` can surface. Node-level failures are retried
/// transparently and only show up inside [`AllNodesFailed`]; request-level
/// failures surface immediately. Raw transport errors never leak through.
///
/// [`AllNodesFailed`]: RequestExecutorError::AllNodesFailed
#[derive(thiserror::Error)]
pub enum RequestExecutorError {
    #[error("node `{url}` is unreachable: {reason}")]
    NodeUnreachable { url: Url, reason: String },
    #[error("no seed node produced a topology{}", format_reasons(.attempts))]
    TopologyUnavailable { attempts: Vec<(Url, String)> },
    #[error("every node in the topology is quarantined")]
    NoHealthyNodes,
    #[error("invalid server response: {0}")]
    InvalidServerResponse(String),
    #[error("node `{url}` rejected the request with status {status}")]
    RequestRejected {
        url: Url,
        status: StatusCode,
        body: String,
    },
    #[error("command failed on every node tried{}", format_attempts(.attempts))]
    AllNodesFailed { attempts: Vec<NodeAttempt> },
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl std::fmt::Debug for RequestExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// One failed node attempt inside an aggregate failure.
#[derive(Debug)]
pub struct NodeAttempt {
    pub url: Url,
    pub error: RequestExecutorError,
}

fn format_attempts(attempts: &[NodeAttempt]) -> String {
    attempts
        .iter()
        .map(|attempt| format!("\n\t`{}`: {}", attempt.url, attempt.error))
        .collect()
}

fn format_reasons(attempts: &[(Url, String)]) -> String {
    attempts
        .iter()
        .map(|(url, reason)| format!("\n\t`{url}`: {reason}"))
        .collect()
}
