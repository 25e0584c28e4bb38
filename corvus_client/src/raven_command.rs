//! The raven commands are the only way to directly interact with the server.
//!
//! Every operation implements [`RavenCommand`]: it builds a request for a
//! given target node and interprets the raw response into a typed result.
//! The executor dispatches through the trait without inspecting which
//! operation it is running.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::{request_executor::RequestExecutorError, server_node::ServerNode};

/// A unit of work against the server.
///
/// `create_request` is called once per node attempt and may run several
/// times for one logical execution while the executor fails over. It must
/// build the request from scratch each call and never accumulate state
/// (parameter lists in particular) across retries.
pub trait RavenCommand {
    type Result;

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError>;

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError>;

    /// Read requests may be served by any healthy node; writes prefer the
    /// node believed to be the cluster leader.
    fn is_read_request(&self) -> bool {
        true
    }
}

/// Everything the transport needs for one attempt: method, end point
/// relative to the node url, query parameters, and an optional JSON body.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub end_point: String,
    pub params: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn new(method: Method, end_point: impl Into<String>) -> Self {
        Self {
            method,
            end_point: end_point.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw status and body handed to [`RavenCommand::parse_response`] once the
/// executor has classified the status as a success.
#[derive(Debug)]
pub struct ResponsePayload {
    pub status: StatusCode,
    pub body: String,
}

impl ResponsePayload {
    /// Several commands treat an empty body as a hard error even when the
    /// HTTP status is 200.
    pub fn require_body(&self) -> Result<&str, RequestExecutorError> {
        if self.body.trim().is_empty() {
            return Err(RequestExecutorError::InvalidServerResponse(
                "response is missing a body where one is required".to_string(),
            ));
        }
        Ok(&self.body)
    }

    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, RequestExecutorError> {
        let body = self.require_body()?;
        serde_json::from_str(body).map_err(|e| {
            RequestExecutorError::InvalidServerResponse(format!(
                "could not deserialize response body: {e}"
            ))
        })
    }
}

/// Commands scoped to a database refuse nodes without one.
pub(crate) fn assert_database(node: &ServerNode) -> Result<(), RequestExecutorError> {
    if node.database.is_empty() {
        return Err(RequestExecutorError::UnexpectedError(anyhow::anyhow!(
            "command requires a database but node `{}` has none",
            node.url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, StatusCode};

    use crate::request_executor::RequestExecutorError;

    use super::{RequestSpec, ResponsePayload};

    #[test]
    fn require_body_rejects_empty_body_even_on_ok_status() {
        let payload = ResponsePayload {
            status: StatusCode::OK,
            body: String::new(),
        };

        assert!(matches!(
            payload.require_body(),
            Err(RequestExecutorError::InvalidServerResponse(_))
        ));
    }

    #[test]
    fn parse_json_classifies_malformed_body() {
        let payload = ResponsePayload {
            status: StatusCode::OK,
            body: "{not json".to_string(),
        };

        let result: Result<serde_json::Value, _> = payload.parse_json();

        assert!(matches!(
            result,
            Err(RequestExecutorError::InvalidServerResponse(_))
        ));
    }

    #[test]
    fn request_spec_builds_params_in_order() {
        let spec = RequestSpec::new(Method::GET, "/topology")
            .with_param("name", "northwind")
            .with_param("url", "http://forced:8080");

        assert_eq!(spec.params.len(), 2);
        assert_eq!(spec.params[0].0, "name");
        assert_eq!(spec.params[1].0, "url");
    }
}
