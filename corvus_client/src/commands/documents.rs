//! Document and query commands.

use std::collections::HashMap;

use reqwest::Method;
use serde::Deserialize;

use crate::{
    raven_command::{assert_database, RavenCommand, RequestSpec, ResponsePayload},
    request_executor::RequestExecutorError,
    server_node::ServerNode,
};

/// `PUT /databases/<db>/docs?id=<id>`
#[derive(Debug)]
pub struct PutDocumentCommand {
    pub id: String,
    pub document: serde_json::Value,
}

impl PutDocumentCommand {
    pub fn new(id: impl Into<String>, document: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            document,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutResult {
    pub id: String,
    pub change_vector: Option<String>,
}

impl RavenCommand for PutDocumentCommand {
    type Result = PutResult;

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        assert_database(node)?;

        Ok(
            RequestSpec::new(Method::PUT, format!("/databases/{}/docs", node.database))
                .with_param("id", self.id.clone())
                .with_body(self.document.clone()),
        )
    }

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError> {
        payload.parse_json()
    }

    fn is_read_request(&self) -> bool {
        false
    }
}

/// `GET /databases/<db>/docs?id=<id>`
#[derive(Debug)]
pub struct GetDocumentCommand {
    pub id: String,
}

impl GetDocumentCommand {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetDocumentsResult {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub includes: serde_json::Value,
}

impl RavenCommand for GetDocumentCommand {
    type Result = GetDocumentsResult;

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        assert_database(node)?;

        Ok(
            RequestSpec::new(Method::GET, format!("/databases/{}/docs", node.database))
                .with_param("id", self.id.clone()),
        )
    }

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError> {
        payload.parse_json()
    }
}

/// A query over an index or collection, expressed in the server's query
/// language. This is the boundary type for the session's query surface;
/// query *building* is not this crate's concern.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub query: String,
    pub page_size: Option<u32>,
    pub start: Option<u32>,
    pub query_parameters: HashMap<String, serde_json::Value>,
    pub wait_for_non_stale_results: bool,
}

impl IndexQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page_size: None,
            start: None,
            query_parameters: HashMap::new(),
            wait_for_non_stale_results: false,
        }
    }

    pub fn with_page(mut self, start: u32, page_size: u32) -> Self {
        self.start = Some(start);
        self.page_size = Some(page_size);
        self
    }

    pub fn wait_for_non_stale_results(mut self) -> Self {
        self.wait_for_non_stale_results = true;
        self
    }
}

/// `POST /databases/<db>/queries`
#[derive(Debug)]
pub struct QueryCommand {
    pub index_query: IndexQuery,
}

impl QueryCommand {
    pub fn new(index_query: IndexQuery) -> Self {
        Self { index_query }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResult {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub total_results: i64,
    #[serde(default)]
    pub is_stale: bool,
}

impl RavenCommand for QueryCommand {
    type Result = QueryResult;

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        assert_database(node)?;

        let query = &self.index_query;
        let body = serde_json::json!({
            "Query": query.query,
            "QueryParameters": query.query_parameters,
            "Start": query.start,
            "PageSize": query.page_size,
            "WaitForNonStaleResults": query.wait_for_non_stale_results,
        });

        Ok(
            RequestSpec::new(Method::POST, format!("/databases/{}/queries", node.database))
                .with_body(body),
        )
    }

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError> {
        payload.parse_json()
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, StatusCode, Url};

    use crate::{
        raven_command::{RavenCommand, ResponsePayload},
        server_node::ServerNode,
    };

    use super::{GetDocumentCommand, IndexQuery, PutDocumentCommand, QueryCommand};

    fn node() -> ServerNode {
        ServerNode::new(
            Url::parse("http://a.cluster:8080").unwrap(),
            "northwind".to_string(),
        )
    }

    #[test]
    fn put_document_targets_the_docs_end_point_with_the_id() {
        let command = PutDocumentCommand::new(
            "Products/10",
            serde_json::json!({"Name": "test", "@metadata": {"@collection": "Products"}}),
        );

        let spec = command.create_request(&node()).unwrap();

        assert_eq!(spec.method, Method::PUT);
        assert_eq!(spec.end_point, "/databases/northwind/docs");
        assert_eq!(spec.params, vec![("id".to_string(), "Products/10".to_string())]);
        assert!(!command.is_read_request());
    }

    #[test]
    fn get_document_is_a_read_request() {
        let command = GetDocumentCommand::new("Products/10");

        let spec = command.create_request(&node()).unwrap();

        assert_eq!(spec.method, Method::GET);
        assert!(command.is_read_request());
    }

    #[test]
    fn query_body_carries_paging_and_staleness_options() {
        let query = IndexQuery::new("FROM Products WHERE Tag = 'kit'")
            .with_page(0, 128)
            .wait_for_non_stale_results();
        let command = QueryCommand::new(query);

        let spec = command.create_request(&node()).unwrap();
        let body = spec.body.unwrap();

        assert_eq!(spec.end_point, "/databases/northwind/queries");
        assert_eq!(body["PageSize"], 128);
        assert_eq!(body["WaitForNonStaleResults"], true);
    }

    #[test]
    fn query_results_decode_into_documents() {
        let command = QueryCommand::new(IndexQuery::new("FROM Products"));

        let result = command
            .parse_response(ResponsePayload {
                status: StatusCode::OK,
                body: serde_json::json!({
                    "Results": [{"Name": "test"}],
                    "TotalResults": 1,
                    "IsStale": false
                })
                .to_string(),
            })
            .unwrap();

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0]["Name"], "test");
        assert!(!result.is_stale);
    }
}
