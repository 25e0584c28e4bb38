//! Database administration and monitoring commands.

use std::{collections::HashMap, time::Duration};

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::{
    cluster_topology::ClusterTopologyInfo,
    database_topology::DatabaseTopologyInfo,
    raven_command::{assert_database, RavenCommand, RequestSpec, ResponsePayload},
    request_executor::RequestExecutorError,
    server_node::{NodeTag, ServerNode},
    topology::Topology,
};

/// Describes the database to create: name plus the server-side settings
/// document.
#[derive(Debug, Clone)]
pub struct DatabaseDocument {
    pub database_id: String,
    pub settings: HashMap<String, String>,
    pub disabled: bool,
    pub encrypted: bool,
}

impl DatabaseDocument {
    pub fn new(database_id: impl Into<String>) -> Self {
        Self {
            database_id: database_id.into(),
            settings: HashMap::new(),
            disabled: false,
            encrypted: false,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "DatabaseName": self.database_id,
            "Disabled": self.disabled,
            "Encrypted": self.encrypted,
            "Settings": self.settings,
        })
    }
}

/// `PUT /admin/databases?name=<db>&replicationFactor=<n>`
#[derive(Debug)]
pub struct CreateDatabaseCommand {
    pub database_document: DatabaseDocument,
    pub replication_factor: u32,
}

impl CreateDatabaseCommand {
    pub fn new(database_document: DatabaseDocument, replication_factor: u32) -> Self {
        Self {
            database_document,
            replication_factor: replication_factor.max(1),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateDatabaseResult {
    pub name: String,
    pub raft_command_index: Option<i64>,
}

impl RavenCommand for CreateDatabaseCommand {
    type Result = CreateDatabaseResult;

    fn create_request(&self, _node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        let db_name = self
            .database_document
            .database_id
            .replace("Raven/Databases/", "");

        Ok(RequestSpec::new(Method::PUT, "/admin/databases")
            .with_param("name", db_name)
            .with_param("replicationFactor", self.replication_factor.to_string())
            .with_body(self.database_document.to_json()))
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

/// `DELETE /admin/databases`
#[derive(Debug)]
pub struct DeleteDatabaseCommand {
    pub database_id: String,
    pub hard_delete: bool,
    pub from_node: Option<NodeTag>,
    pub time_to_wait_for_confirmation: Option<Duration>,
}

impl DeleteDatabaseCommand {
    pub fn new(database_id: impl Into<String>, hard_delete: bool) -> Self {
        Self {
            database_id: database_id.into(),
            hard_delete,
            from_node: None,
            time_to_wait_for_confirmation: None,
        }
    }

    /// Restricts the delete to a single node. Accepts a [`ServerNode`]
    /// reference or a raw tag string.
    pub fn from_node(mut self, node: impl Into<NodeTag>) -> Self {
        self.from_node = Some(node.into());
        self
    }

    pub fn wait_for_confirmation(mut self, time: Duration) -> Self {
        self.time_to_wait_for_confirmation = Some(time);
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteDatabaseResult {
    pub raft_command_index: Option<i64>,
    #[serde(default)]
    pub pending_deletes: Vec<String>,
}

impl RavenCommand for DeleteDatabaseCommand {
    type Result = DeleteDatabaseResult;

    fn create_request(&self, _node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        let db_name = self.database_id.replace("Raven/Databases/", "");

        let mut payload = serde_json::json!({
            "DatabaseNames": [db_name],
            "HardDelete": self.hard_delete,
            "TimeToWaitForConfirmation": self
                .time_to_wait_for_confirmation
                .map(format_time_span),
        });
        if let Some(from_node) = &self.from_node {
            payload["FromNodes"] = serde_json::json!([from_node.as_str()]);
        }

        Ok(RequestSpec::new(Method::DELETE, "/admin/databases").with_body(payload))
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

/// The server expects confirmation timeouts as a TimeSpan literal.
fn format_time_span(time: Duration) -> String {
    let total = time.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// `GET /topology?name=<db>`
#[derive(Debug, Default)]
pub struct GetTopologyCommand {
    pub force_url: Option<Url>,
}

impl GetTopologyCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force_url(force_url: Url) -> Self {
        Self {
            force_url: Some(force_url),
        }
    }
}

impl RavenCommand for GetTopologyCommand {
    type Result = Topology;

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        assert_database(node)?;

        let mut spec =
            RequestSpec::new(Method::GET, "/topology").with_param("name", node.database.clone());
        if let Some(force_url) = &self.force_url {
            spec = spec.with_param("url", force_url.to_string());
        }
        Ok(spec)
    }

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError> {
        let info: DatabaseTopologyInfo = payload.parse_json()?;
        Topology::try_from(info)
    }
}

/// `GET /cluster/topology`
#[derive(Debug, Default)]
pub struct GetClusterTopologyCommand;

impl RavenCommand for GetClusterTopologyCommand {
    type Result = ClusterTopologyInfo;

    fn create_request(&self, _node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        Ok(RequestSpec::new(Method::GET, "/cluster/topology"))
    }

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError> {
        payload.parse_json()
    }
}

/// `GET /databases/<db>/operations/state?id=<id>`
#[derive(Debug)]
pub struct GetOperationStateCommand {
    pub id: i64,
}

impl GetOperationStateCommand {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

impl RavenCommand for GetOperationStateCommand {
    type Result = serde_json::Value;

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        assert_database(node)?;

        Ok(RequestSpec::new(
            Method::GET,
            format!("/databases/{}/operations/state", node.database),
        )
        .with_param("id", self.id.to_string()))
    }

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError> {
        // The server answers 200 with no body for unknown operations; that
        // is a hard error here, not an empty result.
        payload.parse_json()
    }
}

/// `GET /databases/<db>/stats[?failure=check]`
#[derive(Debug, Default)]
pub struct GetStatisticsCommand {
    pub check_for_failures: bool,
}

impl GetStatisticsCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_check() -> Self {
        Self {
            check_for_failures: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DatabaseStatistics {
    pub database_id: String,
    pub count_of_documents: i64,
    pub count_of_indexes: i64,
    pub count_of_revision_documents: i64,
    pub is_64_bit: bool,
}

impl RavenCommand for GetStatisticsCommand {
    type Result = DatabaseStatistics;

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        assert_database(node)?;

        let mut spec = RequestSpec::new(
            Method::GET,
            format!("/databases/{}/stats", node.database),
        );
        if self.check_for_failures {
            spec = spec.with_param("failure", "check");
        }
        Ok(spec)
    }

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError> {
        if payload.status != StatusCode::OK {
            return Err(RequestExecutorError::InvalidServerResponse(format!(
                "statistics request answered with status {}",
                payload.status
            )));
        }
        payload.parse_json()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{Method, StatusCode, Url};

    use crate::{
        raven_command::{RavenCommand, ResponsePayload},
        request_executor::RequestExecutorError,
        server_node::ServerNode,
    };

    use super::{
        format_time_span, CreateDatabaseCommand, DatabaseDocument, DeleteDatabaseCommand,
        GetOperationStateCommand, GetStatisticsCommand, GetTopologyCommand,
    };

    fn node() -> ServerNode {
        ServerNode::with_tag(
            Url::parse("http://a.cluster:8080").unwrap(),
            "northwind".to_string(),
            "A".to_string(),
        )
    }

    #[test]
    fn create_database_builds_put_with_settings_document() {
        let command =
            CreateDatabaseCommand::new(DatabaseDocument::new("Raven/Databases/orders"), 3);

        let spec = command.create_request(&node()).unwrap();

        assert_eq!(spec.method, Method::PUT);
        assert_eq!(spec.end_point, "/admin/databases");
        assert!(spec
            .params
            .contains(&("name".to_string(), "orders".to_string())));
        assert!(spec
            .params
            .contains(&("replicationFactor".to_string(), "3".to_string())));
        let body = spec.body.unwrap();
        assert_eq!(body["DatabaseName"], "Raven/Databases/orders");
        assert_eq!(body["Disabled"], false);
    }

    #[test]
    fn delete_database_from_node_carries_the_cluster_tag() {
        let source = node();
        let command = DeleteDatabaseCommand::new("orders", true)
            .from_node(&source)
            .wait_for_confirmation(Duration::from_secs(90));

        let spec = command.create_request(&node()).unwrap();
        let body = spec.body.unwrap();

        assert_eq!(spec.method, Method::DELETE);
        assert_eq!(body["DatabaseNames"][0], "orders");
        assert_eq!(body["HardDelete"], true);
        assert_eq!(body["FromNodes"][0], "A");
        assert_eq!(body["TimeToWaitForConfirmation"], "00:01:30");
    }

    #[test]
    fn time_span_formatting_matches_server_expectations() {
        assert_eq!(format_time_span(Duration::from_secs(3661)), "01:01:01");
        assert_eq!(format_time_span(Duration::from_secs(0)), "00:00:00");
    }

    #[test]
    fn topology_request_repeats_identically_across_retries() {
        let command =
            GetTopologyCommand::with_force_url(Url::parse("http://forced:8080").unwrap());

        // A command is invoked once per node attempt during failover; the
        // parameter list must not grow across calls.
        let first = command.create_request(&node()).unwrap();
        let second = command.create_request(&node()).unwrap();

        assert_eq!(first.params, second.params);
        assert_eq!(second.params.len(), 2);
    }

    #[test]
    fn operation_state_rejects_missing_body_regardless_of_status() {
        let command = GetOperationStateCommand::new(12);

        let result = command.parse_response(ResponsePayload {
            status: StatusCode::OK,
            body: String::new(),
        });

        assert!(matches!(
            result,
            Err(RequestExecutorError::InvalidServerResponse(_))
        ));
    }

    #[test]
    fn statistics_command_adds_failure_check_param() {
        let command = GetStatisticsCommand::with_failure_check();

        let spec = command.create_request(&node()).unwrap();

        assert_eq!(spec.end_point, "/databases/northwind/stats");
        assert!(spec
            .params
            .contains(&("failure".to_string(), "check".to_string())));
    }

    #[test]
    fn statistics_parse_decodes_pascal_case_counters() {
        let command = GetStatisticsCommand::new();

        let stats = command
            .parse_response(ResponsePayload {
                status: StatusCode::OK,
                body: serde_json::json!({
                    "DatabaseId": "f3a1",
                    "CountOfDocuments": 1059,
                    "CountOfIndexes": 4,
                    "CountOfRevisionDocuments": 0,
                    "Is64Bit": true
                })
                .to_string(),
            })
            .unwrap();

        assert_eq!(stats.count_of_documents, 1059);
        assert!(stats.is_64_bit);
    }
}
