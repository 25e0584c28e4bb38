//! HiLo range negotiation commands.

use reqwest::Method;
use serde::Deserialize;

use crate::{
    raven_command::{assert_database, RavenCommand, RequestSpec, ResponsePayload},
    request_executor::RequestExecutorError,
    server_node::ServerNode,
};

/// `GET /databases/<db>/hilo/next?tag=<collection>&...`
///
/// Asks the server for the next exclusive id range for a collection. The
/// previous range's bounds ride along so the server can size the new one.
#[derive(Debug)]
pub struct NextHiLoRangeCommand {
    pub tag: String,
    pub last_batch_size: i64,
    pub last_range_max: i64,
    pub identity_parts_separator: char,
}

impl NextHiLoRangeCommand {
    pub fn new(
        tag: impl Into<String>,
        last_batch_size: i64,
        last_range_max: i64,
        identity_parts_separator: char,
    ) -> Self {
        Self {
            tag: tag.into(),
            last_batch_size,
            last_range_max,
            identity_parts_separator,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HiLoRangeResult {
    pub low: i64,
    pub high: i64,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub server_tag: String,
    #[serde(default)]
    pub last_size: i64,
}

impl RavenCommand for NextHiLoRangeCommand {
    type Result = HiLoRangeResult;

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        assert_database(node)?;

        Ok(RequestSpec::new(
            Method::GET,
            format!("/databases/{}/hilo/next", node.database),
        )
        .with_param("tag", self.tag.clone())
        .with_param("lastBatchSize", self.last_batch_size.to_string())
        .with_param("lastMax", self.last_range_max.to_string())
        .with_param(
            "identityPartsSeparator",
            self.identity_parts_separator.to_string(),
        ))
    }

    fn parse_response(
        &self,
        payload: ResponsePayload,
    ) -> Result<Self::Result, RequestExecutorError> {
        let result: HiLoRangeResult = payload.parse_json()?;
        if result.high < result.low {
            return Err(RequestExecutorError::InvalidServerResponse(format!(
                "server issued an inverted id range [{}, {}]",
                result.low, result.high
            )));
        }
        Ok(result)
    }

    fn is_read_request(&self) -> bool {
        // Allocating a range advances server state.
        false
    }
}

/// `PUT /databases/<db>/hilo/return?tag=<collection>&end=<max>&last=<used>`
///
/// Hands the unused tail of a range back so the next allocator can reuse
/// it. Best-effort by contract: callers log failures and move on.
#[derive(Debug)]
pub struct ReturnHiLoRangeCommand {
    pub tag: String,
    pub end: i64,
    pub last: i64,
}

impl ReturnHiLoRangeCommand {
    pub fn new(tag: impl Into<String>, end: i64, last: i64) -> Self {
        Self {
            tag: tag.into(),
            end,
            last,
        }
    }
}

impl RavenCommand for ReturnHiLoRangeCommand {
    type Result = ();

    fn create_request(&self, node: &ServerNode) -> Result<RequestSpec, RequestExecutorError> {
        assert_database(node)?;

        Ok(RequestSpec::new(
            Method::PUT,
            format!("/databases/{}/hilo/return", node.database),
        )
        .with_param("tag", self.tag.clone())
        .with_param("end", self.end.to_string())
        .with_param("last", self.last.to_string()))
    }

    fn parse_response(&self, _payload: ResponsePayload) -> Result<(), RequestExecutorError> {
        Ok(())
    }

    fn is_read_request(&self) -> bool {
        false
    }
}
