use std::{collections::HashMap, net::IpAddr};

use reqwest::Url;
use tokio::sync::oneshot;

use crate::{request_executor::RequestExecutor, DocumentConventions, DocumentStoreError};

pub type DnsOverrides = HashMap<String, IpAddr>;

#[derive(Debug)]
pub enum DocumentStoreMessage {
    /// Returns the cached [`RequestExecutor`] for a database, creating it
    /// on first use.
    GetRequestExecutor {
        database_name: Option<String>,
        respond_to: oneshot::Sender<Result<RequestExecutor, DocumentStoreError>>,
    },
    GetDatabase {
        respond_to: oneshot::Sender<Option<String>>,
    },
    /// Produces the next HiLo document id for a collection.
    GenerateDocumentId {
        database_name: Option<String>,
        collection: String,
        respond_to: oneshot::Sender<Result<String, DocumentStoreError>>,
    },
    UpdateTopology,
    /// Returns unused HiLo ranges and stops the actor.
    Close {
        respond_to: oneshot::Sender<()>,
    },
}

/// Everything the actor needs at startup, assembled by the builder.
#[derive(Debug)]
pub struct DocumentStoreInitialConfiguration {
    pub(crate) client_identity: Option<reqwest::Identity>,
    pub(crate) conventions: DocumentConventions,
    pub(crate) database_name: Option<String>,
    pub(crate) dns_overrides: Option<DnsOverrides>,
    pub(crate) initial_urls: Vec<Url>,
    pub(crate) proxy_address: Option<String>,
}
