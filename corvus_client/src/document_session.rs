use reqwest::StatusCode;
use tracing::instrument;

use crate::{
    cluster_topology::ClusterTopologyInfo,
    commands::{
        databases::GetClusterTopologyCommand,
        documents::{
            GetDocumentCommand, IndexQuery, PutDocumentCommand, PutResult, QueryCommand,
            QueryResult,
        },
    },
    request_executor::RequestExecutorError,
    DocumentStore, DocumentStoreError,
};

/// Unit of work for accessing the server. A thin facade over the store's
/// command execution; query building beyond [`IndexQuery`] is left to the
/// application.
#[derive(Debug)]
pub struct DocumentSession {
    document_store: DocumentStore,
}

impl DocumentSession {
    pub fn new(document_store: DocumentStore) -> Self {
        Self { document_store }
    }

    /// Loads one document by id. A missing document is `None`, not an error.
    #[instrument(level = "debug", name = "Load Document", skip(self))]
    pub async fn load(&self, id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let command = GetDocumentCommand::new(id);
        match self.document_store.execute(&command).await {
            Ok(mut result) => {
                if result.results.is_empty() {
                    return Ok(None);
                }
                Ok(Some(result.results.swap_remove(0)))
            }
            Err(DocumentStoreError::RequestExecutor(RequestExecutorError::RequestRejected {
                status,
                ..
            })) if status == StatusCode::NOT_FOUND => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(level = "debug", name = "Store Document", skip(self, document))]
    pub async fn store(&self, id: &str, document: serde_json::Value) -> anyhow::Result<PutResult> {
        let command = PutDocumentCommand::new(id, document);
        Ok(self.document_store.execute(&command).await?)
    }

    #[instrument(level = "debug", name = "Query", skip(self, query))]
    pub async fn query(&self, query: IndexQuery) -> anyhow::Result<QueryResult> {
        let command = QueryCommand::new(query);
        Ok(self.document_store.execute(&command).await?)
    }

    /// Produces the next HiLo id for `collection`.
    pub async fn generate_document_id(&self, collection: &str) -> anyhow::Result<String> {
        Ok(self.document_store.generate_document_id(collection).await?)
    }

    #[instrument(level = "info", name = "Get Cluster Topology", skip(self))]
    pub async fn get_cluster_topology(&self) -> anyhow::Result<ClusterTopologyInfo> {
        let command = GetClusterTopologyCommand;
        let topology = self.document_store.execute(&command).await?;
        tracing::info!("Cluster topology downloaded");
        Ok(topology)
    }
}
