use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

use crate::{
    raven_command::RavenCommand, request_executor::RequestExecutor, run_document_store_actor,
    DocumentSession, DocumentStoreActor, DocumentStoreBuilder, DocumentStoreError,
    DocumentStoreInitialConfiguration, DocumentStoreMessage,
};

/**
This is a handle to the actor.

Only one DocumentStoreActor should exist per database cluster when possible
to reduce resource usage. Cloning this handle is very cheap and will not
instantiate a new actor in the background. It is recommended to clone this
handle to each component that needs to talk to the cluster. When the last
handle goes out of scope and is dropped, the backing actor will also be
dropped.
*/
#[derive(Clone, Debug)]
pub struct DocumentStore {
    sender: mpsc::Sender<DocumentStoreMessage>,
}

impl DocumentStore {
    pub fn builder() -> DocumentStoreBuilder {
        DocumentStoreBuilder::default()
    }

    // This is pub(crate) so only the builder can crank it out
    pub(crate) fn new(initial_config: DocumentStoreInitialConfiguration) -> Self {
        let (sender, receiver) = mpsc::channel(8);
        let actor = DocumentStoreActor::new(receiver, initial_config);
        tokio::spawn(run_document_store_actor(actor));

        Self { sender }
    }

    /// Runs `command` against the cluster through the default database's
    /// request executor.
    #[instrument(level = "debug", name = "Actor Handle - Execute Command", skip_all)]
    pub async fn execute<C: RavenCommand>(
        &self,
        command: &C,
    ) -> Result<C::Result, DocumentStoreError> {
        let executor = self.get_request_executor(None).await?;
        Ok(executor.execute(command).await?)
    }

    /// Returns the cached [`RequestExecutor`] for `database`, or for the
    /// store's default database when `None`. Created lazily on first use;
    /// later calls for the same database share the executor and its
    /// topology cache.
    #[instrument(
        level = "debug",
        name = "Actor Handle - Get Request Executor",
        skip(self)
    )]
    pub async fn get_request_executor(
        &self,
        database: Option<String>,
    ) -> Result<RequestExecutor, DocumentStoreError> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .sender
            .send(DocumentStoreMessage::GetRequestExecutor {
                database_name: database,
                respond_to: tx,
            })
            .await;
        rx.await.map_err(|_| DocumentStoreError::StoreClosed)?
    }

    /// The store's default database name, if one was configured.
    pub async fn get_database(&self) -> Result<Option<String>, DocumentStoreError> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .sender
            .send(DocumentStoreMessage::GetDatabase { respond_to: tx })
            .await;
        rx.await.map_err(|_| DocumentStoreError::StoreClosed)
    }

    /// Produces the next HiLo id for `collection` in the default database,
    /// e.g. `"Products/42-A"`.
    #[instrument(
        level = "debug",
        name = "Actor Handle - Generate Document Id",
        skip(self)
    )]
    pub async fn generate_document_id(
        &self,
        collection: &str,
    ) -> Result<String, DocumentStoreError> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .sender
            .send(DocumentStoreMessage::GenerateDocumentId {
                database_name: None,
                collection: collection.to_string(),
                respond_to: tx,
            })
            .await;
        rx.await.map_err(|_| DocumentStoreError::StoreClosed)?
    }

    /// Asks every cached executor to refresh its topology.
    pub async fn update_topology(&self) -> Result<(), DocumentStoreError> {
        self.sender
            .send(DocumentStoreMessage::UpdateTopology)
            .await
            .map_err(|_| DocumentStoreError::StoreClosed)
    }

    /// Returns unused HiLo ranges to the server and stops the actor.
    /// Further calls through any clone of this handle fail with
    /// [`DocumentStoreError::StoreClosed`].
    #[instrument(level = "debug", name = "Actor Handle - Close", skip(self))]
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(DocumentStoreMessage::Close { respond_to: tx })
            .await
            .is_err()
        {
            return;
        }
        let _ = rx.await;
    }

    pub fn open_session(&self) -> Result<DocumentSession, DocumentStoreError> {
        let session = DocumentSession::new(self.clone());
        Ok(session)
    }
}
