use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{instrument, Span};
use uuid::Uuid;

use crate::{
    hilo::MultiDatabaseHiLoIdGenerator,
    request_executor::{RequestExecutor, TransportConfig},
    DocumentStoreError, DocumentStoreInitialConfiguration, DocumentStoreMessage,
};

pub struct DocumentStoreActor {
    config: DocumentStoreInitialConfiguration,
    receiver: mpsc::Receiver<DocumentStoreMessage>,
    request_executors: HashMap<String, RequestExecutor>,
    id_generator: MultiDatabaseHiLoIdGenerator,
}

impl DocumentStoreActor {
    pub(crate) fn new(
        receiver: mpsc::Receiver<DocumentStoreMessage>,
        config: DocumentStoreInitialConfiguration,
    ) -> Self {
        Self {
            config,
            receiver,
            request_executors: HashMap::default(),
            id_generator: MultiDatabaseHiLoIdGenerator::new(),
        }
    }

    /// Message handler for the DocumentStoreActor. Returns `false` once the
    /// store has been closed and the run loop should stop.
    #[instrument(
        level = "debug",
        name = "DocumentStore Actor - Handle Message",
        skip(self, msg),
        fields(correlation_id)
    )]
    async fn handle_message(&mut self, msg: DocumentStoreMessage) -> bool {
        // Apply a correlation id to all child spans of this message handler
        Span::current().record("correlation_id", Uuid::new_v4().to_string());
        match msg {
            DocumentStoreMessage::GetRequestExecutor {
                database_name,
                respond_to,
            } => {
                let result = self.get_request_executor(database_name);
                let _ = respond_to.send(result);
            }
            DocumentStoreMessage::GetDatabase { respond_to } => {
                let _ = respond_to.send(self.config.database_name.clone());
            }
            DocumentStoreMessage::GenerateDocumentId {
                database_name,
                collection,
                respond_to,
            } => {
                let database = match database_name.or_else(|| self.config.database_name.clone()) {
                    Some(database) => database,
                    None => {
                        let _ = respond_to.send(Err(DocumentStoreError::UnexpectedError(
                            anyhow::anyhow!("Unable to determine which database to operate on"),
                        )));
                        return true;
                    }
                };
                let executor = match self.get_request_executor(Some(database.clone())) {
                    Ok(executor) => executor,
                    Err(e) => {
                        let _ = respond_to.send(Err(e));
                        return true;
                    }
                };
                let generator =
                    self.id_generator
                        .generator_for(&database, &collection, &executor);

                // The id fetch may hit the network; keep the actor loop free
                // while it runs.
                tokio::spawn(async move {
                    let result = generator
                        .generate_document_id()
                        .await
                        .map_err(DocumentStoreError::from);
                    let _ = respond_to.send(result);
                });
            }
            DocumentStoreMessage::UpdateTopology => {
                self.spawn_topology_updates();
            }
            DocumentStoreMessage::Close { respond_to } => {
                tracing::debug!("Closing the document store.");
                self.id_generator.return_unused_ranges().await;
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    /// See doc comments for [`DocumentStore`](crate::DocumentStore::get_request_executor)
    #[instrument(level = "debug", skip(self))]
    fn get_request_executor(
        &mut self,
        database: Option<String>,
    ) -> Result<RequestExecutor, DocumentStoreError> {
        // Get the database name that was passed in, or from the document store
        let database = match database.or_else(|| self.config.database_name.clone()) {
            Some(database) => database,
            None => {
                return Err(DocumentStoreError::UnexpectedError(anyhow::anyhow!(
                    "Unable to determine which database to operate on"
                )));
            }
        };

        // See if there is a stored executor for the database
        if let Some(executor) = self.request_executors.get(&database) {
            return Ok(executor.clone());
        }

        let transport = TransportConfig {
            client_identity: self.config.client_identity.clone(),
            dns_overrides: self.config.dns_overrides.clone(),
            proxy_address: self.config.proxy_address.clone(),
        };

        let executor = if self.config.conventions.disable_topology_updates() {
            // Single, specific server; topology is never fetched.
            RequestExecutor::create_for_single_node(
                self.config.initial_urls[0].clone(),
                database.clone(),
                self.config.conventions.clone(),
                transport,
            )?
        } else {
            RequestExecutor::create(
                self.config.initial_urls.clone(),
                database.clone(),
                self.config.conventions.clone(),
                transport,
            )?
        };

        // Clone the executor handle and store it in the document store
        self.request_executors.insert(database, executor.clone());

        Ok(executor)
    }

    fn spawn_topology_updates(&self) {
        tracing::debug!("Updating topology for all cached executors.");
        for executor in self.request_executors.values() {
            let executor = executor.clone();
            tokio::spawn(async move {
                if let Err(e) = executor.update_topology(false).await {
                    tracing::error!("There was an error updating the topology. Caused by: {}", e);
                }
            });
        }
    }
}

#[instrument(level = "debug", name = "Running Document Store Actor", skip(actor))]
pub async fn run_document_store_actor(mut actor: DocumentStoreActor) {
    let mut topology_update_timer =
        tokio::time::interval(actor.config.conventions.topology_cache_ttl());
    // The first tick fires immediately; skip it, there are no executors yet.
    topology_update_timer.tick().await;
    loop {
        tokio::select! {
            _ = topology_update_timer.tick() => {
                tracing::debug!("Updating topology via timer.");
                actor.spawn_topology_updates();
            },
            opt_msg = actor.receiver.recv() => {
                let msg = match opt_msg {
                    Some(msg) => msg,
                    None => break,
                };
                if !actor.handle_message(msg).await {
                    break;
                }
            },
        }
    }
}
