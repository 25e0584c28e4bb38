/*!
corvus_client is a client library for RavenDB-compatible document database
clusters. It keeps a versioned view of cluster membership, routes each
command to a reachable node, fails over when a node stops answering, and
allocates document ids locally from server-issued HiLo ranges.

This library requires tokio and async, and uses the actor pattern to maintain
a single instance of the [`DocumentStore`] per cluster. Cloning the store
handle is cheap; the backing actor owns the per-database request executors
and the HiLo id generators.

A [`DocumentSession`] can be requested from the [`DocumentStore`] to interact
with the database.

# Example
// ```rust
// use corvus_client::DocumentStore;
//
// let document_store = DocumentStore::builder()
//     .set_urls(&["http://localhost:8080"])
//     .set_database_name("northwind")
//     .build()?;
// let session = document_store.open_session()?;
//
// //...run commands here...
//
// document_store.close().await;
// ```
*/

mod document_conventions;
mod document_session;
mod document_store;
mod node_selector;

pub mod cluster_topology;
pub mod commands;
pub mod database_topology;
pub mod hilo;
pub mod raven_command;
pub mod request_executor;
pub mod server_node;
pub mod topology;

pub use document_conventions::DocumentConventions;
pub use document_session::*;
pub use document_store::*;

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
