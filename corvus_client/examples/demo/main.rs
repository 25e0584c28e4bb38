use corvus_client::DocumentStore;
use tracing::subscriber::set_global_default;
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();

    let document_store = DocumentStore::builder()
        .set_urls(&["http://localhost:8080"])
        .set_database_name("northwind")
        .build()?;

    let session = document_store.open_session()?;
    match session.get_cluster_topology().await {
        Ok(topology) => {
            println!("{:#?}", topology);
        }
        Err(e) => {
            tracing::error!("Error happened: {}", &e);
            return Err(e);
        }
    };

    let id = document_store.generate_document_id("Products").await?;
    println!("Next document id: {id}");

    document_store.close().await;

    Ok(())
}

fn setup_tracing() {
    // Redirect all `log`'s events to the subscriber
    LogTracer::init().expect("Failed to set logger");
    // Set up tracing
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());
    set_global_default(subscriber).expect("Failed to set subscriber");
}
