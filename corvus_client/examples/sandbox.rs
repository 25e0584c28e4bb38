use corvus_client::{
    commands::databases::GetStatisticsCommand,
    request_executor::{RequestExecutor, TransportConfig},
    DocumentConventions,
};
use url::Url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let executor = RequestExecutor::create_for_single_node(
        Url::parse("http://localhost:8080")?,
        "northwind",
        DocumentConventions::default_for_single_server(),
        TransportConfig::default(),
    )?;

    let r = executor.execute(&GetStatisticsCommand::new()).await;
    dbg!(&r);

    Ok(())
}
