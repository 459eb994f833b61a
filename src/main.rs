use anyhow::Context;
use caracal::broker::Broker;
use caracal::config::BrokerConfig;
use caracal::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let environment = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CARACAL_ENV").ok())
        .unwrap_or_else(|| "dev".to_string());

    let config = BrokerConfig::load(&environment)
        .with_context(|| format!("loading configuration for environment '{environment}'"))?;

    tracing::info!(
        environment = %environment,
        port = config.server.port,
        data_dir = %config.data_directory.display(),
        "starting caracal broker"
    );

    let broker = Broker::build(config.clone()).context("assembling broker")?;
    let router = server::router(broker.app_state());

    let served = server::serve(router, config.server.port, shutdown_signal()).await;

    broker.shutdown().await;
    served.context("http server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
