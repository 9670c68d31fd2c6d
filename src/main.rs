use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use golem::agent::Agent;
use golem::automations::AutomationSet;
use golem::config::AgentConfig;
use golem::history::SqliteHistory;
use golem::llm_client::LlmClient;
use golem::world::RemoteWorld;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,golem=debug")),
        )
        .init();

    let config = AgentConfig::load();
    tracing::info!(
        "Starting {} (world: {}, model: {})",
        config.username,
        config.world_url,
        config.llm_model
    );

    let history = Arc::new(SqliteHistory::open(&config.database_path)?);
    let generator = Arc::new(LlmClient::new(
        config.llm_api_url.clone(),
        config.llm_model.clone(),
        config.llm_api_key.clone(),
        config.username.clone(),
        config.system_prompt.clone(),
    ));

    let (world, events) = RemoteWorld::connect(&config.world_url).await?;

    let (event_tx, event_rx) = flume::unbounded();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv_async().await {
            tracing::debug!("Agent event: {:?}", event);
        }
    });

    let agent = Agent::new(
        config,
        generator,
        history,
        world,
        AutomationSet::empty(),
        event_tx,
    )
    .await;

    if let Err(e) = agent.run(events).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}
