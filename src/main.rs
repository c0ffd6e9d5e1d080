//! Vesta - personal assistant context pipeline
//!
//! Demo entry point: wires the in-memory services behind a coordinator,
//! seeds a small health zone, runs one enriched turn and prints the prompt
//! block the model would receive.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use vesta::services::{
    ExecutionService, SchemasService, ToolDataService, ToolService, ZoneService,
};
use vesta::{PipelineConfig, TurnPipeline};
use vesta_core::{
    Coordinator, HistoryStore, MemoryHistoryStore, Params, ResourceService, ServiceCoordinator,
    SqliteHistoryStore,
};
use vesta_tasks::{StatsRefreshService, TransientStore};

/// Vesta demo runner
#[derive(Debug, Parser)]
#[command(name = "vesta", version, about)]
struct Cli {
    /// SQLite history database path (in-memory history when omitted)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Resolve time filters symbolically, as an automation context would
    #[arg(long)]
    relative: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vesta=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load().unwrap_or_default();
    if cli.database.is_some() {
        config.database_path = cli.database;
    }

    let history: Arc<dyn HistoryStore> = match &config.database_path {
        Some(path) => Arc::new(SqliteHistoryStore::from_path(path).await?),
        None => Arc::new(MemoryHistoryStore::new()),
    };

    let coordinator = Arc::new(ServiceCoordinator::new());
    let tools = Arc::new(ToolService::new());
    coordinator.register(Arc::new(ZoneService::new())).await;
    coordinator
        .register(Arc::clone(&tools) as Arc<dyn ResourceService>)
        .await;
    coordinator
        .register(Arc::new(ToolDataService::new(
            Arc::clone(&tools),
            config.sample_size,
        )))
        .await;
    coordinator
        .register(Arc::new(ExecutionService::new(Arc::clone(&tools))))
        .await;
    coordinator
        .register(Arc::new(SchemasService::with_defaults()))
        .await;
    coordinator
        .register(Arc::new(StatsRefreshService::new(
            Arc::clone(&coordinator) as Arc<dyn Coordinator>,
            Arc::new(TransientStore::new()),
        )))
        .await;

    seed_demo_data(&coordinator).await?;

    let pipeline = TurnPipeline::new(
        Arc::clone(&coordinator) as Arc<dyn Coordinator>,
        history,
        config,
    );
    let session = Uuid::new_v4();
    let cancel = CancellationToken::new();

    info!(session = %session, "running demo turn");
    let enrichments = vec![
        json!({
            "type": "pointer",
            "selectedPath": "tools.sleep",
            "selectionLevel": "INSTANCE",
            "selectedContext": "DATA",
            "selectedResources": ["schema", "data"],
            "importance": "essential",
            "timestampSelection": {"relativeStart": {"offset": -1, "type": "WEEK"}}
        }),
        json!({
            "type": "use",
            "toolInstanceId": "sleep",
            "operationHint": "log last night"
        }),
    ];

    let outcome = pipeline
        .run_turn(&enrichments, Some(session), cli.relative, &cancel)
        .await?;

    for summary in &outcome.enrichment_summaries {
        println!("- {summary}");
    }
    println!("\n{}\n", outcome.prompt_block);
    for message in &outcome.messages {
        println!("[{}] {}", message.message_type, message.summary);
    }

    Ok(())
}

async fn seed_demo_data(coordinator: &ServiceCoordinator) -> Result<()> {
    let cancel = CancellationToken::new();

    let mut zone = Params::new();
    zone.insert("id".into(), json!("health"));
    zone.insert("name".into(), json!("Health"));
    run(coordinator, "zones.create", zone, &cancel).await?;

    let mut tool = Params::new();
    tool.insert("id".into(), json!("sleep"));
    tool.insert("name".into(), json!("Sleep Tracker"));
    tool.insert("tool_type".into(), json!("tracker"));
    tool.insert("zone_id".into(), json!("health"));
    run(coordinator, "tools.create", tool, &cancel).await?;

    for (value, days_ago) in [(7.5, 1i64), (6.0, 2), (8.2, 3)] {
        let timestamp = chrono::Utc::now().timestamp_millis() - days_ago * 86_400_000;
        let mut entry = Params::new();
        entry.insert("id".into(), json!("sleep"));
        entry.insert(
            "data".into(),
            json!({"value": value, "timestamp": timestamp}),
        );
        run(coordinator, "tool_data.create", entry, &cancel).await?;
    }

    Ok(())
}

async fn run(
    coordinator: &ServiceCoordinator,
    command_id: &str,
    params: Params,
    cancel: &CancellationToken,
) -> Result<()> {
    let result = coordinator.process_command(command_id, &params, cancel).await;
    anyhow::ensure!(
        result.success,
        "seed command {command_id} failed: {}",
        result.error.unwrap_or_default()
    );
    Ok(())
}
