use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::TryStreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docflow::audit::AuditTrail;
use docflow::config::{self, Config};
use docflow::notification::webhook::WebhookDispatcher;
use docflow::notification::{DeliveryPolicy, LogDispatcher, NotificationDispatcher, Notifier};
use docflow::org::seed::{OrgSeed, OrgState};
use docflow::store::memory::MemoryStore;
use docflow::store::postgres::PgStore;
use docflow::store::{AuditStore, DocumentStore};
use docflow::workflow::ApprovalWorkflowEngine;
use docflow::{api, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "docflow"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "docflow=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Migrate) => {
            let db = connect(&cfg).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Some(cli::Commands::Seed { command }) => handle_seed_command(command),
        Some(cli::Commands::History {
            document_id,
            offset,
        }) => print_history(&cfg, &document_id, offset).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn connect(cfg: &Config) -> anyhow::Result<PgStore> {
    let url = cfg
        .database_url
        .as_deref()
        .context("DATABASE_URL is not set")?;
    PgStore::connect(url).await
}

fn load_org(cfg: &Config) -> anyhow::Result<OrgState> {
    match cfg.org_seed.as_deref() {
        Some(path) => {
            tracing::info!(path, "Loading organization seed...");
            Ok(OrgSeed::load(path)?.apply()?)
        }
        None => {
            tracing::warn!("DOCFLOW_ORG_SEED is not set; starting with an empty organization");
            Ok(OrgState::default())
        }
    }
}

fn build_notifier(cfg: &Config) -> anyhow::Result<Notifier> {
    let dispatcher: Arc<dyn NotificationDispatcher> = if cfg.webhook_urls.is_empty() {
        Arc::new(LogDispatcher)
    } else {
        Arc::new(WebhookDispatcher::new(
            cfg.webhook_urls.clone(),
            cfg.webhook_secret.clone(),
            cfg.notify_timeout(),
        )?)
    };
    tracing::info!(dispatcher = dispatcher.name(), "Notifications configured");
    Ok(Notifier::new(
        dispatcher,
        DeliveryPolicy {
            timeout: cfg.notify_timeout(),
            max_attempts: cfg.notify_max_attempts,
            ..DeliveryPolicy::default()
        },
    ))
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let org = load_org(&cfg)?;
    let notifier = build_notifier(&cfg)?;

    let (documents, audit_store, db): (Arc<dyn DocumentStore>, Arc<dyn AuditStore>, _) =
        if cfg.database_url.is_some() {
            tracing::info!("Connecting to database...");
            let db = connect(&cfg).await?;
            tracing::info!("Running migrations...");
            db.migrate().await?;
            (Arc::new(db.clone()), Arc::new(db.clone()), Some(db))
        } else {
            tracing::warn!("DATABASE_URL is not set; documents are kept in memory only");
            let mem = MemoryStore::new();
            (Arc::new(mem.clone()), Arc::new(mem), None)
        };

    let engine = ApprovalWorkflowEngine::new(org, documents, AuditTrail::new(audit_store), notifier);
    let app = api::app(AppState::new(engine, db));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("docflow listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn handle_seed_command(cmd: cli::SeedCommands) -> anyhow::Result<()> {
    match cmd {
        cli::SeedCommands::Check { file } => {
            let state = OrgSeed::load(&file)?
                .apply()
                .with_context(|| format!("seed {} is invalid", file.display()))?;
            println!(
                "Seed OK:\n  Branches: {}\n  Policies: {}",
                state.org.branch_count(),
                state.policies.len()
            );
        }
    }
    Ok(())
}

async fn print_history(cfg: &Config, document_id: &str, offset: i64) -> anyhow::Result<()> {
    let id = uuid::Uuid::parse_str(document_id).context("Invalid document id")?;
    let db = connect(cfg).await?;
    let trail = AuditTrail::new(Arc::new(db));

    let mut entries = trail.history(id, offset);
    let mut shown = 0usize;
    println!("{:<8} {:<26} {:<22} {:<30}", "SEQ", "AT", "ACTION", "ACTOR");
    while let Some(entry) = entries.try_next().await? {
        let actor = entry
            .actor
            .as_ref()
            .map(|a| a.display_name.as_str())
            .unwrap_or("-");
        println!(
            "{:<8} {:<26} {:<22} {:<30}",
            entry.seq,
            entry.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.action.as_str(),
            actor
        );
        shown += 1;
    }
    if shown == 0 {
        println!("No audit entries found.");
    }
    Ok(())
}
