use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gantry_orchestrator::api::{self, AppState};
use gantry_orchestrator::auth::{Authorizer, MembershipAuthorizer, OpenAuthorizer};
use gantry_orchestrator::clock::SystemClock;
use gantry_orchestrator::config::Config;
use gantry_orchestrator::db;
use gantry_orchestrator::dispatch::{self, QueueDispatcher};
use gantry_orchestrator::notify::LogNotifier;
use gantry_orchestrator::repository::{MemoryStore, PgStore, Store};
use gantry_orchestrator::service::{Collaborators, PipelineService, StoreBuildCanceller, reconcile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gantry Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let (store, authorizer): (Arc<dyn Store>, Arc<dyn Authorizer>) = if config.in_memory {
        tracing::warn!("Using in-memory store, state is lost on restart");
        (Arc::new(MemoryStore::new()), Arc::new(OpenAuthorizer))
    } else {
        tracing::info!("Connecting to database...");

        let pool = db::create_pool(&config.database_url, config.max_connections)
            .await
            .context("Failed to create database pool")?;

        tracing::info!("Database connection pool created");

        db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        (
            Arc::new(PgStore::new(pool.clone())),
            Arc::new(MembershipAuthorizer::new(pool)),
        )
    };

    let (dispatcher, jobs) = QueueDispatcher::new(config.dispatch_enabled);
    tokio::spawn(dispatch::drain(jobs));

    let service = Arc::new(PipelineService::new(
        store.clone(),
        Collaborators {
            notifier: Arc::new(LogNotifier),
            dispatcher: Arc::new(dispatcher),
            canceller: Arc::new(StoreBuildCanceller::new(store)),
            clock: Arc::new(SystemClock),
            queue: config.dispatch_queue.clone(),
        },
    ));

    tokio::spawn(reconcile::run(service.clone(), config.sweep_interval));

    // Build router with all API endpoints
    let app = api::create_router(AppState {
        service,
        authorizer,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
