//! votekeeper - reaction-based vote reconciliation
//!
//! Keeps application vote tallies in agreement with the reactions on their
//! vote messages, and drives closed votes to their terminal markers.

mod api;
mod config;
mod db;
mod reconcile;
mod tally;
mod transport;

use api::{create_router, AppState};
use config::Config;
use db::{Database, DbError};
use reconcile::{
    DatabaseStore, EmbedPoster, EventRouter, PassLocks, ProductionReconciler, ProductionRouter,
    ProductionSweep, Reconciler, ResyncSweep, VoteContext,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{DiscordClient, LoggingTransport, SurfaceId, Transport, TransportError, UserId};

/// Pending reaction notifications before the ingress starts rejecting
const EVENT_QUEUE_DEPTH: usize = 256;

/// Conditions that halt initialization
#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("vote channel {0} does not resolve")]
    SurfaceUnresolvable(SurfaceId),
}

/// Learn the bot's identity and confirm the vote channel is reachable
async fn connect<T: Transport>(transport: &T, surface: &SurfaceId) -> Result<UserId, StartupError> {
    let bot = transport.current_user().await?;
    if !transport.resolve_surface(surface).await? {
        return Err(StartupError::SurfaceUnresolvable(surface.clone()));
    }
    tracing::info!(bot = %bot, channel = %surface, "Connected to vote channel");
    Ok(bot)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "votekeeper=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env().map_err(StartupError::from)?;

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path).map_err(StartupError::from)?;

    let client = DiscordClient::new(config.discord_token.clone(), &config.api_base)
        .map_err(StartupError::from)?;
    let transport = Arc::new(LoggingTransport::new(client));

    let bot = connect(&transport, &config.vote_surface).await?;

    let context = VoteContext {
        bot,
        vote_surface: config.vote_surface.clone(),
        emotes: config.emotes.clone(),
        votes_field: config.votes_field.clone(),
    };
    let reconciler: Arc<ProductionReconciler> = Arc::new(Reconciler::new(
        Arc::clone(&transport),
        DatabaseStore::new(db),
        context,
    ));
    let locks = Arc::new(PassLocks::new());

    let poster = EmbedPoster::new(
        Arc::clone(&transport),
        config.vote_surface.clone(),
        config.votes_field.clone(),
    );
    let sweep: Arc<ProductionSweep> = Arc::new(ResyncSweep::new(
        Arc::clone(&reconciler),
        Arc::clone(&locks),
        poster,
    ));

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let router: ProductionRouter = EventRouter::new(reconciler, locks);
    tokio::spawn(router.run(events_rx));

    // Catch up on anything that changed while offline
    {
        let sweep = Arc::clone(&sweep);
        tokio::spawn(async move {
            sweep.run().await;
        });
    }

    let app = create_router(AppState::new(events_tx, sweep));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("votekeeper listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
