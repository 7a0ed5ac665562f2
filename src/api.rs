//! HTTP API for votekeeper
//!
//! Ingress for reaction notifications plus on-demand resync.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::reconcile::{ApplicationPoster, ApplicationStore, ResyncSweep, SweepReport};
use crate::transport::{ReactionEvent, Transport};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Anything that can run a full resync on demand
#[async_trait]
pub trait Resync: Send + Sync {
    async fn resync(&self) -> SweepReport;
}

#[async_trait]
impl<T, S, P> Resync for ResyncSweep<T, S, P>
where
    T: Transport,
    S: ApplicationStore,
    P: ApplicationPoster,
{
    async fn resync(&self) -> SweepReport {
        self.run().await
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Queue feeding the event router
    pub events: mpsc::Sender<ReactionEvent>,
    pub sweep: Arc<dyn Resync>,
}

impl AppState {
    pub fn new(events: mpsc::Sender<ReactionEvent>, sweep: Arc<dyn Resync>) -> Self {
        Self { events, sweep }
    }
}
