//! Incremental reconciliation driven by reaction notifications

use super::locks::PassLocks;
use super::reconciler::Reconciler;
use super::traits::ApplicationStore;
use super::PassOutcome;
use crate::transport::{MessageRef, ReactionEvent, Transport};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Why a notification was dropped without a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Message lives outside the vote surface
    OtherSurface,
    /// The bot's own reaction
    OwnReaction,
}

/// What handling one notification did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Ignored(IgnoreReason),
    /// Message could not be re-fetched
    Unavailable,
    /// Application lookup failed
    LookupFailed,
    /// No application owns the message; it was deleted (or deletion was attempted)
    OrphanRemoved { deleted: bool },
    Reconciled(PassOutcome),
}

/// Routes reaction-add notifications to reconciliation passes
pub struct EventRouter<T, S> {
    reconciler: Arc<Reconciler<T, S>>,
    locks: Arc<PassLocks>,
}

impl<T, S> EventRouter<T, S>
where
    T: Transport + 'static,
    S: ApplicationStore + 'static,
{
    pub fn new(reconciler: Arc<Reconciler<T, S>>, locks: Arc<PassLocks>) -> Self {
        Self { reconciler, locks }
    }

    /// Process notifications one at a time until the channel closes
    pub async fn run(self, mut events: mpsc::Receiver<ReactionEvent>) {
        tracing::info!("Starting reaction event router");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::info!("Reaction event router stopped");
    }

    pub async fn handle(&self, event: ReactionEvent) -> RouteOutcome {
        let context = self.reconciler.context();

        if event.user == context.bot {
            tracing::debug!(message = %event.message, "Ignoring own reaction");
            return RouteOutcome::Ignored(IgnoreReason::OwnReaction);
        }
        if event.message.surface_id != context.vote_surface {
            tracing::debug!(message = %event.message, "Ignoring reaction outside vote surface");
            return RouteOutcome::Ignored(IgnoreReason::OtherSurface);
        }

        let _guard = self.locks.acquire(&event.message).await;

        // The notification's copy of the message may already be stale
        let message = match self.reconciler.transport().get_message(&event.message).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(message = %event.message, error = %e, "Could not fetch reacted message");
                return RouteOutcome::Unavailable;
            }
        };
        if message.reference.surface_id != context.vote_surface {
            return RouteOutcome::Ignored(IgnoreReason::OtherSurface);
        }

        let application = match self
            .reconciler
            .store()
            .find_by_message_ref(&message.reference)
            .await
        {
            Ok(Some(application)) => application,
            Ok(None) => return self.remove_orphan(&message.reference).await,
            Err(e) => {
                tracing::error!(message = %message.reference, error = %e, "Application lookup failed");
                return RouteOutcome::LookupFailed;
            }
        };

        let mut application = application;
        let outcome = self.reconciler.reconcile(&mut application, &message).await;
        RouteOutcome::Reconciled(outcome)
    }

    async fn remove_orphan(&self, reference: &MessageRef) -> RouteOutcome {
        tracing::warn!(message = %reference, "Vote message has no application; deleting it");
        match self.reconciler.transport().delete_message(reference).await {
            Ok(()) => RouteOutcome::OrphanRemoved { deleted: true },
            Err(e) => {
                tracing::error!(message = %reference, error = %e, "Failed to delete orphaned message");
                RouteOutcome::OrphanRemoved { deleted: false }
            }
        }
    }
}
