//! Full resynchronization of every application
//!
//! Recovers from downtime: reactions added while offline are merged, closed
//! votes get their markers, and vote messages deleted externally are
//! re-posted for decided applications.

use super::locks::PassLocks;
use super::reconciler::Reconciler;
use super::traits::{ApplicationPoster, ApplicationStore};
use super::PassOutcome;
use crate::db::Application;
use crate::transport::Transport;
use serde::Serialize;
use std::sync::Arc;

/// Per-sweep counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub visited: usize,
    pub reconciled: usize,
    /// Messages re-posted; one whose follow-up pass aborted is also in `failed`
    pub recreated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of resyncing one application
#[derive(Debug)]
enum Resync {
    Reconciled(PassOutcome),
    Recreated(PassOutcome),
    Skipped,
    Failed,
}

/// Visits every application sequentially, one complete pass at a time
pub struct ResyncSweep<T, S, P> {
    reconciler: Arc<Reconciler<T, S>>,
    locks: Arc<PassLocks>,
    poster: P,
}

impl<T, S, P> ResyncSweep<T, S, P>
where
    T: Transport,
    S: ApplicationStore,
    P: ApplicationPoster,
{
    pub fn new(reconciler: Arc<Reconciler<T, S>>, locks: Arc<PassLocks>, poster: P) -> Self {
        Self {
            reconciler,
            locks,
            poster,
        }
    }

    pub async fn run(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let applications = match self.reconciler.store().list_applications().await {
            Ok(applications) => applications,
            Err(e) => {
                tracing::error!(error = %e, "Resync sweep could not list applications");
                return report;
            }
        };

        tracing::info!(count = applications.len(), "Starting resync sweep");
        for listed in applications {
            report.visited += 1;
            match self.resync(listed).await {
                Resync::Reconciled(outcome) if outcome.is_aborted() => report.failed += 1,
                Resync::Reconciled(_) => report.reconciled += 1,
                Resync::Recreated(outcome) => {
                    report.recreated += 1;
                    if outcome.is_aborted() {
                        report.failed += 1;
                    }
                }
                Resync::Skipped => report.skipped += 1,
                Resync::Failed => report.failed += 1,
            }
        }

        tracing::info!(
            visited = report.visited,
            reconciled = report.reconciled,
            recreated = report.recreated,
            skipped = report.skipped,
            failed = report.failed,
            "Resync sweep complete"
        );
        report
    }

    async fn resync(&self, listed: Application) -> Resync {
        let _guard = self.locks.acquire(&listed.message_ref).await;

        // Re-read under the lock; a router pass may have run since listing
        let mut application = match self
            .reconciler
            .store()
            .find_by_message_ref(&listed.message_ref)
            .await
        {
            Ok(Some(application)) if application.id == listed.id => application,
            Ok(_) => {
                tracing::debug!(application_id = %listed.id, "Application rebound since listing");
                return Resync::Skipped;
            }
            Err(e) => {
                tracing::error!(application_id = %listed.id, error = %e, "Application reload failed");
                return Resync::Failed;
            }
        };

        let fetched = self
            .reconciler
            .transport()
            .get_message(&application.message_ref)
            .await;

        match fetched {
            Ok(message) => {
                Resync::Reconciled(self.reconciler.reconcile(&mut application, &message).await)
            }
            Err(e) if e.is_missing() => {
                if application.is_awaiting() {
                    tracing::warn!(
                        application_id = %application.id,
                        message = %application.message_ref,
                        "Vote message missing for open application; leaving as-is"
                    );
                    return Resync::Skipped;
                }
                self.recreate(application).await
            }
            Err(e) if e.kind.is_transient() => {
                tracing::warn!(
                    application_id = %application.id,
                    message = %application.message_ref,
                    error = %e,
                    "Vote message unreachable; will retry on next sweep"
                );
                Resync::Failed
            }
            Err(e) => {
                tracing::error!(
                    application_id = %application.id,
                    message = %application.message_ref,
                    kind = ?e.kind,
                    error = %e,
                    "Vote message fetch rejected"
                );
                Resync::Failed
            }
        }
    }

    /// Post a replacement message, rebind the application to it, and bring it
    /// to its terminal state
    async fn recreate(&self, mut application: Application) -> Resync {
        let previous = application.message_ref.clone();

        let message = match self.poster.post_application_message(&application).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(application_id = %application.id, error = %e, "Failed to re-post vote message");
                return Resync::Failed;
            }
        };

        // Held from before the binding is saved, so a reaction on the fresh
        // message cannot be routed as an orphan in between
        let _guard = self.locks.acquire(&message.reference).await;

        application.message_ref = message.reference.clone();
        if let Err(e) = self.reconciler.store().save(&application).await {
            tracing::error!(
                application_id = %application.id,
                message = %message.reference,
                error = %e,
                "Failed to persist rebound message; withdrawing it"
            );
            // Unbound, the new message would be recreated again next sweep
            if let Err(e) = self.reconciler.transport().delete_message(&message.reference).await {
                tracing::warn!(message = %message.reference, error = %e, "Failed to withdraw unbound message");
            }
            return Resync::Failed;
        }

        tracing::warn!(
            application_id = %application.id,
            previous = %previous,
            current = %message.reference,
            "Recreated missing vote message"
        );

        Resync::Recreated(self.reconciler.reconcile(&mut application, &message).await)
    }
}
