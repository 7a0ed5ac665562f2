//! Excess reaction cleanup for closed votes
//!
//! Once a vote is closed its marker emotes should carry exactly one reactor,
//! the bot. Anything else (manual reactions, duplicates from retried sweeps)
//! is removed.

use crate::transport::{Emote, Message, Transport, TransportError, UserId};
use futures::future::join_all;

/// What a cleanup removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    /// Removals that failed; left for the next pass
    pub failed: usize,
}

impl CleanupReport {
    pub fn merge(self, other: Self) -> Self {
        Self {
            removed: self.removed + other.removed,
            failed: self.failed + other.failed,
        }
    }
}

/// Remove every reactor of `emote` except `keep`.
///
/// Does nothing while the emote has at most one reactor. Removals are issued
/// concurrently and individual failures are only logged. Fetching the reactor
/// list is the one failure returned to the caller.
pub async fn prune_excess_reactions<T: Transport + ?Sized>(
    transport: &T,
    message: &Message,
    emote: &Emote,
    keep: &UserId,
) -> Result<CleanupReport, TransportError> {
    if message.reactions.count(emote) <= 1 {
        return Ok(CleanupReport::default());
    }

    let reactors = transport.get_reactors(&message.reference, emote).await?;
    let removals = reactors
        .users
        .iter()
        .filter(|user| *user != keep)
        .map(|user| async move {
            let result = transport
                .remove_reaction(&message.reference, emote, user)
                .await;
            (user, result)
        });

    let mut report = CleanupReport::default();
    for (user, result) in join_all(removals).await {
        match result {
            Ok(()) => report.removed += 1,
            Err(e) => {
                tracing::warn!(
                    message = %message.reference,
                    emote = %emote,
                    user = %user,
                    error = %e,
                    "Failed to remove excess reaction"
                );
                report.failed += 1;
            }
        }
    }

    if report.removed > 0 {
        tracing::debug!(
            message = %message.reference,
            emote = %emote,
            removed = report.removed,
            "Pruned excess reactions"
        );
    }
    Ok(report)
}
