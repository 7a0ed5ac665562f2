//! Vote reconciliation
//!
//! Keeps each application's persisted tally and its remote vote message in
//! agreement. Both entry points, the [`EventRouter`] (one reaction at a time)
//! and the [`ResyncSweep`] (every application, after startup or on demand),
//! end in a single [`Reconciler`] pass.
//!
//! There is no retry queue. A pass is idempotent and the tally merge is
//! monotonic, so any step that fails is simply redone by the next event or
//! sweep touching the same message.

mod cleanup;
mod locks;
mod reconciler;
mod router;
mod sweep;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use cleanup::CleanupReport;
pub use locks::PassLocks;
pub use reconciler::Reconciler;
pub use router::EventRouter;
pub use sweep::{ResyncSweep, SweepReport};
pub use traits::*;

use crate::config::Emotes;
use crate::db::ApplicationStatus;
use crate::transport::{DiscordClient, Emote, LoggingTransport, SurfaceId, UserId};
use std::fmt;
use std::sync::Arc;

/// Transport used in production
pub type LiveTransport = Arc<LoggingTransport<DiscordClient>>;

/// Type aliases for production wiring with concrete implementations
pub type ProductionReconciler = Reconciler<LiveTransport, DatabaseStore>;
pub type ProductionRouter = EventRouter<LiveTransport, DatabaseStore>;
pub type ProductionSweep = ResyncSweep<LiveTransport, DatabaseStore, EmbedPoster<LiveTransport>>;

/// Fixed facts every pass needs
#[derive(Debug, Clone)]
pub struct VoteContext {
    /// The bot's own identity; never a voter, never pruned
    pub bot: UserId,
    pub vote_surface: SurfaceId,
    pub emotes: Emotes,
    pub votes_field: String,
}

impl VoteContext {
    /// Emote marking the decision, `None` while voting is open
    pub fn outcome_emote(&self, status: ApplicationStatus) -> Option<&Emote> {
        match status {
            ApplicationStatus::Awaiting => None,
            ApplicationStatus::Approved => Some(&self.emotes.approve),
            ApplicationStatus::Denied => Some(&self.emotes.deny),
        }
    }
}

/// The step of a pass that performed a remote or persistent mutation (or read)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStep {
    AddBallot,
    FetchReactors,
    Persist,
    EditMessage,
    ClearReactions,
    AddAcknowledgment,
    AddOutcome,
}

impl fmt::Display for PassStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddBallot => "add_ballot",
            Self::FetchReactors => "fetch_reactors",
            Self::Persist => "persist",
            Self::EditMessage => "edit_message",
            Self::ClearReactions => "clear_reactions",
            Self::AddAcknowledgment => "add_acknowledgment",
            Self::AddOutcome => "add_outcome",
        };
        f.write_str(name)
    }
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Voting is open; ballots ensured, tally merged and displayed
    TallyRecorded {
        ballots_added: usize,
        voters: usize,
        approvals: u32,
        denials: u32,
        saved: bool,
        edited: bool,
    },
    /// Reactions replaced with the acknowledgment and outcome markers
    Finalized { outcome: Emote },
    /// Markers already in place; stray reactors removed
    Pruned(CleanupReport),
    /// A step failed; later steps were not attempted
    Aborted { step: PassStep, error: String },
}

impl PassOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
