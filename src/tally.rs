//! Vote tally for one application
//!
//! The tally is a grow-only set of voters plus two counters. Counters are
//! always recomputed from the observed ballots on merge and never trusted
//! from storage.


use crate::transport::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Which ballot emote(s) a voter was first seen under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ballot {
    Approve,
    Deny,
    /// Reacted with both ballot emotes
    Split,
}

/// Persisted tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    /// Every identity that has ever voted; presence is what counts
    pub entries: BTreeMap<UserId, Ballot>,
    pub approvals: u32,
    pub denials: u32,
}

impl VoteTally {
    /// Value shown in the message's vote-count field
    pub fn display_count(&self) -> String {
        self.entries.len().to_string()
    }

    pub fn voters(&self) -> usize {
        self.entries.len()
    }
}

/// Reactors currently observed on the two ballot emotes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedBallots {
    pub approve: BTreeSet<UserId>,
    pub deny: BTreeSet<UserId>,
}

impl ObservedBallots {
    pub fn new(
        approve: impl IntoIterator<Item = UserId>,
        deny: impl IntoIterator<Item = UserId>,
    ) -> Self {
        Self {
            approve: approve.into_iter().collect(),
            deny: deny.into_iter().collect(),
        }
    }

    fn ballot_of(&self, user: &UserId) -> Option<Ballot> {
        match (self.approve.contains(user), self.deny.contains(user)) {
            (true, true) => Some(Ballot::Split),
            (true, false) => Some(Ballot::Approve),
            (false, true) => Some(Ballot::Deny),
            (false, false) => None,
        }
    }
}

/// Merge an observed snapshot into an existing tally.
///
/// Entries are the union of existing entries and every observed reactor not in
/// `exclude`; existing entries are never removed or rewritten. Counters are
/// derived from the snapshot alone. An identity seen under both emotes counts
/// toward neither counter.
pub fn merge(
    existing: &VoteTally,
    observed: &ObservedBallots,
    exclude: &HashSet<UserId>,
) -> VoteTally {
    let mut entries = existing.entries.clone();
    let mut approvals = 0u32;
    let mut denials = 0u32;

    for user in observed.approve.union(&observed.deny) {
        if exclude.contains(user) {
            continue;
        }
        let Some(ballot) = observed.ballot_of(user) else {
            continue;
        };

        match ballot {
            Ballot::Approve => approvals += 1,
            Ballot::Deny => denials += 1,
            Ballot::Split => {
                tracing::warn!(
                    user = %user,
                    "Identity reacted with both ballot emotes; excluded from counters"
                );
            }
        }

        entries.entry(user.clone()).or_insert(ballot);
    }

    VoteTally {
        entries,
        approvals,
        denials,
    }
}
