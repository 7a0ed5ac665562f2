//! Single-application reconciliation pass

use super::cleanup::{prune_excess_reactions, CleanupReport};
use super::traits::ApplicationStore;
use super::{PassOutcome, PassStep, VoteContext};
use crate::db::Application;
use crate::tally::{merge, ObservedBallots};
use crate::transport::{Emote, Message, Transport, UserId};
use std::collections::HashSet;

/// A step failure; ends the pass
#[derive(Debug)]
struct PassFailure {
    step: PassStep,
    error: String,
}

impl PassFailure {
    fn new(step: PassStep, error: impl ToString) -> Self {
        Self {
            step,
            error: error.to_string(),
        }
    }
}

/// Drives one vote message and its application toward the canonical state
/// for the application's status.
///
/// | status   | message state       | action                                   |
/// |----------|---------------------|------------------------------------------|
/// | awaiting | any                 | ensure ballots, merge tally, show count  |
/// | decided  | no acknowledgment   | clear reactions, add ack + outcome       |
/// | decided  | acknowledgment set  | prune extra reactors on ack and outcome  |
pub struct Reconciler<T, S> {
    transport: T,
    store: S,
    context: VoteContext,
}

impl<T, S> Reconciler<T, S>
where
    T: Transport,
    S: ApplicationStore,
{
    pub fn new(transport: T, store: S, context: VoteContext) -> Self {
        Self {
            transport,
            store,
            context,
        }
    }

    pub fn context(&self) -> &VoteContext {
        &self.context
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one pass against a fresh snapshot of the application's message.
    ///
    /// Never fails: a failing step is logged and reported as
    /// [`PassOutcome::Aborted`]. Any change to `application` is saved before
    /// this returns.
    pub async fn reconcile(&self, application: &mut Application, message: &Message) -> PassOutcome {
        let result = if application.is_awaiting() {
            self.record_votes(application, message).await
        } else {
            self.settle(application, message).await
        };

        match result {
            Ok(outcome) => {
                tracing::info!(
                    application_id = %application.id,
                    message = %message.reference,
                    outcome = ?outcome,
                    "Reconciliation pass complete"
                );
                outcome
            }
            Err(failure) => {
                tracing::error!(
                    application_id = %application.id,
                    message = %message.reference,
                    step = %failure.step,
                    error = %failure.error,
                    "Reconciliation pass aborted"
                );
                PassOutcome::Aborted {
                    step: failure.step,
                    error: failure.error,
                }
            }
        }
    }

    /// Open vote: ballots, tally, displayed count
    async fn record_votes(
        &self,
        application: &mut Application,
        message: &Message,
    ) -> Result<PassOutcome, PassFailure> {
        let emotes = &self.context.emotes;
        let reference = &message.reference;

        // Ballots go up once; a half-offered ballot is never tallied
        let mut ballots_added = 0;
        for emote in [&emotes.approve, &emotes.deny] {
            if message.reactions.contains(emote) {
                continue;
            }
            self.transport
                .add_reaction(reference, emote)
                .await
                .map_err(|e| PassFailure::new(PassStep::AddBallot, e))?;
            ballots_added += 1;
        }

        // The snapshot predates our own additions; they hold no votes anyway
        let observed = ObservedBallots::new(
            self.reactors_if_present(message, &emotes.approve).await?,
            self.reactors_if_present(message, &emotes.deny).await?,
        );
        let exclude = HashSet::from([self.context.bot.clone()]);
        let tally = merge(&application.tally, &observed, &exclude);

        let saved = tally != application.tally;
        if saved {
            let mut updated = application.clone();
            updated.tally = tally;
            self.store
                .save(&updated)
                .await
                .map_err(|e| PassFailure::new(PassStep::Persist, e))?;
            *application = updated;
        }

        let count = application.tally.display_count();
        let mut embed = message.embed.clone().unwrap_or_default();
        let shown = embed.field(&self.context.votes_field).map(|f| f.value.as_str());
        let edited = shown != Some(count.as_str());
        if edited {
            embed.upsert_field(&self.context.votes_field, count);
            self.transport
                .edit_message(reference, &embed)
                .await
                .map_err(|e| PassFailure::new(PassStep::EditMessage, e))?;
        }

        Ok(PassOutcome::TallyRecorded {
            ballots_added,
            voters: application.tally.voters(),
            approvals: application.tally.approvals,
            denials: application.tally.denials,
            saved,
            edited,
        })
    }

    async fn reactors_if_present(
        &self,
        message: &Message,
        emote: &Emote,
    ) -> Result<Vec<UserId>, PassFailure> {
        if !message.reactions.contains(emote) {
            return Ok(Vec::new());
        }
        let list = self
            .transport
            .get_reactors(&message.reference, emote)
            .await
            .map_err(|e| PassFailure::new(PassStep::FetchReactors, e))?;
        Ok(list.users)
    }

    /// Closed vote: terminal markers only
    async fn settle(
        &self,
        application: &Application,
        message: &Message,
    ) -> Result<PassOutcome, PassFailure> {
        let acknowledge = &self.context.emotes.acknowledge;
        let Some(outcome) = self.context.outcome_emote(application.status) else {
            return Ok(PassOutcome::Pruned(CleanupReport::default()));
        };
        let reference = &message.reference;

        // Only the bot's own acknowledgment marks a vote as closed
        if !message.reactions.placed_by_me(acknowledge) {
            self.transport
                .remove_all_reactions(reference)
                .await
                .map_err(|e| PassFailure::new(PassStep::ClearReactions, e))?;
            self.transport
                .add_reaction(reference, acknowledge)
                .await
                .map_err(|e| PassFailure::new(PassStep::AddAcknowledgment, e))?;
            self.transport
                .add_reaction(reference, outcome)
                .await
                .map_err(|e| PassFailure::new(PassStep::AddOutcome, e))?;
            return Ok(PassOutcome::Finalized {
                outcome: outcome.clone(),
            });
        }

        let mut report = CleanupReport::default();
        for emote in [acknowledge, outcome] {
            let pruned = prune_excess_reactions(&self.transport, message, emote, &self.context.bot)
                .await
                .map_err(|e| PassFailure::new(PassStep::FetchReactors, e))?;
            report = report.merge(pruned);
        }

        // A previous pass may have stopped between the two markers
        if !message.reactions.placed_by_me(outcome) {
            self.transport
                .add_reaction(reference, outcome)
                .await
                .map_err(|e| PassFailure::new(PassStep::AddOutcome, e))?;
            return Ok(PassOutcome::Finalized {
                outcome: outcome.clone(),
            });
        }
        Ok(PassOutcome::Pruned(report))
    }
}
