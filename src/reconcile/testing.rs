//! In-memory doubles for reconciliation tests
//!
//! [`FakeTransport`] behaves like the remote surface: every read is a fresh
//! snapshot, mutations take effect immediately, and scripted failures can be
//! injected per operation.

use super::traits::ApplicationStore;
use super::VoteContext;
use crate::config::Emotes;
use crate::db::{Application, ApplicationStatus};
use crate::tally::VoteTally;
use crate::transport::{
    Embed, EmbedField, Emote, Message, MessageId, MessageRef, ReactionCount, ReactionSummary,
    ReactorList, SurfaceId, Transport, TransportError, TransportErrorKind, UserId,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// Fake Transport
// ============================================================================

/// A recorded transport call; recorded whether or not it succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetMessage(MessageRef),
    GetReactors(MessageRef, Emote),
    AddReaction(MessageRef, Emote),
    RemoveReaction(MessageRef, Emote, UserId),
    RemoveAllReactions(MessageRef),
    EditMessage(MessageRef),
    DeleteMessage(MessageRef),
    CreateMessage(SurfaceId),
    ResolveSurface(SurfaceId),
}

impl Call {
    fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::GetMessage(_) | Self::GetReactors(..) | Self::ResolveSurface(_)
        )
    }
}

/// Scripted failure; stays active until [`FakeTransport::clear_failures`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    GetMessage(MessageRef, TransportErrorKind),
    AddReaction(Emote),
    RemoveReaction(UserId),
    RemoveAllReactions(MessageRef),
    EditMessage,
    CreateMessage,
    ResolveSurface(TransportErrorKind),
}

#[derive(Debug, Clone)]
struct FakeMessage {
    author: UserId,
    embed: Option<Embed>,
    /// Reactors per emote, in reaction order
    reactions: Vec<(Emote, Vec<UserId>)>,
}

impl FakeMessage {
    fn reactors_mut(&mut self, emote: &Emote) -> &mut Vec<UserId> {
        let index = match self.reactions.iter().position(|(e, _)| e == emote) {
            Some(index) => index,
            None => {
                self.reactions.push((emote.clone(), Vec::new()));
                self.reactions.len() - 1
            }
        };
        &mut self.reactions[index].1
    }

    fn react(&mut self, emote: &Emote, user: UserId) {
        let reactors = self.reactors_mut(emote);
        if !reactors.contains(&user) {
            reactors.push(user);
        }
    }

    fn unreact(&mut self, emote: &Emote, user: &UserId) {
        for (e, reactors) in &mut self.reactions {
            if e == emote {
                reactors.retain(|u| u != user);
            }
        }
        self.reactions.retain(|(_, reactors)| !reactors.is_empty());
    }
}

#[derive(Default)]
struct FakeState {
    messages: BTreeMap<MessageRef, FakeMessage>,
    surfaces: BTreeSet<SurfaceId>,
    calls: Vec<Call>,
    failures: Vec<Failure>,
    next_id: usize,
}

/// In-memory remote surface
pub struct FakeTransport {
    bot: UserId,
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new(bot: &str) -> Self {
        Self {
            bot: UserId::from(bot),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Embed carrying only a vote-count field
    pub fn vote_embed(name: &str, value: &str) -> Embed {
        Embed {
            title: Some("Application".to_string()),
            fields: vec![EmbedField {
                name: name.to_string(),
                value: value.to_string(),
                inline: true,
            }],
            ..Embed::default()
        }
    }

    /// Place a message on the surface as if posted by `author`
    pub fn post(&self, reference: &MessageRef, author: &str, embed: Option<Embed>) {
        let mut state = self.state.lock().unwrap();
        state.surfaces.insert(reference.surface_id.clone());
        state.messages.insert(
            reference.clone(),
            FakeMessage {
                author: UserId::from(author),
                embed,
                reactions: Vec::new(),
            },
        );
    }

    pub fn clear_embed(&self, reference: &MessageRef) {
        if let Some(message) = self.state.lock().unwrap().messages.get_mut(reference) {
            message.embed = None;
        }
    }

    /// A user reaction arriving from outside
    pub fn react(&self, reference: &MessageRef, emote: &Emote, user: &str) {
        if let Some(message) = self.state.lock().unwrap().messages.get_mut(reference) {
            message.react(emote, UserId::from(user));
        }
    }

    pub fn reactors(&self, reference: &MessageRef, emote: &Emote) -> Vec<UserId> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(reference)
            .and_then(|m| m.reactions.iter().find(|(e, _)| e == emote))
            .map(|(_, users)| users.clone())
            .unwrap_or_default()
    }

    /// Reactions across every emote on the message
    pub fn total_reactions(&self, reference: &MessageRef) -> usize {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(reference)
            .map_or(0, |m| m.reactions.iter().map(|(_, users)| users.len()).sum())
    }

    pub fn vote_field(&self, reference: &MessageRef, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let embed = state.messages.get(reference)?.embed.as_ref()?;
        embed.field(name).map(|f| f.value.clone())
    }

    pub fn exists(&self, reference: &MessageRef) -> bool {
        self.state.lock().unwrap().messages.contains_key(reference)
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn fail(&self, failure: Failure) {
        self.state.lock().unwrap().failures.push(failure);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reactor_fetches(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::GetReactors(..)))
    }

    pub fn mutation_count(&self) -> usize {
        self.count_calls(Call::is_mutation)
    }

    /// Messages created through the transport
    pub fn created(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::CreateMessage(_)))
    }

    fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| predicate(*c))
            .count()
    }

    /// Record `call`, then run `op` against the state unless a scripted failure matches
    fn perform<R>(
        &self,
        call: Call,
        op: impl FnOnce(&mut FakeState) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        if let Some(error) = scripted_error(&state.failures, &call) {
            return Err(error);
        }
        op(&mut state)
    }
}

fn scripted_error(failures: &[Failure], call: &Call) -> Option<TransportError> {
    failures.iter().find_map(|failure| match (failure, call) {
        (Failure::GetMessage(target, kind), Call::GetMessage(r)) if target == r => {
            Some(TransportError::new(*kind, "scripted get_message failure"))
        }
        (Failure::AddReaction(target), Call::AddReaction(_, e)) if target == e => {
            Some(TransportError::server_error("scripted add_reaction failure"))
        }
        (Failure::RemoveReaction(target), Call::RemoveReaction(_, _, u)) if target == u => {
            Some(TransportError::forbidden("scripted remove_reaction failure"))
        }
        (Failure::RemoveAllReactions(target), Call::RemoveAllReactions(r)) if target == r => {
            Some(TransportError::server_error("scripted remove_all_reactions failure"))
        }
        (Failure::EditMessage, Call::EditMessage(_)) => {
            Some(TransportError::rate_limit("scripted edit_message failure"))
        }
        (Failure::CreateMessage, Call::CreateMessage(_)) => {
            Some(TransportError::server_error("scripted create_message failure"))
        }
        (Failure::ResolveSurface(kind), Call::ResolveSurface(_)) => {
            Some(TransportError::new(*kind, "scripted resolve_surface failure"))
        }
        _ => None,
    })
}

fn unknown(reference: &MessageRef) -> TransportError {
    TransportError::not_found(format!("Unknown Message {reference}"))
}

fn lookup<'a>(
    state: &'a mut FakeState,
    reference: &MessageRef,
) -> Result<&'a mut FakeMessage, TransportError> {
    state
        .messages
        .get_mut(reference)
        .ok_or_else(|| unknown(reference))
}

impl FakeTransport {
    fn snapshot(&self, reference: &MessageRef, message: &FakeMessage) -> Message {
        let entries = message
            .reactions
            .iter()
            .map(|(emote, users)| {
                let count = ReactionCount {
                    count: u32::try_from(users.len()).unwrap_or(u32::MAX),
                    me: users.contains(&self.bot),
                };
                (emote.clone(), count)
            })
            .collect();
        Message {
            reference: reference.clone(),
            author: message.author.clone(),
            embed: message.embed.clone(),
            reactions: ReactionSummary::new(entries),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn current_user(&self) -> Result<UserId, TransportError> {
        Ok(self.bot.clone())
    }

    async fn resolve_surface(&self, surface: &SurfaceId) -> Result<bool, TransportError> {
        self.perform(Call::ResolveSurface(surface.clone()), |state| {
            Ok(state.surfaces.contains(surface))
        })
    }

    async fn get_message(&self, message: &MessageRef) -> Result<Message, TransportError> {
        self.perform(Call::GetMessage(message.clone()), |state| {
            let found = lookup(state, message)?;
            Ok(self.snapshot(message, found))
        })
    }

    async fn get_reactors(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<ReactorList, TransportError> {
        self.perform(Call::GetReactors(message.clone(), emote.clone()), |state| {
            let found = lookup(state, message)?;
            let users = found
                .reactions
                .iter()
                .find(|(e, _)| e == emote)
                .map(|(_, users)| users.clone())
                .unwrap_or_default();
            Ok(ReactorList {
                emote: emote.clone(),
                users,
            })
        })
    }

    async fn add_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<(), TransportError> {
        self.perform(Call::AddReaction(message.clone(), emote.clone()), |state| {
            lookup(state, message)?.react(emote, self.bot.clone());
            Ok(())
        })
    }

    async fn remove_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
        user: &UserId,
    ) -> Result<(), TransportError> {
        let call = Call::RemoveReaction(message.clone(), emote.clone(), user.clone());
        self.perform(call, |state| {
            lookup(state, message)?.unreact(emote, user);
            Ok(())
        })
    }

    async fn remove_all_reactions(&self, message: &MessageRef) -> Result<(), TransportError> {
        self.perform(Call::RemoveAllReactions(message.clone()), |state| {
            lookup(state, message)?.reactions.clear();
            Ok(())
        })
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        embed: &Embed,
    ) -> Result<(), TransportError> {
        self.perform(Call::EditMessage(message.clone()), |state| {
            lookup(state, message)?.embed = Some(embed.clone());
            Ok(())
        })
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), TransportError> {
        self.perform(Call::DeleteMessage(message.clone()), |state| {
            state
                .messages
                .remove(message)
                .map(|_| ())
                .ok_or_else(|| unknown(message))
        })
    }

    async fn create_message(
        &self,
        surface: &SurfaceId,
        embed: &Embed,
    ) -> Result<Message, TransportError> {
        self.perform(Call::CreateMessage(surface.clone()), |state| {
            state.next_id += 1;
            let reference = MessageRef {
                surface_id: surface.clone(),
                message_id: MessageId(format!("fake-{}", state.next_id)),
            };
            let message = FakeMessage {
                author: self.bot.clone(),
                embed: Some(embed.clone()),
                reactions: Vec::new(),
            };
            let snapshot = self.snapshot(&reference, &message);
            state.surfaces.insert(surface.clone());
            state.messages.insert(reference, message);
            Ok(snapshot)
        })
    }
}

// ============================================================================
// In-memory Application Store
// ============================================================================

/// Application store kept in insertion order
#[derive(Default)]
pub struct InMemoryStore {
    applications: Mutex<Vec<Application>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, application: Application) {
        self.applications.lock().unwrap().push(application);
    }

    pub fn get(&self, id: &str) -> Option<Application> {
        self.applications
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// Decision made by the external review flow
    pub fn set_status(&self, id: &str, status: ApplicationStatus) {
        if let Some(app) = self
            .applications
            .lock()
            .unwrap()
            .iter_mut()
            .find(|a| a.id == id)
        {
            app.status = status;
        }
    }

    /// Successful saves so far
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn find_by_message_ref(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<Application>, String> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .iter()
            .find(|a| &a.message_ref == message_ref)
            .cloned())
    }

    async fn list_applications(&self) -> Result<Vec<Application>, String> {
        Ok(self.applications.lock().unwrap().clone())
    }

    async fn save(&self, application: &Application) -> Result<(), String> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err("database is locked".to_string());
        }
        let mut applications = self.applications.lock().unwrap();
        let stored = applications
            .iter_mut()
            .find(|a| a.id == application.id)
            .ok_or_else(|| format!("Application not found: {}", application.id))?;
        // Status belongs to the review flow and is never written here
        stored.message_ref = application.message_ref.clone();
        stored.tally = application.tally.clone();
        stored.updated_at = Utc::now();
        drop(applications);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn application(id: &str, status: ApplicationStatus, message_ref: &MessageRef) -> Application {
    let now = Utc::now();
    Application {
        id: id.to_string(),
        applicant: format!("applicant-{id}"),
        summary: String::new(),
        status,
        message_ref: message_ref.clone(),
        tally: VoteTally::default(),
        created_at: now,
        updated_at: now,
    }
}

/// Bot `bot`, vote surface `votes`, default emotes
pub fn test_context() -> VoteContext {
    VoteContext {
        bot: UserId::from("bot"),
        vote_surface: SurfaceId::from("votes"),
        emotes: Emotes::default(),
        votes_field: "Votes".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_reflects_reactions() {
        let transport = FakeTransport::new("bot");
        let msg = MessageRef::new("votes", "m-1");
        transport.post(&msg, "someone", None);
        transport.react(&msg, &Emote::from("✅"), "alice");
        transport.add_reaction(&msg, &Emote::from("✅")).await.unwrap();

        let message = transport.get_message(&msg).await.unwrap();
        assert_eq!(
            message.reactions.get(&Emote::from("✅")),
            Some(ReactionCount { count: 2, me: true })
        );
        assert_eq!(message.author, UserId::from("someone"));
    }

    #[tokio::test]
    async fn test_missing_message_is_not_found() {
        let transport = FakeTransport::new("bot");
        let err = transport
            .get_message(&MessageRef::new("votes", "nope"))
            .await
            .unwrap_err();
        assert!(err.is_missing());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_is_recorded_and_clearable() {
        let transport = FakeTransport::new("bot");
        let msg = MessageRef::new("votes", "m-1");
        transport.post(&msg, "bot", None);
        transport.fail(Failure::AddReaction(Emote::from("❌")));

        assert!(transport.add_reaction(&msg, &Emote::from("✅")).await.is_ok());
        assert!(transport.add_reaction(&msg, &Emote::from("❌")).await.is_err());
        assert_eq!(transport.mutation_count(), 2);
        assert_eq!(transport.total_reactions(&msg), 1);

        transport.clear_failures();
        assert!(transport.add_reaction(&msg, &Emote::from("❌")).await.is_ok());
    }

    #[tokio::test]
    async fn test_created_messages_get_fresh_ids() {
        let transport = FakeTransport::new("bot");
        let surface = SurfaceId::from("votes");
        let embed = FakeTransport::vote_embed("Votes", "0");

        let first = transport.create_message(&surface, &embed).await.unwrap();
        let second = transport.create_message(&surface, &embed).await.unwrap();

        assert_ne!(first.reference, second.reference);
        assert_eq!(first.author, UserId::from("bot"));
        assert!(transport.resolve_surface(&surface).await.unwrap());
        assert!(!transport.resolve_surface(&SurfaceId::from("other")).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_save_leaves_status_alone() {
        let store = InMemoryStore::new();
        let msg = MessageRef::new("votes", "m-1");
        store.insert(application("app-1", ApplicationStatus::Awaiting, &msg));

        let mut edited = store.get("app-1").unwrap();
        edited.status = ApplicationStatus::Approved;
        edited.message_ref = MessageRef::new("votes", "m-2");
        store.save(&edited).await.unwrap();

        let stored = store.get("app-1").unwrap();
        assert_eq!(stored.status, ApplicationStatus::Awaiting);
        assert_eq!(stored.message_ref, MessageRef::new("votes", "m-2"));
        assert_eq!(store.saves(), 1);
    }
}
