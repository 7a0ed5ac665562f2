//! Remote vote surface abstraction
//!
//! Everything the reconciler reads from or mutates on the chat surface goes
//! through [`Transport`], so tests can substitute an in-memory surface.

mod discord;
mod error;
mod types;

pub use discord::DiscordClient;
pub use error::TransportError;
#[cfg(test)]
pub use error::TransportErrorKind;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Operations on the remote surface hosting vote messages
///
/// All calls are fallible and never cached: every read is a fresh snapshot,
/// and a mutation is not assumed to be visible in the next read.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identity the bot acts as
    async fn current_user(&self) -> Result<UserId, TransportError>;

    /// Whether the surface exists and is visible to the bot
    async fn resolve_surface(&self, surface: &SurfaceId) -> Result<bool, TransportError>;

    async fn get_message(&self, message: &MessageRef) -> Result<Message, TransportError>;

    /// Everyone who reacted to `message` with `emote`
    async fn get_reactors(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<ReactorList, TransportError>;

    /// React as the bot
    async fn add_reaction(&self, message: &MessageRef, emote: &Emote)
        -> Result<(), TransportError>;

    /// Remove another user's reaction
    async fn remove_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
        user: &UserId,
    ) -> Result<(), TransportError>;

    async fn remove_all_reactions(&self, message: &MessageRef) -> Result<(), TransportError>;

    /// Replace the message's embed
    async fn edit_message(&self, message: &MessageRef, embed: &Embed)
        -> Result<(), TransportError>;

    async fn delete_message(&self, message: &MessageRef) -> Result<(), TransportError>;

    /// Post a new message carrying `embed`
    async fn create_message(
        &self,
        surface: &SurfaceId,
        embed: &Embed,
    ) -> Result<Message, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn current_user(&self) -> Result<UserId, TransportError> {
        (**self).current_user().await
    }

    async fn resolve_surface(&self, surface: &SurfaceId) -> Result<bool, TransportError> {
        (**self).resolve_surface(surface).await
    }

    async fn get_message(&self, message: &MessageRef) -> Result<Message, TransportError> {
        (**self).get_message(message).await
    }

    async fn get_reactors(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<ReactorList, TransportError> {
        (**self).get_reactors(message, emote).await
    }

    async fn add_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<(), TransportError> {
        (**self).add_reaction(message, emote).await
    }

    async fn remove_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
        user: &UserId,
    ) -> Result<(), TransportError> {
        (**self).remove_reaction(message, emote, user).await
    }

    async fn remove_all_reactions(&self, message: &MessageRef) -> Result<(), TransportError> {
        (**self).remove_all_reactions(message).await
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        embed: &Embed,
    ) -> Result<(), TransportError> {
        (**self).edit_message(message, embed).await
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), TransportError> {
        (**self).delete_message(message).await
    }

    async fn create_message(
        &self,
        surface: &SurfaceId,
        embed: &Embed,
    ) -> Result<Message, TransportError> {
        (**self).create_message(surface, embed).await
    }
}

/// Logging wrapper for transports
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: Transport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    fn record<R>(
        op: &'static str,
        target: &dyn std::fmt::Display,
        start: Instant,
        result: &Result<R, TransportError>,
    ) {
        let duration_ms = start.elapsed().as_millis();
        match result {
            Ok(_) => {
                tracing::debug!(op, target = %target, duration_ms = %duration_ms, "Transport call completed");
            }
            Err(e) => {
                tracing::warn!(
                    op,
                    target = %target,
                    duration_ms = %duration_ms,
                    error = %e.message,
                    kind = ?e.kind,
                    "Transport call failed"
                );
            }
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for LoggingTransport<T> {
    async fn current_user(&self) -> Result<UserId, TransportError> {
        let start = Instant::now();
        let result = self.inner.current_user().await;
        Self::record("current_user", &"@me", start, &result);
        result
    }

    async fn resolve_surface(&self, surface: &SurfaceId) -> Result<bool, TransportError> {
        let start = Instant::now();
        let result = self.inner.resolve_surface(surface).await;
        Self::record("resolve_surface", surface, start, &result);
        result
    }

    async fn get_message(&self, message: &MessageRef) -> Result<Message, TransportError> {
        let start = Instant::now();
        let result = self.inner.get_message(message).await;
        Self::record("get_message", message, start, &result);
        result
    }

    async fn get_reactors(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<ReactorList, TransportError> {
        let start = Instant::now();
        let result = self.inner.get_reactors(message, emote).await;
        Self::record("get_reactors", message, start, &result);
        result
    }

    async fn add_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
    ) -> Result<(), TransportError> {
        let start = Instant::now();
        let result = self.inner.add_reaction(message, emote).await;
        Self::record("add_reaction", message, start, &result);
        result
    }

    async fn remove_reaction(
        &self,
        message: &MessageRef,
        emote: &Emote,
        user: &UserId,
    ) -> Result<(), TransportError> {
        let start = Instant::now();
        let result = self.inner.remove_reaction(message, emote, user).await;
        Self::record("remove_reaction", message, start, &result);
        result
    }

    async fn remove_all_reactions(&self, message: &MessageRef) -> Result<(), TransportError> {
        let start = Instant::now();
        let result = self.inner.remove_all_reactions(message).await;
        Self::record("remove_all_reactions", message, start, &result);
        result
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        embed: &Embed,
    ) -> Result<(), TransportError> {
        let start = Instant::now();
        let result = self.inner.edit_message(message, embed).await;
        Self::record("edit_message", message, start, &result);
        result
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), TransportError> {
        let start = Instant::now();
        let result = self.inner.delete_message(message).await;
        Self::record("delete_message", message, start, &result);
        result
    }

    async fn create_message(
        &self,
        surface: &SurfaceId,
        embed: &Embed,
    ) -> Result<Message, TransportError> {
        let start = Instant::now();
        let result = self.inner.create_message(surface, embed).await;
        Self::record("create_message", surface, start, &result);
        result
    }
}
