//! Trait abstractions for reconciliation I/O
//!
//! Persistence and message posting sit behind these traits so passes can be
//! exercised against in-memory implementations.

use crate::db::{Application, ApplicationStatus, Database};
use crate::transport::{Embed, EmbedField, Message, MessageRef, SurfaceId, Transport, TransportError};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for applications
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Find the application bound to a vote message
    async fn find_by_message_ref(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<Application>, String>;

    /// All applications, in creation order
    async fn list_applications(&self) -> Result<Vec<Application>, String>;

    /// Persist tally and message binding
    async fn save(&self, application: &Application) -> Result<(), String>;
}

/// Posts a fresh vote message for an application whose message is gone
#[async_trait]
pub trait ApplicationPoster: Send + Sync {
    async fn post_application_message(
        &self,
        application: &Application,
    ) -> Result<Message, TransportError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ApplicationStore + ?Sized> ApplicationStore for Arc<T> {
    async fn find_by_message_ref(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<Application>, String> {
        (**self).find_by_message_ref(message_ref).await
    }

    async fn list_applications(&self) -> Result<Vec<Application>, String> {
        (**self).list_applications().await
    }

    async fn save(&self, application: &Application) -> Result<(), String> {
        (**self).save(application).await
    }
}

#[async_trait]
impl<T: ApplicationPoster + ?Sized> ApplicationPoster for Arc<T> {
    async fn post_application_message(
        &self,
        application: &Application,
    ) -> Result<Message, TransportError> {
        (**self).post_application_message(application).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as an ApplicationStore
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ApplicationStore for DatabaseStore {
    async fn find_by_message_ref(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<Application>, String> {
        self.db
            .find_by_message_ref(message_ref)
            .map_err(|e| e.to_string())
    }

    async fn list_applications(&self) -> Result<Vec<Application>, String> {
        self.db.list_applications().map_err(|e| e.to_string())
    }

    async fn save(&self, application: &Application) -> Result<(), String> {
        self.db
            .save_application(application)
            .map_err(|e| e.to_string())
    }
}

/// Posts a plain summary embed to the vote surface
pub struct EmbedPoster<T> {
    transport: T,
    surface: SurfaceId,
    votes_field: String,
}

impl<T: Transport> EmbedPoster<T> {
    pub fn new(transport: T, surface: SurfaceId, votes_field: impl Into<String>) -> Self {
        Self {
            transport,
            surface,
            votes_field: votes_field.into(),
        }
    }

    fn render(&self, application: &Application) -> Embed {
        let status = match application.status {
            ApplicationStatus::Awaiting => "Awaiting vote",
            ApplicationStatus::Approved => "Approved",
            ApplicationStatus::Denied => "Denied",
        };

        Embed {
            title: Some(format!("Application from {}", application.applicant)),
            description: (!application.summary.is_empty()).then(|| application.summary.clone()),
            fields: vec![
                EmbedField {
                    name: "Status".to_string(),
                    value: status.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: self.votes_field.clone(),
                    value: application.tally.display_count(),
                    inline: true,
                },
            ],
            ..Embed::default()
        }
    }
}

#[async_trait]
impl<T: Transport> ApplicationPoster for EmbedPoster<T> {
    async fn post_application_message(
        &self,
        application: &Application,
    ) -> Result<Message, TransportError> {
        let embed = self.render(application);
        self.transport.create_message(&self.surface, &embed).await
    }
}
