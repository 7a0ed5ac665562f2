//! Typed model of the remote vote surface
//!
//! Reactions are exposed in two deliberately separate shapes: a
//! [`ReactionSummary`] (emote -> count) for existence checks, and a
//! [`ReactorList`] (who reacted) fetched only when identities matter.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identity of a user (or the bot) on the remote surface
    UserId
);
string_id!(
    /// Channel hosting vote messages
    SurfaceId
);
string_id!(MessageId);
string_id!(
    /// Reaction symbol: a unicode emoji, or `name:id` for custom emoji
    Emote
);

/// Composite key identifying one remote message
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub surface_id: SurfaceId,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn new(surface_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            surface_id: SurfaceId(surface_id.into()),
            message_id: MessageId(message_id.into()),
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.surface_id, self.message_id)
    }
}

/// Aggregate state of one emote on a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub count: u32,
    /// Whether the bot itself is among the reactors
    pub me: bool,
}

/// Emote -> count view of a message's reactions, in display order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    entries: Vec<(Emote, ReactionCount)>,
}

impl ReactionSummary {
    pub fn new(entries: Vec<(Emote, ReactionCount)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, emote: &Emote) -> Option<ReactionCount> {
        self.entries
            .iter()
            .find(|(e, _)| e == emote)
            .map(|(_, count)| *count)
    }

    /// An emote is present when at least one user has reacted with it
    pub fn contains(&self, emote: &Emote) -> bool {
        self.count(emote) > 0
    }

    pub fn count(&self, emote: &Emote) -> u32 {
        self.get(emote).map_or(0, |c| c.count)
    }

    /// Whether the bot itself holds a reaction with `emote`
    pub fn placed_by_me(&self, emote: &Emote) -> bool {
        self.get(emote).is_some_and(|c| c.me)
    }
}

/// Everyone who reacted with a single emote, in the order the surface returned them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorList {
    pub emote: Emote,
    pub users: Vec<UserId>,
}

/// One name/value row of an embed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// Rich display object attached to a vote message
///
/// Owned by the posting side; reconciliation only ever rewrites the value of
/// the vote-count field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    /// Properties this service does not interpret (color, footer, ...), kept
    /// so an edit round-trips them unchanged
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Embed {
    pub fn field(&self, name: &str) -> Option<&EmbedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Set the value of the named field, appending it if missing
    pub fn upsert_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(EmbedField {
                name: name.to_string(),
                value,
                inline: true,
            }),
        }
    }
}

/// Snapshot of a remote message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub reference: MessageRef,
    pub author: UserId,
    pub embed: Option<Embed>,
    pub reactions: ReactionSummary,
}

/// Inbound reaction-add notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub message: MessageRef,
    pub emote: Emote,
    pub user: UserId,
}
