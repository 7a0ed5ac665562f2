//! Service configuration read from the environment

use crate::transport::{Emote, SurfaceId};
use thiserror::Error;

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_PORT: u16 = 8300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// The emotes a vote message cycles through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emotes {
    /// Ballot option, and the outcome marker for approvals
    pub approve: Emote,
    /// Ballot option, and the outcome marker for denials
    pub deny: Emote,
    /// Marks a vote as closed
    pub acknowledge: Emote,
}

impl Default for Emotes {
    fn default() -> Self {
        Self {
            approve: Emote::from("✅"),
            deny: Emote::from("❌"),
            acknowledge: Emote::from("🔒"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub api_base: String,
    /// Channel hosting vote messages
    pub vote_surface: SurfaceId,
    pub emotes: Emotes,
    /// Name of the embed field holding the vote count
    pub votes_field: String,
    pub db_path: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Blank values are treated as unset
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let vote_surface = SurfaceId(require("VOTE_CHANNEL_ID")?);
        let discord_token = require("DISCORD_TOKEN")?;

        let port = match get("VOTEKEEPER_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "VOTEKEEPER_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let db_path = get("VOTEKEEPER_DB_PATH").unwrap_or_else(|| {
            let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.votekeeper/votekeeper.db")
        });

        let defaults = Emotes::default();
        let emotes = Emotes {
            approve: get("VOTE_EMOTE_APPROVE").map_or(defaults.approve, Emote),
            deny: get("VOTE_EMOTE_DENY").map_or(defaults.deny, Emote),
            acknowledge: get("VOTE_EMOTE_ACK").map_or(defaults.acknowledge, Emote),
        };
        if emotes.approve == emotes.deny
            || emotes.acknowledge == emotes.approve
            || emotes.acknowledge == emotes.deny
        {
            return Err(ConfigError::Invalid {
                name: "VOTE_EMOTE_*",
                value: format!("{} {} {}", emotes.approve, emotes.deny, emotes.acknowledge),
            });
        }

        Ok(Self {
            discord_token,
            api_base: get("DISCORD_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            vote_surface,
            emotes,
            votes_field: get("VOTE_FIELD_NAME").unwrap_or_else(|| "Votes".to_string()),
            db_path,
            port,
        })
    }
}
