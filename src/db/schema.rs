//! Database schema and types

use crate::tally::VoteTally;
use crate::transport::MessageRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS applications (
    id TEXT PRIMARY KEY,
    applicant TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'awaiting',
    surface_id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    tally TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE (surface_id, message_id)
);

CREATE INDEX IF NOT EXISTS idx_applications_created ON applications(created_at);
";

/// Decision state, set by the external review flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Awaiting,
    Approved,
    Denied,
}

impl ApplicationStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Awaiting => "awaiting",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting" => Ok(Self::Awaiting),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown application status: {other}")),
        }
    }
}

/// Application record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub applicant: String,
    pub summary: String,
    pub status: ApplicationStatus,
    /// Remote message carrying the vote; unique per application
    pub message_ref: MessageRef,
    pub tally: VoteTally,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn is_awaiting(&self) -> bool {
        self.status == ApplicationStatus::Awaiting
    }
}
