use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::{fmt, str::FromStr};

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct Note {
    pub id: i64,
    pub owner_id: i64,
    pub last_modified_by: i64,
    pub title: String,
    pub body: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived from the note's grants: `Shared` while at least one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Shared,
}

impl Visibility {
    pub const fn from_shared(shared: bool) -> Self {
        if shared { Self::Shared } else { Self::Private }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown access level: {0}")]
pub struct UnknownAccessLevel(pub String);

impl FromStr for AccessLevel {
    type Err = UnknownAccessLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(UnknownAccessLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SharePermission {
    pub note_id: i64,
    pub grantee_id: i64,
    pub grantee_username: String,
    pub level: AccessLevel,
    pub shared_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NoteRevision {
    pub note_id: i64,
    pub original_title: String,
    pub original_body: String,
    pub updated_title: String,
    pub updated_body: String,
    pub updated_by: i64,
    pub updated_by_username: String,
    pub updated_at: DateTime<Utc>,
}

/// What a given user may do with a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Owner,
    Write,
    Read,
}

impl Access {
    pub const fn can_write(self) -> bool {
        matches!(self, Self::Owner | Self::Write)
    }
}

impl From<AccessLevel> for Access {
    fn from(level: AccessLevel) -> Self {
        match level {
            AccessLevel::Read => Self::Read,
            AccessLevel::Write => Self::Write,
        }
    }
}
