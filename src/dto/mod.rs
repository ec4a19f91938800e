use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Access, AccessLevel, Note, NoteRevision, SharePermission, User, Visibility};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignupRequest {
    /// Unique login name
    pub username: String,
    /// Plain-text password
    pub password: String,
    /// Name shown to other users
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    /// User ID
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Bearer token for the `Authorization` header
    pub token: String,
    /// Moment the token stops being accepted
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteResponse {
    /// Note ID
    pub id: i64,
    /// Owner's user ID
    pub owner_id: i64,
    /// Note title
    pub title: String,
    /// Note body
    pub body: String,
    pub visibility: Visibility,
    /// What the requesting user may do with the note
    pub access: Access,
    /// ID of the user behind the latest change
    pub last_modified_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoteResponse {
    pub fn new(note: Note, access: Access) -> Self {
        Self {
            id: note.id,
            owner_id: note.owner_id,
            title: note.title,
            body: note.body,
            visibility: note.visibility,
            access,
            last_modified_by: note.last_modified_by,
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateNoteRequest {
    /// Note title
    pub title: String,
    /// Note body
    #[serde(default)]
    pub body: String,
}

/// Fields left out keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteRevisionResponse {
    pub note_id: i64,
    pub original_title: String,
    pub original_body: String,
    pub updated_title: String,
    pub updated_body: String,
    /// Username of the editor
    pub modified_by: String,
    /// User ID of the editor
    pub modified_by_id: i64,
    pub modified_at: DateTime<Utc>,
}

impl From<NoteRevision> for NoteRevisionResponse {
    fn from(revision: NoteRevision) -> Self {
        Self {
            note_id: revision.note_id,
            original_title: revision.original_title,
            original_body: revision.original_body,
            updated_title: revision.updated_title,
            updated_body: revision.updated_body,
            modified_by: revision.updated_by_username,
            modified_by_id: revision.updated_by,
            modified_at: revision.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShareNoteRequest {
    /// Username of the user receiving access
    pub grantee: String,
    pub level: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShareResponse {
    pub note_id: i64,
    pub grantee_id: i64,
    /// Grantee's username
    pub grantee: String,
    pub level: AccessLevel,
    pub shared_at: DateTime<Utc>,
}

impl From<SharePermission> for ShareResponse {
    fn from(share: SharePermission) -> Self {
        Self {
            note_id: share.note_id,
            grantee_id: share.grantee_id,
            grantee: share.grantee_username,
            level: share.level,
            shared_at: share.shared_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
