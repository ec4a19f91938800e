mod auth;
mod notes;
mod password;
mod sharing;

pub use auth::AuthService;
pub use notes::NoteService;
pub use sharing::SharingService;

use crate::{
    models::{Access, Note},
    repository::{Repository, RepositoryError},
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("username '{0}' is already taken")]
    DuplicateUser(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("missing, invalid or expired token")]
    Unauthorized,

    #[error("access to note {0} is forbidden")]
    Forbidden(i64),

    #[error("only the owner of note {0} can manage its sharing")]
    NotOwner(i64),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(argon2::password_hash::Error),

    #[error("password task failed: {0}")]
    PasswordTask(#[from] tokio::task::JoinError),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

async fn load_note(repo: &mut dyn Repository, note_id: i64) -> Result<Note, ServiceError> {
    repo.get_note(note_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("note {note_id}")))
}

/// `None` when the user neither owns the note nor holds a grant on it.
async fn resolve_access(
    repo: &mut dyn Repository,
    user_id: i64,
    note: &Note,
) -> Result<Option<Access>, RepositoryError> {
    if note.owner_id == user_id {
        return Ok(Some(Access::Owner));
    }

    Ok(repo
        .find_share(note.id, user_id)
        .await?
        .map(|share| share.level.into()))
}
