mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

use async_trait::async_trait;

use std::sync::Arc;

use crate::models::{AccessLevel, Note, NoteRevision, Session, SharePermission, User};

pub type SharedRepository = Arc<tokio::sync::Mutex<Box<dyn Repository>>>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("username already taken: {0}")]
    DuplicateUsername(String),

    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("migration error: {0}")]
    Migration(#[from] refinery::Error),

    #[error("malformed row: {0}")]
    MalformedRow(String),
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
}

/// Full replacement of a note's content, applied together with a revision entry.
#[derive(Debug, Clone)]
pub struct NoteUpdate {
    pub title: String,
    pub body: String,
    pub modified_by: i64,
}

/// Data access for users, sessions, notes, grants and revisions.
///
/// Implementations must delete a note's grants and revisions along with the note.
#[async_trait]
pub trait Repository: Send {
    /// Fails with [`RepositoryError::DuplicateUsername`] when the name is taken.
    async fn create_user(&mut self, user: NewUser) -> Result<User, RepositoryError>;

    async fn find_user(&mut self, id: i64) -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError>;

    async fn create_session(&mut self, session: Session) -> Result<(), RepositoryError>;

    async fn find_session(&mut self, token: &str) -> Result<Option<Session>, RepositoryError>;

    async fn delete_session(&mut self, token: &str) -> Result<bool, RepositoryError>;

    async fn create_note(
        &mut self,
        owner_id: i64,
        title: String,
        body: String,
    ) -> Result<Note, RepositoryError>;

    async fn get_note(&mut self, id: i64) -> Result<Option<Note>, RepositoryError>;

    /// Notes owned by or shared with `user_id`, ordered by id.
    async fn list_notes_for_user(&mut self, user_id: i64) -> Result<Vec<Note>, RepositoryError>;

    /// Overwrites the note and appends a revision holding the previous content.
    async fn update_note(
        &mut self,
        id: i64,
        update: NoteUpdate,
    ) -> Result<Option<Note>, RepositoryError>;

    async fn delete_note(&mut self, id: i64) -> Result<bool, RepositoryError>;

    /// Oldest first.
    async fn note_revisions(&mut self, note_id: i64) -> Result<Vec<NoteRevision>, RepositoryError>;

    async fn upsert_share(
        &mut self,
        note_id: i64,
        grantee_id: i64,
        level: AccessLevel,
    ) -> Result<SharePermission, RepositoryError>;

    async fn find_share(
        &mut self,
        note_id: i64,
        grantee_id: i64,
    ) -> Result<Option<SharePermission>, RepositoryError>;

    async fn list_shares(&mut self, note_id: i64) -> Result<Vec<SharePermission>, RepositoryError>;

    async fn delete_share(&mut self, note_id: i64, grantee_id: i64)
    -> Result<bool, RepositoryError>;
}

pub fn shared<R: Repository + 'static>(repo: R) -> SharedRepository {
    Arc::new(tokio::sync::Mutex::new(Box::new(repo)))
}
