use super::{ServiceError, load_note, resolve_access};
use crate::{
    dto::{CreateNoteRequest, NoteResponse, NoteRevisionResponse, UpdateNoteRequest},
    models::{Access, User},
    repository::{NoteUpdate, Repository, SharedRepository},
};

fn validate_title(title: &str) -> Result<(), ServiceError> {
    if title.trim().is_empty() {
        return Err(ServiceError::Validation(
            "note title must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct NoteService {
    repo: SharedRepository,
}

impl NoteService {
    pub const fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    pub async fn create_note(
        &self,
        user: &User,
        request: CreateNoteRequest,
    ) -> Result<NoteResponse, ServiceError> {
        validate_title(&request.title)?;

        let note = self
            .repo
            .lock()
            .await
            .create_note(user.id, request.title, request.body)
            .await?;

        tracing::info!("User {} created note {}", user.id, note.id);

        Ok(NoteResponse::new(note, Access::Owner))
    }

    /// Owner or any grantee; everyone else gets `Forbidden`.
    pub async fn get_one_note(&self, user: &User, id: i64) -> Result<NoteResponse, ServiceError> {
        let mut repo = self.repo.lock().await;

        let note = load_note(&mut **repo, id).await?;
        let access = resolve_access(&mut **repo, user.id, &note)
            .await?
            .ok_or(ServiceError::Forbidden(id))?;

        Ok(NoteResponse::new(note, access))
    }

    pub async fn get_all_notes(&self, user: &User) -> Result<Vec<NoteResponse>, ServiceError> {
        let mut repo = self.repo.lock().await;

        let notes = repo.list_notes_for_user(user.id).await?;
        let mut responses = Vec::with_capacity(notes.len());

        for note in notes {
            if let Some(access) = resolve_access(&mut **repo, user.id, &note).await? {
                responses.push(NoteResponse::new(note, access));
            }
        }

        Ok(responses)
    }

    /// Owner or write grantee. Concurrent edits are last-write-wins; the
    /// overwritten content stays available through the note's history.
    pub async fn update_note(
        &self,
        user: &User,
        id: i64,
        request: UpdateNoteRequest,
    ) -> Result<NoteResponse, ServiceError> {
        if request.title.is_none() && request.body.is_none() {
            return Err(ServiceError::Validation(
                "at least one of title or body must be provided".to_string(),
            ));
        }
        if let Some(title) = &request.title {
            validate_title(title)?;
        }

        let mut repo = self.repo.lock().await;

        let note = load_note(&mut **repo, id).await?;
        let access = resolve_access(&mut **repo, user.id, &note)
            .await?
            .filter(|access| access.can_write())
            .ok_or(ServiceError::Forbidden(id))?;

        let update = NoteUpdate {
            title: request.title.unwrap_or(note.title),
            body: request.body.unwrap_or(note.body),
            modified_by: user.id,
        };

        let updated = repo
            .update_note(id, update)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("note {id}")))?;

        tracing::info!("User {} updated note {}", user.id, id);

        Ok(NoteResponse::new(updated, access))
    }

    /// Owner only. Grants and revisions are removed with the note.
    pub async fn delete_note(&self, user: &User, id: i64) -> Result<(), ServiceError> {
        let mut repo = self.repo.lock().await;

        let note = load_note(&mut **repo, id).await?;
        if note.owner_id != user.id {
            return Err(ServiceError::Forbidden(id));
        }

        if !repo.delete_note(id).await? {
            return Err(ServiceError::NotFound(format!("note {id}")));
        }

        tracing::info!("User {} deleted note {}", user.id, id);

        Ok(())
    }

    pub async fn note_history(
        &self,
        user: &User,
        id: i64,
    ) -> Result<Vec<NoteRevisionResponse>, ServiceError> {
        let mut repo = self.repo.lock().await;

        let note = load_note(&mut **repo, id).await?;
        if resolve_access(&mut **repo, user.id, &note).await?.is_none() {
            return Err(ServiceError::Forbidden(id));
        }

        Ok(repo
            .note_revisions(id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }
}
