use super::{ServiceError, load_note};
use crate::{
    dto::{ShareNoteRequest, ShareResponse},
    models::{Note, User},
    repository::{Repository, SharedRepository},
};

fn ensure_owner(user: &User, note: &Note) -> Result<(), ServiceError> {
    if note.owner_id == user.id {
        Ok(())
    } else {
        Err(ServiceError::NotOwner(note.id))
    }
}

#[derive(Clone)]
pub struct SharingService {
    repo: SharedRepository,
}

impl SharingService {
    pub const fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Creates the grant, or replaces the level of an existing one.
    pub async fn share_note(
        &self,
        user: &User,
        note_id: i64,
        request: ShareNoteRequest,
    ) -> Result<ShareResponse, ServiceError> {
        let mut repo = self.repo.lock().await;

        let note = load_note(&mut **repo, note_id).await?;
        ensure_owner(user, &note)?;

        let grantee = repo
            .find_user_by_username(request.grantee.trim())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user '{}'", request.grantee)))?;
        if grantee.id == note.owner_id {
            return Err(ServiceError::Validation(
                "a note cannot be shared with its owner".to_string(),
            ));
        }

        let share = repo
            .upsert_share(note_id, grantee.id, request.level)
            .await?;

        tracing::info!(
            "User {} shared note {} with '{}' ({})",
            user.id,
            note_id,
            grantee.username,
            share.level
        );

        Ok(share.into())
    }

    pub async fn revoke_share(
        &self,
        user: &User,
        note_id: i64,
        grantee: &str,
    ) -> Result<(), ServiceError> {
        let mut repo = self.repo.lock().await;

        let note = load_note(&mut **repo, note_id).await?;
        ensure_owner(user, &note)?;

        let grantee = grantee.trim();
        let grantee_user = repo
            .find_user_by_username(grantee)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("user '{grantee}'")))?;

        if !repo.delete_share(note_id, grantee_user.id).await? {
            return Err(ServiceError::NotFound(format!(
                "share of note {note_id} with '{grantee}'"
            )));
        }

        tracing::info!(
            "User {} revoked access of '{}' to note {}",
            user.id,
            grantee,
            note_id
        );

        Ok(())
    }

    pub async fn list_shares(
        &self,
        user: &User,
        note_id: i64,
    ) -> Result<Vec<ShareResponse>, ServiceError> {
        let mut repo = self.repo.lock().await;

        let note = load_note(&mut **repo, note_id).await?;
        ensure_owner(user, &note)?;

        Ok(repo
            .list_shares(note_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }
}
