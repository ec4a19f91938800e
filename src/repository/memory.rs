use async_trait::async_trait;
use chrono::{DateTime, Utc};

use std::collections::{BTreeMap, HashMap};

use super::{NewUser, NoteUpdate, Repository, RepositoryError};
use crate::models::{AccessLevel, Note, NoteRevision, Session, SharePermission, User, Visibility};

struct StoredShare {
    level: AccessLevel,
    shared_at: DateTime<Utc>,
}

/// Process-local store, used when no database is configured.
#[derive(Default)]
pub struct MemoryRepository {
    users: BTreeMap<i64, User>,
    sessions: HashMap<String, Session>,
    notes: BTreeMap<i64, Note>,
    // keyed by (note_id, grantee_id)
    shares: BTreeMap<(i64, i64), StoredShare>,
    revisions: Vec<NoteRevision>,
    next_user_id: i64,
    next_note_id: i64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_shared(&self, note_id: i64) -> bool {
        self.shares.range((note_id, i64::MIN)..=(note_id, i64::MAX)).next().is_some()
    }

    fn hydrate(&self, note: &Note) -> Note {
        Note {
            visibility: Visibility::from_shared(self.is_shared(note.id)),
            ..note.clone()
        }
    }

    fn username(&self, user_id: i64) -> String {
        self.users
            .get(&user_id)
            .map(|user| user.username.clone())
            .unwrap_or_default()
    }

    fn share_permission(&self, note_id: i64, grantee_id: i64, share: &StoredShare) -> SharePermission {
        SharePermission {
            note_id,
            grantee_id,
            grantee_username: self.username(grantee_id),
            level: share.level,
            shared_at: share.shared_at,
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&mut self, user: NewUser) -> Result<User, RepositoryError> {
        if self.users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::DuplicateUsername(user.username));
        }

        self.next_user_id += 1;
        let created = User {
            id: self.next_user_id,
            username: user.username,
            password_hash: user.password_hash,
            display_name: user.display_name,
            created_at: Utc::now(),
        };
        self.users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_user(&mut self, id: i64) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.get(&id).cloned())
    }

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_session(&mut self, session: Session) -> Result<(), RepositoryError> {
        let now = session.created_at;
        self.sessions.retain(|_, stored| !stored.is_expired(now));
        self.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn find_session(&mut self, token: &str) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.get(token).cloned())
    }

    async fn delete_session(&mut self, token: &str) -> Result<bool, RepositoryError> {
        Ok(self.sessions.remove(token).is_some())
    }

    async fn create_note(
        &mut self,
        owner_id: i64,
        title: String,
        body: String,
    ) -> Result<Note, RepositoryError> {
        self.next_note_id += 1;
        let now = Utc::now();
        let note = Note {
            id: self.next_note_id,
            owner_id,
            last_modified_by: owner_id,
            title,
            body,
            visibility: Visibility::Private,
            created_at: now,
            updated_at: now,
        };
        self.notes.insert(note.id, note.clone());

        Ok(note)
    }

    async fn get_note(&mut self, id: i64) -> Result<Option<Note>, RepositoryError> {
        Ok(self.notes.get(&id).map(|note| self.hydrate(note)))
    }

    async fn list_notes_for_user(&mut self, user_id: i64) -> Result<Vec<Note>, RepositoryError> {
        Ok(self
            .notes
            .values()
            .filter(|note| {
                note.owner_id == user_id || self.shares.contains_key(&(note.id, user_id))
            })
            .map(|note| self.hydrate(note))
            .collect())
    }

    async fn update_note(
        &mut self,
        id: i64,
        update: NoteUpdate,
    ) -> Result<Option<Note>, RepositoryError> {
        let updated_by_username = self.username(update.modified_by);

        let Some(note) = self.notes.get_mut(&id) else {
            return Ok(None);
        };

        let now = Utc::now();
        let original_title = std::mem::replace(&mut note.title, update.title.clone());
        let original_body = std::mem::replace(&mut note.body, update.body.clone());
        note.last_modified_by = update.modified_by;
        note.updated_at = now;

        self.revisions.push(NoteRevision {
            note_id: id,
            original_title,
            original_body,
            updated_title: update.title,
            updated_body: update.body,
            updated_by: update.modified_by,
            updated_by_username,
            updated_at: now,
        });

        Ok(self.notes.get(&id).map(|note| self.hydrate(note)))
    }

    async fn delete_note(&mut self, id: i64) -> Result<bool, RepositoryError> {
        if self.notes.remove(&id).is_none() {
            return Ok(false);
        }

        self.shares.retain(|(note_id, _), _| *note_id != id);
        self.revisions.retain(|revision| revision.note_id != id);

        Ok(true)
    }

    async fn note_revisions(&mut self, note_id: i64) -> Result<Vec<NoteRevision>, RepositoryError> {
        Ok(self
            .revisions
            .iter()
            .filter(|revision| revision.note_id == note_id)
            .cloned()
            .collect())
    }

    async fn upsert_share(
        &mut self,
        note_id: i64,
        grantee_id: i64,
        level: AccessLevel,
    ) -> Result<SharePermission, RepositoryError> {
        let share = self
            .shares
            .entry((note_id, grantee_id))
            .and_modify(|share| share.level = level)
            .or_insert_with(|| StoredShare {
                level,
                shared_at: Utc::now(),
            });
        let (level, shared_at) = (share.level, share.shared_at);

        Ok(SharePermission {
            note_id,
            grantee_id,
            grantee_username: self.username(grantee_id),
            level,
            shared_at,
        })
    }

    async fn find_share(
        &mut self,
        note_id: i64,
        grantee_id: i64,
    ) -> Result<Option<SharePermission>, RepositoryError> {
        Ok(self
            .shares
            .get(&(note_id, grantee_id))
            .map(|share| self.share_permission(note_id, grantee_id, share)))
    }

    async fn list_shares(&mut self, note_id: i64) -> Result<Vec<SharePermission>, RepositoryError> {
        let mut shares: Vec<SharePermission> = self
            .shares
            .range((note_id, i64::MIN)..=(note_id, i64::MAX))
            .map(|(&(note_id, grantee_id), share)| self.share_permission(note_id, grantee_id, share))
            .collect();
        shares.sort_by(|a, b| a.grantee_username.cmp(&b.grantee_username));

        Ok(shares)
    }

    async fn delete_share(
        &mut self,
        note_id: i64,
        grantee_id: i64,
    ) -> Result<bool, RepositoryError> {
        Ok(self.shares.remove(&(note_id, grantee_id)).is_some())
    }
}
