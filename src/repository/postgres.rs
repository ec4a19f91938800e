mod embedded {
    refinery::embed_migrations!("migrations");
}

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row, error::SqlState};

use embedded::migrations;

use super::{NewUser, NoteUpdate, Repository, RepositoryError};
use crate::models::{
    AccessLevel, Note, NoteRevision, Session, SharePermission, UnknownAccessLevel, User, Visibility,
};

const USER_COLUMNS: &str = "id, username, password_hash, display_name, created_at";

const NOTE_COLUMNS: &str = "n.id, n.owner_id, n.last_modified_by, n.title, n.body, \
     n.created_at, n.updated_at, \
     EXISTS (SELECT 1 FROM note_shares s WHERE s.note_id = n.id) AS shared";

const SHARE_COLUMNS: &str =
    "s.note_id, s.grantee_id, u.username AS grantee_username, s.level, s.shared_at";

pub struct PgRepository {
    client: Client,
}

impl PgRepository {
    pub async fn new(database_dsn: &str) -> Result<Self, tokio_postgres::Error> {
        let (client, con) = tokio_postgres::connect(database_dsn, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = con.await {
                tracing::error!("connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    pub async fn migrate(&mut self) -> Result<(), RepositoryError> {
        let migrations_report = migrations::runner().run_async(&mut self.client).await?;

        for migration in migrations_report.applied_migrations() {
            tracing::info!(
                "Migration Applied -  Name: {}, Version: {}",
                migration.name(),
                migration.version()
            );
        }

        tracing::info!("DB migrations finished!");

        Ok(())
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    }
}

fn session_from_row(row: &Row) -> Session {
    Session {
        token: row.get("token"),
        user_id: row.get("user_id"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

fn note_from_row(row: &Row) -> Note {
    Note {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        last_modified_by: row.get("last_modified_by"),
        title: row.get("title"),
        body: row.get("body"),
        visibility: Visibility::from_shared(row.get("shared")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn share_from_row(row: &Row) -> Result<SharePermission, RepositoryError> {
    let level: &str = row.get("level");

    Ok(SharePermission {
        note_id: row.get("note_id"),
        grantee_id: row.get("grantee_id"),
        grantee_username: row.get("grantee_username"),
        level: level
            .parse()
            .map_err(|e: UnknownAccessLevel| RepositoryError::MalformedRow(e.to_string()))?,
        shared_at: row.get("shared_at"),
    })
}

fn revision_from_row(row: &Row) -> NoteRevision {
    NoteRevision {
        note_id: row.get("note_id"),
        original_title: row.get("original_title"),
        original_body: row.get("original_body"),
        updated_title: row.get("updated_title"),
        updated_body: row.get("updated_body"),
        updated_by: row.get("updated_by"),
        updated_by_username: row.get("updated_by_username"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_user(&mut self, user: NewUser) -> Result<User, RepositoryError> {
        let result = self
            .client
            .query_one(
                &format!(
                    "INSERT INTO users (username, password_hash, display_name) \
                     VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
                ),
                &[&user.username, &user.password_hash, &user.display_name],
            )
            .await;

        match result {
            Ok(row) => Ok(user_from_row(&row)),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(RepositoryError::DuplicateUsername(user.username))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&mut self, id: i64) -> Result<Option<User>, RepositoryError> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                &[&id],
            )
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"),
                &[&username],
            )
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn create_session(&mut self, session: Session) -> Result<(), RepositoryError> {
        let pruned = self
            .client
            .execute(
                "DELETE FROM sessions WHERE expires_at <= $1",
                &[&session.created_at],
            )
            .await?;
        if pruned > 0 {
            tracing::debug!("Pruned {} expired sessions", pruned);
        }

        self.client
            .execute(
                "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
                &[
                    &session.token,
                    &session.user_id,
                    &session.created_at,
                    &session.expires_at,
                ],
            )
            .await?;

        Ok(())
    }

    async fn find_session(&mut self, token: &str) -> Result<Option<Session>, RepositoryError> {
        let row = self
            .client
            .query_opt(
                "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = $1",
                &[&token],
            )
            .await?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn delete_session(&mut self, token: &str) -> Result<bool, RepositoryError> {
        let rows = self
            .client
            .execute("DELETE FROM sessions WHERE token = $1", &[&token])
            .await?;

        Ok(rows == 1)
    }

    async fn create_note(
        &mut self,
        owner_id: i64,
        title: String,
        body: String,
    ) -> Result<Note, RepositoryError> {
        let row = self
            .client
            .query_one(
                &format!(
                    "INSERT INTO notes AS n (owner_id, last_modified_by, title, body) \
                     VALUES ($1, $1, $2, $3) RETURNING {NOTE_COLUMNS}"
                ),
                &[&owner_id, &title, &body],
            )
            .await?;

        Ok(note_from_row(&row))
    }

    async fn get_note(&mut self, id: i64) -> Result<Option<Note>, RepositoryError> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id = $1"),
                &[&id],
            )
            .await?;

        Ok(row.as_ref().map(note_from_row))
    }

    async fn list_notes_for_user(&mut self, user_id: i64) -> Result<Vec<Note>, RepositoryError> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {NOTE_COLUMNS} FROM notes n \
                     WHERE n.owner_id = $1 \
                        OR EXISTS (SELECT 1 FROM note_shares g WHERE g.note_id = n.id AND g.grantee_id = $1) \
                     ORDER BY n.id"
                ),
                &[&user_id],
            )
            .await?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn update_note(
        &mut self,
        id: i64,
        update: NoteUpdate,
    ) -> Result<Option<Note>, RepositoryError> {
        let tx = self.client.transaction().await?;

        let Some(current) = tx
            .query_opt(
                "SELECT title, body FROM notes WHERE id = $1 FOR UPDATE",
                &[&id],
            )
            .await?
        else {
            return Ok(None);
        };

        let original_title: String = current.get("title");
        let original_body: String = current.get("body");

        let row = tx
            .query_one(
                &format!(
                    "UPDATE notes AS n SET title = $2, body = $3, last_modified_by = $4, updated_at = now() \
                     WHERE n.id = $1 RETURNING {NOTE_COLUMNS}"
                ),
                &[&id, &update.title, &update.body, &update.modified_by],
            )
            .await?;

        tx.execute(
            "INSERT INTO note_revisions \
             (note_id, original_title, original_body, updated_title, updated_body, updated_by) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &id,
                &original_title,
                &original_body,
                &update.title,
                &update.body,
                &update.modified_by,
            ],
        )
        .await?;

        tx.commit().await?;

        Ok(Some(note_from_row(&row)))
    }

    async fn delete_note(&mut self, id: i64) -> Result<bool, RepositoryError> {
        // note_shares and note_revisions go with it through ON DELETE CASCADE
        let rows = self
            .client
            .execute("DELETE FROM notes WHERE id = $1", &[&id])
            .await?;

        Ok(rows == 1)
    }

    async fn note_revisions(&mut self, note_id: i64) -> Result<Vec<NoteRevision>, RepositoryError> {
        let rows = self
            .client
            .query(
                "SELECT r.note_id, r.original_title, r.original_body, r.updated_title, r.updated_body, \
                        r.updated_by, u.username AS updated_by_username, r.updated_at \
                 FROM note_revisions r JOIN users u ON u.id = r.updated_by \
                 WHERE r.note_id = $1 ORDER BY r.id",
                &[&note_id],
            )
            .await?;

        Ok(rows.iter().map(revision_from_row).collect())
    }

    async fn upsert_share(
        &mut self,
        note_id: i64,
        grantee_id: i64,
        level: AccessLevel,
    ) -> Result<SharePermission, RepositoryError> {
        let row = self
            .client
            .query_one(
                &format!(
                    "WITH s AS ( \
                        INSERT INTO note_shares (note_id, grantee_id, level) VALUES ($1, $2, $3) \
                        ON CONFLICT (note_id, grantee_id) DO UPDATE SET level = EXCLUDED.level \
                        RETURNING note_id, grantee_id, level, shared_at \
                     ) \
                     SELECT {SHARE_COLUMNS} FROM s JOIN users u ON u.id = s.grantee_id"
                ),
                &[&note_id, &grantee_id, &level.as_str()],
            )
            .await?;

        share_from_row(&row)
    }

    async fn find_share(
        &mut self,
        note_id: i64,
        grantee_id: i64,
    ) -> Result<Option<SharePermission>, RepositoryError> {
        let row = self
            .client
            .query_opt(
                &format!(
                    "SELECT {SHARE_COLUMNS} FROM note_shares s JOIN users u ON u.id = s.grantee_id \
                     WHERE s.note_id = $1 AND s.grantee_id = $2"
                ),
                &[&note_id, &grantee_id],
            )
            .await?;

        row.as_ref().map(share_from_row).transpose()
    }

    async fn list_shares(&mut self, note_id: i64) -> Result<Vec<SharePermission>, RepositoryError> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {SHARE_COLUMNS} FROM note_shares s JOIN users u ON u.id = s.grantee_id \
                     WHERE s.note_id = $1 ORDER BY u.username"
                ),
                &[&note_id],
            )
            .await?;

        rows.iter().map(share_from_row).collect()
    }

    async fn delete_share(
        &mut self,
        note_id: i64,
        grantee_id: i64,
    ) -> Result<bool, RepositoryError> {
        let rows = self
            .client
            .execute(
                "DELETE FROM note_shares WHERE note_id = $1 AND grantee_id = $2",
                &[&note_id, &grantee_id],
            )
            .await?;

        Ok(rows == 1)
    }
}
