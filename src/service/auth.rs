use chrono::{DateTime, TimeDelta, Utc};
use tokio::task;
use uuid::Uuid;

use std::time::Duration;

use super::{ServiceError, password};
use crate::{
    config::Config,
    dto::{LoginRequest, LoginResponse, SignupRequest, UserResponse},
    models::{Session, User},
    repository::{NewUser, Repository, RepositoryError, SharedRepository},
};

#[derive(Clone)]
pub struct AuthService {
    repo: SharedRepository,
    token_ttl: Duration,
    min_password_length: usize,
}

impl AuthService {
    pub fn new(repo: SharedRepository, config: &Config) -> Self {
        Self {
            repo,
            token_ttl: config.token_ttl,
            min_password_length: config.min_password_length,
        }
    }

    pub async fn signup(&self, request: SignupRequest) -> Result<UserResponse, ServiceError> {
        let username = request.username.trim().to_string();
        if username.is_empty() {
            return Err(ServiceError::Validation(
                "username must not be empty".to_string(),
            ));
        }
        if request.password.chars().count() < self.min_password_length {
            return Err(ServiceError::Validation(format!(
                "password must be at least {} characters long",
                self.min_password_length
            )));
        }

        let plain = request.password;
        let password_hash = task::spawn_blocking(move || password::hash_password(&plain))
            .await?
            .map_err(ServiceError::PasswordHash)?;
        let display_name = request
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        let result = self
            .repo
            .lock()
            .await
            .create_user(NewUser {
                username,
                password_hash,
                display_name,
            })
            .await;

        match result {
            Ok(user) => {
                tracing::info!("Registered user '{}' (id {})", user.username, user.id);
                Ok(user.into())
            }
            Err(RepositoryError::DuplicateUsername(username)) => {
                Err(ServiceError::DuplicateUser(username))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ServiceError> {
        let user = self
            .repo
            .lock()
            .await
            .find_user_by_username(request.username.trim())
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let plain = request.password;
        let stored_hash = user.password_hash.clone();
        let matches =
            task::spawn_blocking(move || password::verify_password(&plain, &stored_hash))
                .await?
                .map_err(ServiceError::PasswordHash)?;
        if !matches {
            tracing::debug!("Rejected password for user '{}'", user.username);
            return Err(ServiceError::InvalidCredentials);
        }

        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user.id,
            created_at: now,
            expires_at: self.expiry_from(now),
        };

        self.repo
            .lock()
            .await
            .create_session(session.clone())
            .await?;

        tracing::info!("User '{}' logged in", user.username);

        Ok(LoginResponse {
            token: session.token,
            expires_at: session.expires_at,
            user: user.into(),
        })
    }

    pub async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        if self.repo.lock().await.delete_session(token).await? {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized)
        }
    }

    /// Resolves a bearer token to its user, dropping the session if it has expired.
    pub async fn authenticate(&self, token: &str) -> Result<User, ServiceError> {
        let mut repo = self.repo.lock().await;

        let session = repo
            .find_session(token)
            .await?
            .ok_or(ServiceError::Unauthorized)?;

        if session.is_expired(Utc::now()) {
            repo.delete_session(token).await?;
            return Err(ServiceError::Unauthorized);
        }

        repo.find_user(session.user_id)
            .await?
            .ok_or(ServiceError::Unauthorized)
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.token_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repository::{self, MemoryRepository},
        service::test_support::{services, signup},
    };

    fn credentials(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn signup_with_taken_username_fails() {
        let services = services();
        signup(&services, "alice").await;

        let err = services
            .auth
            .signup(SignupRequest {
                username: "alice".to_string(),
                password: "another password".to_string(),
                display_name: Some("Alice Again".to_string()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::DuplicateUser(name) if name == "alice"));
    }

    #[tokio::test]
    async fn signup_validates_input() {
        let services = services();

        let blank = services
            .auth
            .signup(SignupRequest {
                username: "   ".to_string(),
                password: "long enough".to_string(),
                display_name: None,
            })
            .await;
        assert!(matches!(blank, Err(ServiceError::Validation(_))));

        let short = services
            .auth
            .signup(SignupRequest {
                username: "bob".to_string(),
                password: "short".to_string(),
                display_name: None,
            })
            .await;
        assert!(matches!(short, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn signup_never_stores_plain_password() {
        let services = services();
        let user = signup(&services, "alice").await;

        assert_ne!(user.password_hash, "correct horse");
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn login_issues_token_that_authenticates() {
        let services = services();
        let user = signup(&services, "alice").await;

        let login = services
            .auth
            .login(credentials("alice", "correct horse"))
            .await
            .unwrap();
        assert_eq!(login.user.id, user.id);
        assert_eq!(login.user.created_at, user.created_at);
        assert!(login.expires_at > Utc::now());

        let authenticated = services.auth.authenticate(&login.token).await.unwrap();
        assert_eq!(authenticated.id, user.id);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_and_unknown_user() {
        let services = services();
        signup(&services, "alice").await;

        let wrong = services
            .auth
            .login(credentials("alice", "incorrect horse"))
            .await;
        assert!(matches!(wrong, Err(ServiceError::InvalidCredentials)));

        let unknown = services
            .auth
            .login(credentials("mallory", "correct horse"))
            .await;
        assert!(matches!(unknown, Err(ServiceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let services = services();
        signup(&services, "alice").await;
        let login = services
            .auth
            .login(credentials("alice", "correct horse"))
            .await
            .unwrap();

        services.auth.logout(&login.token).await.unwrap();

        assert!(matches!(
            services.auth.authenticate(&login.token).await,
            Err(ServiceError::Unauthorized)
        ));
        assert!(matches!(
            services.auth.logout(&login.token).await,
            Err(ServiceError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_rejected_and_dropped() {
        let repo = repository::shared(MemoryRepository::new());
        let config = Config {
            token_ttl: Duration::ZERO,
            ..Config::default()
        };
        let auth = AuthService::new(repo.clone(), &config);
        auth.signup(SignupRequest {
            username: "alice".to_string(),
            password: "correct horse".to_string(),
            display_name: None,
        })
        .await
        .unwrap();
        let login = auth
            .login(credentials("alice", "correct horse"))
            .await
            .unwrap();

        assert!(matches!(
            auth.authenticate(&login.token).await,
            Err(ServiceError::Unauthorized)
        ));
        assert!(
            repo.lock()
                .await
                .find_session(&login.token)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_logins_each_get_a_session() {
        let services = services();
        signup(&services, "alice").await;
        signup(&services, "bob").await;

        let (alice, bob) = tokio::join!(
            services.auth.login(credentials("alice", "correct horse")),
            services.auth.login(credentials("bob", "correct horse")),
        );
        let (alice, bob) = (alice.unwrap(), bob.unwrap());

        assert_ne!(alice.token, bob.token);
        assert_eq!(
            services.auth.authenticate(&bob.token).await.unwrap().username,
            "bob"
        );
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let services = services();
        assert!(matches!(
            services.auth.authenticate("no-such-token").await,
            Err(ServiceError::Unauthorized)
        ));
    }
}
