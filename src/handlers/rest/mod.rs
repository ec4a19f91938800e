mod auth;
mod extract;

pub use auth::AuthUser;
use extract::{JsonBody, PathParams};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use axum_macros::debug_handler;
use tower_http::trace::TraceLayer;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use crate::{
    dto::{
        CreateNoteRequest, ErrorResponse, LoginRequest, LoginResponse, NoteResponse,
        NoteRevisionResponse, ShareNoteRequest, ShareResponse, SignupRequest, UpdateNoteRequest,
        UserResponse,
    },
    models::{Access, AccessLevel, Visibility},
    service::{AuthService, NoteService, ServiceError, SharingService},
};

pub struct AppState {
    pub auth: AuthService,
    pub notes: NoteService,
    pub sharing: SharingService,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        signup,
        login,
        logout,
        create_note,
        update_note,
        delete_note,
        get_one_note,
        get_all_notes,
        note_history,
        list_shares,
        share_note,
        revoke_share
    ),
    components(schemas(
        SignupRequest,
        LoginRequest,
        LoginResponse,
        UserResponse,
        NoteResponse,
        CreateNoteRequest,
        UpdateNoteRequest,
        NoteRevisionResponse,
        ShareNoteRequest,
        ShareResponse,
        ErrorResponse,
        Access,
        AccessLevel,
        Visibility
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration and sessions"),
        (name = "notes", description = "Notes management API"),
        (name = "sharing", description = "Note access grants")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::DuplicateUser(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::NotOwner(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PasswordHash(_) | Self::PasswordTask(_) | Self::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/notes", post(create_note))
        .route("/notes", get(get_all_notes))
        .route("/notes/{id}", put(update_note))
        .route("/notes/{id}", delete(delete_note))
        .route("/notes/{id}", get(get_one_note))
        .route("/notes/{id}/history", get(note_history))
        .route("/notes/{id}/shares", get(list_shares))
        .route("/notes/{id}/share", post(share_note))
        .route("/notes/{id}/share/{user}", delete(revoke_share))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Response {
    (StatusCode::OK, "Hello world!").into_response()
}

#[utoipa::path(
    post,
    path = "/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Invalid username or password", body = ErrorResponse),
        (status = 409, description = "Username already taken", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[debug_handler]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Response {
    match state.auth.signup(payload).await {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[debug_handler]
pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Response {
    match state.auth.login(payload).await {
        Ok(login) => (StatusCode::OK, Json(login)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[debug_handler]
pub async fn logout(State(state): State<Arc<AppState>>, auth: AuthUser) -> Response {
    match state.auth.logout(&auth.token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/notes",
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created successfully", body = NoteResponse),
        (status = 400, description = "Invalid note", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "notes"
)]
#[debug_handler]
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<CreateNoteRequest>,
) -> Response {
    match state.notes.create_note(&auth.user, payload).await {
        Ok(note) => (StatusCode::CREATED, Json(note)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/notes/{id}",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "Note updated successfully", body = NoteResponse),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 403, description = "No write access", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "notes"
)]
#[debug_handler]
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathParams(id): PathParams<i64>,
    JsonBody(payload): JsonBody<UpdateNoteRequest>,
) -> Response {
    match state.notes.update_note(&auth.user, id, payload).await {
        Ok(note) => (StatusCode::OK, Json(note)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    responses(
        (status = 204, description = "Note deleted successfully"),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "notes"
)]
#[debug_handler]
pub async fn delete_note(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathParams(id): PathParams<i64>,
) -> Response {
    match state.notes.delete_note(&auth.user, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/notes/{id}",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Note found", body = NoteResponse),
        (status = 403, description = "No access to the note", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "notes"
)]
#[debug_handler]
pub async fn get_one_note(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathParams(id): PathParams<i64>,
) -> Response {
    match state.notes.get_one_note(&auth.user, id).await {
        Ok(note) => (StatusCode::OK, Json(note)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/notes",
    responses(
        (status = 200, description = "Notes owned by or shared with the caller", body = Vec<NoteResponse>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "notes"
)]
#[debug_handler]
pub async fn get_all_notes(State(state): State<Arc<AppState>>, auth: AuthUser) -> Response {
    match state.notes.get_all_notes(&auth.user).await {
        Ok(notes) => (StatusCode::OK, Json(notes)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/notes/{id}/history",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Revisions, oldest first", body = Vec<NoteRevisionResponse>),
        (status = 403, description = "No access to the note", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "notes"
)]
#[debug_handler]
pub async fn note_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathParams(id): PathParams<i64>,
) -> Response {
    match state.notes.note_history(&auth.user, id).await {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/notes/{id}/shares",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Grants on the note", body = Vec<ShareResponse>),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sharing"
)]
#[debug_handler]
pub async fn list_shares(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathParams(id): PathParams<i64>,
) -> Response {
    match state.sharing.list_shares(&auth.user, id).await {
        Ok(shares) => (StatusCode::OK, Json(shares)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/notes/{id}/share",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    request_body = ShareNoteRequest,
    responses(
        (status = 200, description = "Access granted or updated", body = ShareResponse),
        (status = 400, description = "Cannot share with the owner", body = ErrorResponse),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse),
        (status = 404, description = "Note or grantee not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sharing"
)]
#[debug_handler]
pub async fn share_note(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathParams(id): PathParams<i64>,
    JsonBody(payload): JsonBody<ShareNoteRequest>,
) -> Response {
    match state.sharing.share_note(&auth.user, id, payload).await {
        Ok(share) => (StatusCode::OK, Json(share)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/notes/{id}/share/{user}",
    params(
        ("id" = i64, Path, description = "Note ID"),
        ("user" = String, Path, description = "Grantee username")
    ),
    responses(
        (status = 204, description = "Access revoked"),
        (status = 403, description = "Caller is not the owner", body = ErrorResponse),
        (status = 404, description = "Note, user or grant not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sharing"
)]
#[debug_handler]
pub async fn revoke_share(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    PathParams((id, user)): PathParams<(i64, String)>,
) -> Response {
    match state.sharing.revoke_share(&auth.user, id, &user).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, header},
    };
    use serde_json::{Value, json};
    use tower::util::ServiceExt;

    use crate::service::test_support::services;

    fn create_test_app() -> Router {
        let services = services();
        router(Arc::new(AppState {
            auth: services.auth,
            notes: services.notes,
            sharing: services.sharing,
        }))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, value)
    }

    async fn register_and_login(app: &Router, username: &str) -> String {
        let (status, _) = send(
            app,
            Method::POST,
            "/signup",
            None,
            Some(json!({ "username": username, "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            Method::POST,
            "/login",
            None,
            Some(json!({ "username": username, "password": "correct horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_root_is_public() {
        let app = create_test_app();
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_duplicate_signup_conflicts() {
        let app = create_test_app();
        register_and_login(&app, "alice").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/signup",
            None,
            Some(json!({ "username": "alice", "password": "something else" })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("alice"));
    }

    #[tokio::test]
    async fn test_bad_login_is_unauthorized() {
        let app = create_test_app();
        register_and_login(&app, "alice").await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong password" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_notes_require_token() {
        let app = create_test_app();

        let (status, _) = send(&app, Method::GET, "/notes", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::GET, "/notes", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_invalidates_token() {
        let app = create_test_app();
        let token = register_and_login(&app, "alice").await;

        let (status, _) = send(&app, Method::POST, "/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, "/notes", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sharing_flow() {
        let app = create_test_app();
        let alice = register_and_login(&app, "alice").await;
        let bob = register_and_login(&app, "bob").await;

        let (status, note) = send(
            &app,
            Method::POST,
            "/notes",
            Some(&alice),
            Some(json!({ "title": "trip", "body": "pack bags" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(note["visibility"], "private");
        let uri = format!("/notes/{}", note["id"]);

        let (status, _) = send(&app, Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, share) = send(
            &app,
            Method::POST,
            &format!("{uri}/share"),
            Some(&alice),
            Some(json!({ "grantee": "bob", "level": "write" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(share["level"], "write");

        let (status, updated) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&bob),
            Some(json!({ "body": "pack bags and tickets" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["visibility"], "shared");
        assert_eq!(updated["access"], "write");

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("{uri}/share"),
            Some(&bob),
            Some(json!({ "grantee": "alice", "level": "read" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, history) =
            send(&app, Method::GET, &format!("{uri}/history"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["modified_by"], "bob");

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("{uri}/share/bob"),
            Some(&alice),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_shares_is_owner_only() {
        let app = create_test_app();
        let alice = register_and_login(&app, "alice").await;
        let bob = register_and_login(&app, "bob").await;

        let (_, note) = send(
            &app,
            Method::POST,
            "/notes",
            Some(&alice),
            Some(json!({ "title": "budget" })),
        )
        .await;
        let uri = format!("/notes/{}", note["id"]);
        send(
            &app,
            Method::POST,
            &format!("{uri}/share"),
            Some(&alice),
            Some(json!({ "grantee": "bob", "level": "read" })),
        )
        .await;

        let (status, shares) =
            send(&app, Method::GET, &format!("{uri}/shares"), Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(shares[0]["grantee"], "bob");

        let (status, _) =
            send(&app, Method::GET, &format!("{uri}/shares"), Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_requests_get_json_errors() {
        let app = create_test_app();
        let token = register_and_login(&app, "alice").await;

        let broken_json = Request::builder()
            .method(Method::POST)
            .uri("/notes")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let no_content_type = Request::builder()
            .method(Method::POST)
            .uri("/signup")
            .body(Body::from(r#"{"username":"bob","password":"correct horse"}"#))
            .unwrap();

        for request in [broken_json, no_content_type] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(body["error"].is_string());
        }

        let (status, body) = send(&app, Method::GET, "/notes/abc", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            Method::PUT,
            "/notes/1",
            Some(&token),
            Some(json!({ "title": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let app = create_test_app();

        let (status, doc) = send(&app, Method::GET, "/api-doc/openapi.json", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/notes/{id}/share/{user}"].is_object());
        assert!(doc["components"]["securitySchemes"]["bearer"].is_object());
    }
}
