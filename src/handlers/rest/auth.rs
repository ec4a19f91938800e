use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use std::sync::Arc;

use super::AppState;
use crate::{models::User, service::ServiceError};

/// The user behind the request's `Authorization: Bearer <token>` header.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

/// The auth scheme is matched case-insensitively.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or(ServiceError::Unauthorized)?
            .to_string();
        let user = state.auth.authenticate(&token).await?;

        Ok(Self { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(authorization: Option<&str>) -> Parts {
        let mut request = Request::builder().uri("/notes");
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        request.body(()).unwrap().into_parts().0
    }

    #[test]
    fn scheme_is_case_insensitive() {
        for header in ["Bearer abc", "bearer abc", "BEARER  abc "] {
            let parts = parts_with(Some(header));
            assert_eq!(bearer_token(&parts), Some("abc"), "{header}");
        }
    }

    #[test]
    fn other_schemes_and_empty_tokens_are_ignored() {
        for header in ["Basic abc", "Bearer", "Bearer   ", "Bearerabc"] {
            let parts = parts_with(Some(header));
            assert_eq!(bearer_token(&parts), None, "{header}");
        }
        assert_eq!(bearer_token(&parts_with(None)), None);
    }
}
