use axum::extract::rejection::{JsonRejection, PathRejection};
use axum_macros::{FromRequest, FromRequestParts};

use crate::service::ServiceError;

/// JSON request body; malformed input is reported as a [`ServiceError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServiceError))]
pub struct JsonBody<T>(pub T);

/// Path parameters; values that fail to parse are reported as a [`ServiceError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServiceError))]
pub struct PathParams<T>(pub T);

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
