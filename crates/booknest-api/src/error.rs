use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use booknest_core::BookNestError;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::media::MediaError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, slow down")]
    TooManyRequests,

    #[error("Image host error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthorized() -> Self {
        ApiError::Unauthorized("Unauthorized".to_string())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BookNestError> for ApiError {
    fn from(err: BookNestError) -> Self {
        match err {
            BookNestError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            BookNestError::Conflict(msg) => ApiError::Conflict(msg),
            BookNestError::Validation(msg) => ApiError::BadRequest(msg),
            BookNestError::Forbidden(msg) => ApiError::Forbidden(msg),
            BookNestError::InsufficientBalance => ApiError::BadRequest(err.to_string()),
            other => {
                error!("Store failure: {}", other);
                ApiError::Internal("unexpected storage failure".to_string())
            }
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        error!("Image host failure: {}", err);
        ApiError::Upstream(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `Json<T>` whose rejections render as `ApiError` bodies with status 400.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (BookNestError::not_found("Novel"), StatusCode::NOT_FOUND),
            (BookNestError::conflict("dup"), StatusCode::CONFLICT),
            (BookNestError::validation("bad"), StatusCode::BAD_REQUEST),
            (BookNestError::InsufficientBalance, StatusCode::BAD_REQUEST),
            (BookNestError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (BookNestError::Database("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn balance_message_is_kept() {
        let err = ApiError::from(BookNestError::InsufficientBalance);
        assert_eq!(err.to_string(), "Không đủ kim phiếu");
    }

    #[test]
    fn database_details_are_not_leaked() {
        let err = ApiError::from(BookNestError::Database("ns secret".into()));
        assert!(!err.to_string().contains("secret"));
    }
}
