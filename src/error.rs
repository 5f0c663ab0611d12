use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::bili::MetadataError;

/// Request-level failure taxonomy. Only [`IntoResponse`] maps these to HTTP.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input. Never causes network I/O.
    #[error("{0}")]
    BadRequest(String),
    /// Well-formed input that violates a policy ceiling.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Encode(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MetadataError> for Error {
    fn from(e: MetadataError) -> Self {
        match e {
            // -404: the platform says the video does not exist.
            MetadataError::Api { code: -404, message } => Self::NotFound(message),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        } else {
            tracing::info!(%status, error = %self, "request rejected");
        }
        (status, Json(json!({ "msg": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(Error::Timeout("x".into()).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            Error::Encode("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let io: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(io, Error::Io(_)));
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_metadata_error_classification() {
        let e: Error = MetadataError::Network("connection refused".into()).into();
        assert!(matches!(e, Error::Upstream(_)));

        let e: Error = MetadataError::Parse("missing data".into()).into();
        assert!(matches!(e, Error::Upstream(_)));

        let e: Error = MetadataError::Api {
            code: -404,
            message: "no such video".into(),
        }
        .into();
        assert!(matches!(e, Error::NotFound(_)));

        let e: Error = MetadataError::Api {
            code: -412,
            message: "request blocked".into(),
        }
        .into();
        assert!(matches!(e, Error::Upstream(_)));
    }
}
