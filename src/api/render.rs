use axum::{
    body::Body,
    http::{
        header::{ACCEPT, CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use log::{error, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ResolveError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ErrorResponse {
    pub fn from_error(err: &ResolveError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
            details: err.details(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

pub fn status_for(err: &ResolveError) -> StatusCode {
    match err {
        ResolveError::BadDescriptor { .. } | ResolveError::BadRequest { .. } => {
            StatusCode::BAD_REQUEST
        }
        ResolveError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ResolveError::NotFound { .. } => StatusCode::NOT_FOUND,
        ResolveError::CycleDetected { .. } => StatusCode::CONFLICT,
        ResolveError::MultipleQueriesNotSupported(_) | ResolveError::ProofHrefMissing => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ResolveError::ProcessFailure { .. } | ResolveError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ResolveError::Internal(_) | ResolveError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: ResolveError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{}", err);
    } else {
        warn!("{}", err);
    }
    (status, Json(ErrorResponse::from_error(&err)))
}

/// A body served verbatim under `content_type`.
pub fn with_content_type(content_type: &str, body: impl Into<Body>) -> Response {
    let body: Body = body.into();
    ([(CONTENT_TYPE, content_type.to_string())], body).into_response()
}

/// Strings go out as-is, any other JSON value serialised.
pub fn render_payload(content_type: &str, value: &Value) -> Response {
    match value {
        Value::String(text) => with_content_type(content_type, text.clone()),
        other => with_content_type(content_type, other.to_string()),
    }
}

pub fn redirect(target: &str, accept: &str) -> Response {
    (
        StatusCode::FOUND,
        [
            (LOCATION, target.to_string()),
            (ACCEPT, accept.to_string()),
        ],
    )
        .into_response()
}

pub fn link(id: &str, kind: &str) -> Value {
    json!({ "@id": id, "@type": kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn statuses_follow_error_kinds() {
        assert_eq!(
            status_for(&ResolveError::bad_descriptor("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ResolveError::Forbidden {
                path: PathBuf::from("/x")
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&ResolveError::CycleDetected { cycle: vec![] }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&ResolveError::ProofHrefMissing),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ResolveError::Upstream("down".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn error_body_carries_details() {
        let (status, Json(body)) = error_response(ResolveError::BadDescriptor {
            message: "bad".into(),
            errors: vec!["/name: required".into()],
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.kind, "BadDescriptor");
        assert_eq!(body.details, vec!["/name: required"]);
    }

    #[test]
    fn redirects_set_location_and_accept() {
        let response = redirect("http://example.org/x", "text/turtle");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "http://example.org/x");
        assert_eq!(response.headers()[ACCEPT], "text/turtle");
    }
}
