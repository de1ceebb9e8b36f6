use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use stake_execution::Error;
use stake_types::api::ErrorResponse;
use tracing::error;

/// Error returned by every handler, rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub enum ApiError {
    /// Rejected by the lifecycle engine.
    Core(Error),
    /// No actor on the request.
    Unauthenticated,
    /// Request refused before it reached the engine.
    Rejected {
        status: StatusCode,
        kind: &'static str,
        field: Option<&'static str>,
        message: String,
    },
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: StatusCode::FORBIDDEN,
            kind: "forbidden",
            field: None,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Rejected {
            status: StatusCode::UNAUTHORIZED,
            kind: "unauthenticated",
            field: None,
            message: message.into(),
        }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Core(Error::validation(field, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(err) => match err {
                Error::Validation { .. } => StatusCode::BAD_REQUEST,
                Error::Authorization(_) => StatusCode::FORBIDDEN,
                Error::InvalidState(_) => StatusCode::CONFLICT,
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Rejected { status, .. } => *status,
        }
    }

    fn body(&self) -> ErrorResponse {
        let status = self.status().as_u16();
        match self {
            // Storage details stay in the logs
            ApiError::Core(Error::Storage(_)) => ErrorResponse {
                status,
                kind: "storage".to_string(),
                message: "storage failure".to_string(),
                field: None,
            },
            ApiError::Core(err) => ErrorResponse {
                status,
                kind: err.kind().to_string(),
                message: err.to_string(),
                field: err.field().map(str::to_string),
            },
            ApiError::Unauthenticated => ErrorResponse {
                status,
                kind: "unauthenticated".to_string(),
                message: format!("missing {} header", super::USER_HEADER),
                field: None,
            },
            ApiError::Rejected {
                kind,
                field,
                message,
                ..
            } => ErrorResponse {
                status,
                kind: kind.to_string(),
                message: message.clone(),
                field: field.map(str::to_string),
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Core(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: StatusCode::BAD_REQUEST,
            kind: "validation",
            field: Some("body"),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: StatusCode::BAD_REQUEST,
            kind: "validation",
            field: Some("query"),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        let kind = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "payload_too_large"
        } else {
            "validation"
        };
        Self::Rejected {
            status,
            kind,
            field: Some("file"),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Core(err @ Error::Storage(_)) = &self {
            error!(error = %err, "request failed in storage");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::validation("title", "too short"), StatusCode::BAD_REQUEST),
            (Error::Authorization("host only".into()), StatusCode::FORBIDDEN),
            (Error::InvalidState("resolved".into()), StatusCode::CONFLICT),
            (Error::not_found("bet", "b1"), StatusCode::NOT_FOUND),
            (
                Error::Storage(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_body_carries_field_and_hides_storage_detail() {
        let body = ApiError::from(Error::validation("deadline", "must be in the future")).body();
        assert_eq!(body.status, 400);
        assert_eq!(body.kind, "validation");
        assert_eq!(body.field.as_deref(), Some("deadline"));

        let body = ApiError::from(Error::Storage(anyhow::anyhow!("disk full at /var"))).body();
        assert_eq!(body.kind, "storage");
        assert!(!body.message.contains("/var"));
    }
}
