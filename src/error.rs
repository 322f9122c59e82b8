//! Error type shared by the request pipeline and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;

pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum NicError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
        code: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl NicError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wraps a transport-level reqwest failure, deriving the code from its kind.
    pub fn transport(service: &'static str, err: reqwest::Error) -> Self {
        // The nutrition API takes its key as a query parameter
        let err = err.without_url();
        let code = if err.is_timeout() {
            "TIMEOUT"
        } else if err.is_connect() {
            "CONNECT"
        } else if err.is_decode() || err.is_body() {
            "DECODE"
        } else {
            "UPSTREAM_ERROR"
        };
        Self::Upstream {
            service,
            message: err.to_string(),
            code: code.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Upstream answered with a non-success status.
    pub fn status(service: &'static str, status: reqwest::StatusCode, body: &str) -> Self {
        Self::Upstream {
            service,
            message: format!("status {}: {}", status, body),
            code: format!("HTTP_{}", status.as_u16()),
            source: None,
        }
    }

    /// Upstream answered successfully but the payload was unusable.
    pub fn invalid_response(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
            code: "DECODE".to_string(),
            source: None,
        }
    }

    /// A streamed reply failed after it started: an error event or a missing `[DONE]`.
    pub fn stream_failure(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
            code: "STREAM_ERROR".to_string(),
            source: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            NicError::Validation(_) => StatusCode::BAD_REQUEST,
            NicError::Configuration(_) | NicError::Upstream { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &str {
        match self {
            NicError::Configuration(_) => "CONFIGURATION_ERROR",
            NicError::Validation(_) => "VALIDATION_ERROR",
            NicError::Upstream { code, .. } => code.as_str(),
        }
    }

    /// The error and its sources, outermost first, one per line.
    pub fn details(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut current = self.source();
        while let Some(err) = current {
            lines.push(format!("caused by: {}", err));
            current = err.source();
        }
        lines.join("\n")
    }

    pub fn to_body(&self, expose_details: bool) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            details: expose_details.then(|| self.details()),
            code: self.code().to_string(),
        }
    }
}

/// JSON body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub code: String,
}

/// A `NicError` paired with the server's disclosure setting, ready to be rendered.
pub struct ApiError {
    pub error: NicError,
    pub expose_details: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error.code(), "Request failed: {}", self.error.details());
        } else {
            tracing::warn!(code = self.error.code(), "Rejected request: {}", self.error);
        }
        (status, Json(self.error.to_body(self.expose_details))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_per_kind() {
        assert_eq!(
            NicError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            NicError::Configuration("missing".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let upstream = NicError::status("openai", reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(upstream.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(upstream.code(), "HTTP_429");
    }

    #[test]
    fn test_body_hides_details_when_asked() {
        let err = NicError::Configuration("OPENAI_API_KEY is not set".into());
        let body = err.to_body(false);
        assert_eq!(body.code, "CONFIGURATION_ERROR");
        assert!(body.details.is_none());
        assert!(body.error.contains("OPENAI_API_KEY"));

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_details_walks_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = NicError::Upstream {
            service: "fdc",
            message: "stream broke".into(),
            code: "UPSTREAM_ERROR".into(),
            source: Some(Box::new(io)),
        };
        let details = err.details();
        assert!(details.starts_with("fdc request failed: stream broke"));
        assert!(details.contains("caused by: socket closed"));
    }
}
