use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("route table is not valid JSON: {0}")]
    Parse(String),

    #[error("duplicate route path: {0}")]
    DuplicateRoute(String),

    #[error("route path must be a single non-empty segment: {0:?}")]
    InvalidPath(String),

    #[error("base origin must be an absolute http(s) URL: {0}")]
    InvalidOrigin(String),

    #[error("{field} is {value}, the maximum is {max} minutes")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("invalid URL {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("rate limit exceeded for {origin}")]
    RateLimited { origin: String },

    #[error("access suspended for {remaining_minutes} more minute(s)")]
    Banned { remaining_minutes: u64 },

    #[error("{message}")]
    AuditBlocked {
        message: String,
        rule_id: String,
        param: String,
    },

    #[error("upstream unreachable: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                kind: kind.into(),
                param: None,
                code: None,
            },
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error.code = Some(code.into());
        self
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.error.param = Some(param.into());
        self
    }
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::InvalidRoute(_) => StatusCode::BAD_REQUEST,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::Banned { .. } | ProxyError::AuditBlocked { .. } => StatusCode::FORBIDDEN,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ProxyError::RouteNotFound(_) => {
                ErrorBody::new(self.to_string(), "invalid_request_error").with_code("route_not_found")
            }
            ProxyError::InvalidRoute(_) => {
                ErrorBody::new(self.to_string(), "invalid_request_error").with_code("invalid_route")
            }
            ProxyError::RateLimited { .. } => ErrorBody::new(
                "Rate limit exceeded. Try again later.",
                "rate_limited",
            )
            .with_code("rate_limit_exceeded"),
            ProxyError::Banned { .. } => {
                ErrorBody::new(self.to_string(), "banned").with_code("access_suspended")
            }
            ProxyError::AuditBlocked {
                message,
                rule_id,
                param,
            } => ErrorBody::new(message.clone(), "audit_blocked")
                .with_param(param.clone())
                .with_code(rule_id.clone()),
            // transport detail stays in the logs
            ProxyError::Upstream(_) => {
                ErrorBody::new("Upstream service unreachable", "upstream_error")
            }
            ProxyError::Internal(_) => {
                ErrorBody::new("Request could not be processed", "internal_error")
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}
