use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::error;

/// One `{code, detail, attr}` entry of the error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub code: String,
    pub detail: String,
    pub attr: Option<String>,
}

impl FieldError {
    pub fn new(code: impl Into<String>, detail: impl Into<String>, attr: Option<&str>) -> Self {
        Self {
            code: code.into(),
            detail: detail.into(),
            attr: attr.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedKind {
    /// No bearer credential on the request.
    Missing,
    Expired,
    Invalid,
    /// Login failure; never says which half of the credentials was wrong.
    Credentials,
}

impl UnauthorizedKind {
    fn code(self) -> &'static str {
        match self {
            Self::Missing | Self::Credentials => "unauthorized",
            Self::Expired => "expiredCredential",
            Self::Invalid => "invalidCredential",
        }
    }

    fn detail(self) -> &'static str {
        match self {
            Self::Missing => "Authentication credentials were not provided.",
            Self::Expired => "Your credentials have expired.",
            Self::Invalid => "Your credentials are invalid.",
            Self::Credentials => "Incorrect email or password.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    #[error("conflict on {attr}: {detail}")]
    Conflict {
        code: String,
        detail: String,
        attr: String,
    },

    #[error("{detail}")]
    NotFound { detail: String, attr: String },

    #[error("unauthorized: {0:?}")]
    Unauthorized(UnauthorizedKind),

    #[error("forbidden")]
    Forbidden,

    #[error("failed to {action}: {message}")]
    Internal { action: String, message: String },
}

impl AppError {
    pub fn internal(action: &str, err: impl std::fmt::Display) -> Self {
        Self::Internal {
            action: action.to_string(),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn errors(&self) -> Vec<FieldError> {
        match self {
            Self::Validation(errors) => errors.clone(),
            Self::Conflict { code, detail, attr } => {
                vec![FieldError::new(code.as_str(), detail.as_str(), Some(attr.as_str()))]
            }
            Self::NotFound { detail, attr } => {
                vec![FieldError::new("notFound", detail.as_str(), Some(attr.as_str()))]
            }
            Self::Unauthorized(kind) => vec![FieldError::new(kind.code(), kind.detail(), None)],
            Self::Forbidden => vec![FieldError::new(
                "permissionDenied",
                "You do not have permission to access this resource",
                None,
            )],
            Self::Internal { .. } => vec![FieldError::new(
                "internalServerError",
                "Server error occurred.",
                None,
            )],
        }
    }
}

/// Uniform error envelope returned for every failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        let kind = match err.status() {
            StatusCode::BAD_REQUEST => "validationError",
            StatusCode::INTERNAL_SERVER_ERROR => "serverError",
            _ => "clientError",
        };
        Self {
            kind,
            errors: err.errors(),
            path: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Internal { action, message } = &self {
            error!(%action, %message, "internal failure");
        }
        let body = ErrorBody::from(&self);
        let mut response = (self.status(), Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

/// Stamps `"<METHOD> <uri>"` onto error envelopes produced further down the stack.
pub async fn error_envelope(req: Request, next: Next) -> Response {
    let path = format!("{} {}", req.method(), req.uri());
    let mut response = next.run(req).await;
    match response.extensions_mut().remove::<ErrorBody>() {
        Some(mut body) => {
            body.path = Some(path);
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}
