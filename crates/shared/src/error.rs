use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned with every access-gate 403.
pub const UNAUTHORIZED_ACTION: &str = "This action is unauthorized.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Upstream,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden() -> Self {
        Self::new(ErrorCode::Forbidden, UNAUTHORIZED_ACTION)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    #[error("unknown work order status '{0}'")]
    UnknownStatus(String),
    #[error("unknown stat field '{0}'")]
    UnknownStatField(String),
}

impl From<ParseError> for ApiError {
    fn from(value: ParseError) -> Self {
        Self::new(ErrorCode::Validation, value.to_string())
    }
}
