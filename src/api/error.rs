//! API errors
//!
//! The control plane answers failed calls with a gRPC status body
//! (`{"code": 5, "message": "..."}`) even on its REST gateway, so errors are
//! classified by gRPC [`Code`] rather than by HTTP status.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// gRPC status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Cancelled,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            _ => Self::Unknown,
        }
    }

    /// Best-effort mapping used when the gateway did not return a status body
    pub fn from_http_status(status: StatusCode) -> Self {
        match status.as_u16() {
            200..=299 => Self::Ok,
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            412 => Self::FailedPrecondition,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            501 => Self::Unimplemented,
            503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            500..=599 => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

/// Status payload shared by failed calls and failed operations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<serde_json::Value>,
}

impl Status {
    pub fn code(&self) -> Code {
        Code::from_i32(self.code)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rpc error: code = {code:?} desc = {message}")]
    Status { code: Code, message: String },

    #[error("operation {id} failed: code = {code:?} desc = {message}")]
    OperationFailed {
        id: String,
        code: Code,
        message: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ApiError {
    pub fn status(code: Code, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(Code::NotFound, message)
    }

    /// Status code carried by this error, if it came from the server
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Status { code, .. } | Self::OperationFailed { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(Code::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_from_i32() {
        assert_eq!(Code::from_i32(5), Code::NotFound);
        assert_eq!(Code::from_i32(9), Code::FailedPrecondition);
        assert_eq!(Code::from_i32(2), Code::Unknown);
        assert_eq!(Code::from_i32(42), Code::Unknown);
    }

    #[test]
    fn test_code_from_http_status() {
        assert_eq!(Code::from_http_status(StatusCode::NOT_FOUND), Code::NotFound);
        assert_eq!(Code::from_http_status(StatusCode::FORBIDDEN), Code::PermissionDenied);
        assert_eq!(Code::from_http_status(StatusCode::BAD_GATEWAY), Code::Internal);
    }

    #[test]
    fn test_is_not_found() {
        assert!(ApiError::not_found("policy not found").is_not_found());
        assert!(!ApiError::status(Code::Internal, "boom").is_not_found());
        assert!(!ApiError::Auth("no token".into()).is_not_found());
    }
}
