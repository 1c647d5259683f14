use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FILE_TOO_LARGE_MESSAGE: &str = "File is too large. Maximum size is 100MB";
pub const UNSUPPORTED_TYPE_MESSAGE: &str = "Only PDF and text files are allowed";

/// Machine-readable category carried by every gateway failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedType,
    UpstreamTimeout,
    UpstreamError,
    GenerationFailed,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamError => "upstream_error",
            ErrorKind::GenerationFailed => "generation_failed",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "invalid_input" => Some(ErrorKind::InvalidInput),
            "unsupported_type" => Some(ErrorKind::UnsupportedType),
            "upstream_timeout" => Some(ErrorKind::UpstreamTimeout),
            "upstream_error" => Some(ErrorKind::UpstreamError),
            "generation_failed" => Some(ErrorKind::GenerationFailed),
            "internal" => Some(ErrorKind::Internal),
            _ => None,
        }
    }
}

/// Failure surfaced by the gateway. The display text is short and never
/// contains upstream payloads; those travel in `detail`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{message}")]
    InvalidInput { message: String },

    #[error("{message}")]
    UnsupportedType { message: String },

    #[error("{service} did not respond in time")]
    UpstreamTimeout {
        service: String,
        detail: Option<String>,
    },

    #[error("{service} request failed")]
    UpstreamError {
        service: String,
        detail: Option<String>,
    },

    #[error("answer generation failed")]
    GenerationFailed { detail: Option<String> },

    #[error("internal error")]
    Internal { detail: Option<String> },
}

impl GatewayError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        GatewayError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn unsupported_type(message: impl Into<String>) -> Self {
        GatewayError::UnsupportedType {
            message: message.into(),
        }
    }

    pub fn upstream(service: impl Into<String>, detail: impl Into<String>) -> Self {
        GatewayError::UpstreamError {
            service: service.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn timeout(service: impl Into<String>, detail: Option<String>) -> Self {
        GatewayError::UpstreamTimeout {
            service: service.into(),
            detail,
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        GatewayError::Internal {
            detail: Some(detail.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidInput { .. } => ErrorKind::InvalidInput,
            GatewayError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            GatewayError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            GatewayError::UpstreamError { .. } => ErrorKind::UpstreamError,
            GatewayError::GenerationFailed { .. } => ErrorKind::GenerationFailed,
            GatewayError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            GatewayError::InvalidInput { .. } | GatewayError::UnsupportedType { .. } => None,
            GatewayError::UpstreamTimeout { detail, .. }
            | GatewayError::UpstreamError { detail, .. }
            | GatewayError::GenerationFailed { detail }
            | GatewayError::Internal { detail } => detail.as_deref(),
        }
    }

    /// Re-labels any failure as a generation failure, keeping the
    /// original description as detail.
    pub fn into_generation_failure(self) -> Self {
        match self {
            GatewayError::GenerationFailed { .. } => self,
            other => {
                let detail = match other.detail() {
                    Some(detail) => format!("{other}: {detail}"),
                    None => other.to_string(),
                };
                GatewayError::GenerationFailed {
                    detail: Some(detail),
                }
            }
        }
    }

    /// Builds an error from a wire `code` plus message, as returned by the
    /// gateway's HTTP surface. Unknown codes fall back to `Internal`.
    pub fn from_wire(code: &str, message: String, detail: Option<String>) -> Self {
        match ErrorKind::from_code(code) {
            Some(ErrorKind::InvalidInput) => GatewayError::InvalidInput { message },
            Some(ErrorKind::UnsupportedType) => GatewayError::UnsupportedType { message },
            Some(ErrorKind::UpstreamTimeout) => GatewayError::UpstreamTimeout {
                service: "gateway".to_string(),
                detail: detail.or(Some(message)),
            },
            Some(ErrorKind::UpstreamError) => GatewayError::UpstreamError {
                service: "gateway".to_string(),
                detail: detail.or(Some(message)),
            },
            Some(ErrorKind::GenerationFailed) => GatewayError::GenerationFailed {
                detail: detail.or(Some(message)),
            },
            Some(ErrorKind::Internal) | None => GatewayError::Internal {
                detail: detail.or(Some(message)),
            },
        }
    }

    /// Classifies a transport-level failure from `reqwest`.
    pub fn from_transport(service: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GatewayError::timeout(service, Some(error.to_string()))
        } else if error.is_decode() {
            GatewayError::upstream(service, format!("malformed response: {error}"))
        } else {
            GatewayError::upstream(service, error.to_string())
        }
    }
}

/// Rejections raised by a chat session before any network call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("a question is already being answered")]
    SessionBusy,
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
