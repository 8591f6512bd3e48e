//! Error taxonomy shared by queries and mutations.

use thiserror::Error;

/// Classification of a failed query or mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Server,
    Decode,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Server => "server",
            Self::Decode => "decode",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Failure of a remote read or write.
///
/// Cloneable so a single failure can be stored on an entry and observed by
/// every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Transport or connectivity failure.
    #[error("network error: {message}")]
    Network { message: String },
    /// Non-2xx response.
    #[error("server error: status {status}: {body}")]
    Server { status: u16, body: String },
    /// Response did not match the expected schema.
    #[error("decode error: {message}")]
    Decode { message: String },
    /// Request was superseded or aborted.
    #[error("request cancelled")]
    Cancelled,
}

impl QueryError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn server(status: u16, body: impl Into<String>) -> Self {
        Self::Server {
            status,
            body: body.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Server { .. } => ErrorKind::Server,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only transport failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}
