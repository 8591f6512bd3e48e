use thiserror::Error;

/// Failures while wiring up the client stack, before any request is made.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to build http client: {message}")]
    HttpClient { message: String },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn http_client(message: impl Into<String>) -> Self {
        Self::HttpClient {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
