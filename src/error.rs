use std::time::Duration;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors returned by the answering service, on either endpoint
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Stream broke mid-flight: {0}")]
    Transport(String),

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },
}

/// Why a streaming attempt moved to the failed state
#[derive(Debug, Error)]
pub enum StreamFailure {
    #[error("Failed to open stream: {0}")]
    Open(#[source] ResponseError),

    #[error("Stream interrupted: {0}")]
    Interrupted(#[source] ResponseError),

    #[error("No frame received within {0:?}")]
    FirstFrameTimeout(Duration),
}

/// Errors surfaced to the person asking the question
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Please enter a query")]
    EmptyQuestion,

    #[error("Error fetching answer")]
    Fallback(#[source] ResponseError),
}
