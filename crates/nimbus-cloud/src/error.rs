//! Cloud session error types

use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the session core
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error(
        "Endpoint not found: type={service_type}, name={}, region={}",
        service_name.as_deref().unwrap_or("*"),
        region.as_deref().unwrap_or("*")
    )]
    EndpointNotFound {
        service_type: String,
        service_name: Option<String>,
        region: Option<String>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Error status returned by task {task}: {message}")]
    Task { task: String, message: String },

    #[error("Canceled status returned by task {task}")]
    TaskCanceled { task: String },

    #[error("Timeout ({} sec) while waiting for task {task}", timeout.as_secs_f64())]
    TaskTimeout { task: String, timeout: Duration },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Credential store error: {0}")]
    Store(String),
}

/// Coarse error classification, for callers that branch on the kind only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    InvalidCredentials,
    MalformedResponse,
    EndpointNotFound,
    Unauthorized,
    Http,
    Task,
    TaskCanceled,
    TaskTimeout,
    Transport,
    Store,
}

impl CloudError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::Configuration(_) => ErrorKind::Configuration,
            CloudError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            CloudError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            CloudError::EndpointNotFound { .. } => ErrorKind::EndpointNotFound,
            CloudError::Unauthorized(_) => ErrorKind::Unauthorized,
            CloudError::Http { .. } => ErrorKind::Http,
            CloudError::Task { .. } => ErrorKind::Task,
            CloudError::TaskCanceled { .. } => ErrorKind::TaskCanceled,
            CloudError::TaskTimeout { .. } => ErrorKind::TaskTimeout,
            CloudError::Transport(_) => ErrorKind::Transport,
            CloudError::Store(_) => ErrorKind::Store,
        }
    }

    /// Provider-supplied message for task failures, if any
    pub fn task_message(&self) -> Option<&str> {
        match self {
            CloudError::Task { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CloudError::Unauthorized(_))
    }
}

impl From<serde_json::Error> for CloudError {
    fn from(err: serde_json::Error) -> Self {
        CloudError::MalformedResponse(format!("Failed to parse JSON: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
