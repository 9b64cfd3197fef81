//! Error types for afk

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unauthorized: invalid API key")]
    Unauthorized,

    #[error("{0}")]
    Api(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Listen(#[from] ListenError),
}

/// Terminal failure of a single listen call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenError {
    #[error("unauthorized: invalid API key")]
    Unauthorized,

    #[error("connection failed: {0}")]
    Transport(String),

    #[error("connection closed without response")]
    StreamClosed,

    #[error("timeout waiting for response after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
