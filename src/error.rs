use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediascopeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Native host error: {0}")]
    HostError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Scenario error: {0}")]
    ScenarioError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MediascopeError>;
