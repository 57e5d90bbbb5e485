use thiserror::Error;

use crate::core::types::AgentId;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid world definition: {0}")]
    InvalidWorld(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Runtime channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
