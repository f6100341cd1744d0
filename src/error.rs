use thiserror::Error;

use crate::request::GenerationKind;
use crate::state_machine::JobId;

#[derive(Debug, Error)]
pub enum GenrelayError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No providers configured for {0} generation")]
    NoProviders(GenerationKind),

    #[error("Unknown {kind} provider: {id}")]
    UnknownProvider { id: String, kind: GenerationKind },

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, GenrelayError>;
