use thiserror::Error;

use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template could not be loaded: {0}")]
    TemplateLoad(String),
    #[error("output document could not be built: {0}")]
    OutputBuild(String),
    #[error("template fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no field with key {0:?}")]
    UnknownField(String),
    #[error("group {group:?} has no option {option:?}")]
    UnknownOption { group: String, option: String },
    #[error("no template is loaded")]
    NotLoaded,
    #[error("preview failed: {0}")]
    Preview(String),
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> Self {
        EngineError::TemplateLoad(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Task(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
