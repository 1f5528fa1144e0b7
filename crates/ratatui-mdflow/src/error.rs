use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn source text (or its JSON wire form) into a [`crate::ast::MarkdownNode`].
///
/// A parser never hands back a partially built tree: it either returns the whole document or
/// one of these.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("markdown input is {len} bytes, limit is {limit}")]
    InputTooLarge { len: usize, limit: usize },

    #[error("markdown tree left {open} node(s) open at end of input")]
    Unbalanced { open: usize },

    #[error("invalid markdown node json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;
