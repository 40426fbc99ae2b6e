//! Error types for the kiosk runtime.

use std::io;

/// Errors produced by the kiosk runtime.
#[derive(Debug, thiserror::Error)]
pub enum KioskError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("definition error: {0}")]
    Definition(String),

    #[error("update parser error: {0}")]
    Parser(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, KioskError>;
