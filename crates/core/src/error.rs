use thiserror::Error;

/// Top-level error type shared by the library crates.
#[derive(Debug, Error)]
pub enum MxError {
    #[error("config error: {0}")]
    Config(String),

    #[error("system error: {0}")]
    System(String),
}

pub type Result<T, E = MxError> = std::result::Result<T, E>;
