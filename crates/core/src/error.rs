use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("sender error: {0}")]
    Sender(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ReporterError>;
