use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("clipboard error: {0}")]
    Clipboard(String),
    #[error("executable not found: {0}")]
    MissingExecutable(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
