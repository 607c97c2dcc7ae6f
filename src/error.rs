use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("engine channel closed")]
    EngineClosed,
    #[error("state lock poisoned")]
    StateLock,
}
