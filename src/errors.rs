/// Domain-specific error types for the pricing service.
/// Only contract violations surface here. The hot numeric path never
/// returns these; it propagates non-finite values instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid dispatch target: {0}")]
    InvalidDispatch(String),

    #[error("invalid instrument {name}: {reason}")]
    InvalidInstrument { name: String, reason: String },

    #[error("instrument already registered: {0}")]
    DuplicateInstrument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("thread pool error: {0}")]
    ThreadPool(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for EngineError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        EngineError::ThreadPool(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
