/// Core error type.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can report failures consistently regardless of which transport raised them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("session store error: {0}")]
    Store(String),

    #[error("update queue is closed")]
    QueueClosed,

    #[error("initialization failed: {0}")]
    Init(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
