/// Core error type for the lopper framework.
///
/// Rewrites themselves never fail; a guard condition that does not hold is
/// a `false` return, not an error. `CoreError` covers the edges of the
/// system: loading modules, saving them, and structural verification.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("malformed IR: {0}")]
    Verify(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
