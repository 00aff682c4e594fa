use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("corrupt stored row: {0}")]
    CorruptRow(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid destination url '{url}': {reason}")]
    InvalidDestination { url: String, reason: String },

    #[error("destination '{0}' cannot be removed")]
    ProtectedDestination(String),

    #[error("dispatch timed out after {0} ms")]
    DispatchTimeout(u64),

    #[error("dispatch rejected with status {status}: {body}")]
    DispatchStatus { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Storage contention that is worth exactly one more attempt.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            AppError::Storage(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        )
    }
}
