use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Knowledge store unavailable: {0}")]
    Unavailable(String),

    #[error("No knowledge snapshot loaded")]
    NotLoaded,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Core(#[from] ahara_core::Error),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, KbError>;

impl KbError {
    /// Whether the store itself could not be reached
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::NotLoaded => true,
            Self::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            Self::Core(e) => matches!(e, ahara_core::Error::StoreUnavailable(_)),
            _ => false,
        }
    }
}

impl From<KbError> for ahara_core::Error {
    fn from(err: KbError) -> Self {
        if err.is_unavailable() {
            return ahara_core::Error::StoreUnavailable(err.to_string());
        }
        match err {
            KbError::Core(e) => e,
            KbError::Io(e) => ahara_core::Error::Io(e),
            KbError::Json(e) => ahara_core::Error::Json(e),
            other => ahara_core::Error::Internal(other.to_string()),
        }
    }
}
