use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// SQLite unique-constraint violations surface as conflicts so callers
    /// can map them to the operator-facing Conflict kind.
    pub fn classify(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db) = err
            && db.is_unique_violation()
        {
            return Self::Conflict(what.to_string());
        }
        Self::Sqlx(err)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
