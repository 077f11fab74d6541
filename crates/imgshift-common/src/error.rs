//! Error type shared by the record layer and the key/id parsers.
//!
//! Storage backends have their own error type in the main crate; this one
//! only covers what the library crates can fail on.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// SQLite rejected a statement or the pool ran dry.
    #[error("Database error: {0}")]
    Database(String),

    /// An id, key or column value could not be parsed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
