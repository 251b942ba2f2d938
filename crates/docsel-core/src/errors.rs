use thiserror::Error;

/// Failures reported by a document store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("malformed field selection {input:?}: {reason}")]
    MalformedSelection { input: String, reason: String },
    #[error("entry {document} does not match model {expected}")]
    SchemaMismatch { document: String, expected: String },
    #[error("no {collection} with id {id} found")]
    NotFound { collection: String, id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn malformed(input: &str, reason: impl Into<String>) -> Self {
        QueryError::MalformedSelection {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
