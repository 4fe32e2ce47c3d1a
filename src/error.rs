use thiserror::Error;

/// Main error type for Tagspread
#[derive(Error, Debug)]
pub enum TagspreadError {
    /// The resolver has no account for the requested id or handle
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Rate limiting or a transient network failure on the resolver side
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// An edge points at an account with no node in the graph
    #[error("Dangling reference: node {node} follows {missing}, which is not in the graph")]
    DanglingReference { node: String, missing: String },

    /// Seeds are applied once, before the first propagation pass
    #[error("Cannot seed a graph after {0} propagation pass(es) have been applied")]
    SeedAfterPropagation(usize),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Social platform API errors that are not worth retrying
    #[error("API error: {0}")]
    Api(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TagspreadError {
    /// True for errors the caller may retry later with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, TagspreadError::TransientFetch(_))
    }

    /// True when the resolver simply has no such account.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TagspreadError::AccountNotFound(_))
    }
}

/// Convenient Result type using TagspreadError
pub type Result<T> = std::result::Result<T, TagspreadError>;
