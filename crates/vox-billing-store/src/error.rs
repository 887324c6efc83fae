//! Error types for vox-billing storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed. Usually transient (I/O, compaction
    /// pressure); callers may retry.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed. Not transient: the stored
    /// bytes are wrong.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Record already exists (account creation).
    #[error("already exists")]
    AlreadyExists,

    /// Insufficient credits for a debit.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance in credits.
        balance: i64,
        /// Required amount in credits.
        required: i64,
    },
}

impl StoreError {
    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Only backend failures qualify; logical outcomes (not found,
    /// insufficient credits) and corrupt data never do.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
