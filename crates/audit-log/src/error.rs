use thiserror::Error;

/// Errors that can occur when writing to or reading from the audit trail.
#[derive(Debug, Error)]
pub enum AuditLogError {
    /// The caller is not allowed to write audit entries.
    ///
    /// This is an expected condition and is absorbed silently by the recorder.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backing store is temporarily unreachable.
    #[error("Audit store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be decoded into an entry.
    #[error("Invalid audit row: {0}")]
    InvalidRow(String),
}

impl AuditLogError {
    /// Returns true for failure classes that are absorbed without diagnostics.
    pub fn is_expected(&self) -> bool {
        matches!(self, AuditLogError::PermissionDenied(_))
    }
}

/// Result type for audit log operations.
pub type Result<T> = std::result::Result<T, AuditLogError>;
