use thiserror::Error;

#[derive(Error, Debug, Default)]
pub enum StorageError {
    #[error("database unavailable")]
    #[default]
    StorageUnavailable,

    #[error("database error: `{0}`")]
    DBError(#[from] sea_orm::DbErr),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// Payload rejected by the store before any write happened
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// An update hook failed; the triggering update was rolled back
    #[error("hook `{hook}` failed: {reason}")]
    HookFailed { hook: String, reason: String },

    /// The request was abandoned because its consumer went away.
    ///
    /// Only stores that abandon in-flight requests themselves produce this;
    /// tests inject it through the in-memory store. `OverlayRepository`
    /// never does: a cancelled caller drops the pending future instead.
    /// Projections treat it as silent via [`StorageError::is_abort`].
    #[error("request cancelled")]
    Cancelled,
}

impl StorageError {
    /// Whether this error represents an intentional cancellation rather than a failure.
    #[inline]
    pub fn is_abort(&self) -> bool {
        matches!(self, StorageError::Cancelled)
    }
}

impl Clone for StorageError {
    fn clone(&self) -> Self {
        match self {
            StorageError::StorageUnavailable => StorageError::StorageUnavailable,
            StorageError::DBError(e) => StorageError::DBError(sea_orm::DbErr::Custom(e.to_string())),
            StorageError::EntityNotFound(s) => StorageError::EntityNotFound(s.clone()),
            StorageError::InvalidPayload(s) => StorageError::InvalidPayload(s.clone()),
            StorageError::HookFailed { hook, reason } => StorageError::HookFailed {
                hook: hook.clone(),
                reason: reason.clone(),
            },
            StorageError::Cancelled => StorageError::Cancelled,
        }
    }
}
