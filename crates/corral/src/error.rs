use std::time::Duration;

use thiserror::Error;

/// An error that happens while populating or coordinating the cache.
///
/// This error enum is intended for sharing through the in-memory coalescing
/// layer, which is why it is `Clone` and carries foreign errors as strings
/// instead of boxed error objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The key is not present in any cache tier.
    #[error("not found")]
    NotFound,
    /// The lease over a resource is currently held by another owner.
    ///
    /// This is the only error kind the lock acquisition loop retries on.
    #[error("lease is held by another owner")]
    LockBusy,
    /// The lease stayed contended for the whole acquisition budget.
    ///
    /// The protected populate operation never ran. This is an overload
    /// signal, not a crash condition: callers should treat it like
    /// "try again later".
    #[error("timed out acquiring lease after {0:?}")]
    AcquireTimedOut(Duration),
    /// A lease could not be released because ownership was already lost.
    ///
    /// Expected under expiry races, callers releasing best-effort must not
    /// treat this as fatal.
    #[error("lease not released: ownership lost")]
    ReleaseFailed,
    /// A lease could not be renewed because ownership was already lost.
    #[error("lease not extended: ownership lost")]
    ExtendFailed,
    /// Another writer changed the key between the watched read and the
    /// transactional write of the optimistic populate path.
    ///
    /// There is no internal retry, the caller decides whether to try again.
    #[error("optimistic write conflict")]
    Conflict,
    /// A retried operation kept failing until its time budget ran out.
    ///
    /// Carries the last underlying error.
    #[error("retry budget of {budget:?} exhausted")]
    RetryBudgetExhausted {
        budget: Duration,
        #[source]
        source: Box<CacheError>,
    },
    /// The value could not be encoded or decoded by the codec.
    #[error("marshalling failed: {0}")]
    Marshalling(String),
    /// The remote store reported an error.
    #[error("store error: {0}")]
    Store(String),
    /// The populate function itself failed.
    ///
    /// This is kept distinct from the lock infrastructure errors above so
    /// callers can apply different handling to business-logic failures.
    #[error("populate failed: {0}")]
    Populate(String),
}

/// The bare kind of a [`CacheError`], used for the retry combinator's
/// "retry only this kind" filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    LockBusy,
    AcquireTimedOut,
    ReleaseFailed,
    ExtendFailed,
    Conflict,
    RetryBudgetExhausted,
    Marshalling,
    Store,
    Populate,
}

impl CacheError {
    /// Returns the tag of this error, without any payload.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::NotFound => ErrorKind::NotFound,
            CacheError::LockBusy => ErrorKind::LockBusy,
            CacheError::AcquireTimedOut(_) => ErrorKind::AcquireTimedOut,
            CacheError::ReleaseFailed => ErrorKind::ReleaseFailed,
            CacheError::ExtendFailed => ErrorKind::ExtendFailed,
            CacheError::Conflict => ErrorKind::Conflict,
            CacheError::RetryBudgetExhausted { .. } => ErrorKind::RetryBudgetExhausted,
            CacheError::Marshalling(_) => ErrorKind::Marshalling,
            CacheError::Store(_) => ErrorKind::Store,
            CacheError::Populate(_) => ErrorKind::Populate,
        }
    }
}

/// The result of a cache operation, either `Ok(T)` or the reason why the
/// value could not be fetched or populated.
pub type CacheContents<T = ()> = Result<T, CacheError>;
