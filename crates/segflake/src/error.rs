/// Boxed transport error returned by cache and store bindings.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// A result type defaulting to the crate [`enum@Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `segflake` can produce.
///
/// Segment-path status codes returned by the cache scripts are translated to
/// the matching typed variant at the allocator boundary. Transport failures
/// from the underlying cache or store client are wrapped verbatim and never
/// retried.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The cache counter for a key has never been installed.
    #[error("segment counter is not initialized")]
    Uninitialized,

    /// The current cache window is exhausted and could not be replenished.
    #[error("segment window exhausted")]
    Overflow,

    /// A request or configuration value was rejected.
    #[error("bad parameter: {reason}")]
    BadParameter { reason: String },

    /// Replenishment lost a race: the cache already holds a window above the
    /// one being installed. Generation for `key` must not continue blindly.
    #[error("stale bounds for key {key:?}: [{lower}, {upper}] is behind the installed window")]
    StaleBounds { key: String, lower: i64, upper: i64 },

    /// A script reply could not be interpreted.
    #[error("unknown script reply: {reply:?}")]
    Unknown { reply: String },

    /// A composite ID layout violates its width constraints.
    #[error("invalid width {bits} for field {field}")]
    InvalidFieldWidth { field: &'static str, bits: u32 },

    /// The time component does not fit the time field.
    #[error("time value out of range")]
    InvalidTime,

    /// The sequence component does not fit the sequence field.
    #[error("sequence value out of range")]
    InvalidSequence,

    /// The machine id does not fit the machine field.
    #[error("machine id out of range")]
    InvalidMachineId,

    /// The gene component does not fit the gene field.
    #[error("gene value out of range")]
    InvalidGene,

    /// The configured time unit is shorter than one millisecond.
    #[error("time unit must be at least 1ms")]
    InvalidTimeUnit,

    /// The configured epoch lies in the future.
    #[error("epoch is ahead of the current time")]
    StartTimeAhead,

    /// Elapsed time no longer fits the time field; the epoch must be rotated.
    #[error("time field capacity exceeded")]
    TimeLimitExceeded,

    /// The cache client failed.
    #[error("cache error: {0}")]
    Cache(#[source] BoxError),

    /// The durable store client failed.
    #[error("store error: {0}")]
    Store(#[source] BoxError),

    /// Reading or writing the machine key list failed.
    #[error("machine key io: {0}")]
    Io(#[from] std::io::Error),

    /// The machine key list is not valid JSON.
    #[error("machine key file: {0}")]
    Json(#[from] serde_json::Error),

    /// The registration callback rejected a freshly generated machine key.
    #[error("registering machine {machine_id} failed: {source}")]
    Registration {
        machine_id: u64,
        #[source]
        source: BoxError,
    },

    /// The operation failed because a lock was **poisoned**.
    ///
    /// This occurs when a thread panics while holding the lock. When the
    /// `parking-lot` feature is enabled, mutexes do **not** poison, so this
    /// variant is not available.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("lock poisoned")]
    LockPoisoned,
}

impl Error {
    pub(crate) fn bad_parameter(reason: impl Into<String>) -> Self {
        Self::BadParameter {
            reason: reason.into(),
        }
    }
}

#[cfg(not(feature = "parking-lot"))]
use crate::mutex::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
// Convert all poisoned lock errors to a simplified `LockPoisoned`
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
