/// A result type carrying the crate's [`Error`].
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// All errors that `shardseq` can produce.
///
/// The generic parameter `E` is the error type of the backing [`Store`]. Store
/// failures are never retried or swallowed here; they surface unchanged in
/// [`Error::Store`].
///
/// Running out of ids is *not* an error, see [`AllocStatus::Exhausted`].
///
/// [`Store`]: crate::Store
/// [`AllocStatus::Exhausted`]: crate::AllocStatus::Exhausted
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E> {
    /// The counter name is empty or contains the reserved shard separator
    /// (`"__"`).
    #[error("invalid counter name {name:?}: must be non-empty and must not contain \"__\"")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// The configured lower bound is above the upper bound.
    #[error("invalid bounds: min ({min}) exceeds max ({max})")]
    InvalidBounds {
        /// The configured lower bound.
        min: u64,
        /// The configured (exclusive) upper bound.
        max: u64,
    },

    /// A call pinned a shard outside the family's `1..=shards`.
    #[error("shard {index} is outside the configured range 1..={shards}")]
    InvalidShard {
        /// The requested shard index.
        index: u64,
        /// The configured shard count.
        shards: u64,
    },

    /// The backing store failed to execute an operation.
    #[error("store failure: {0:?}")]
    Store(E),
}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Store(err)
    }
}
