/// Represents the outcome of an allocation call.
///
/// Running out of ids is an expected condition, not a fault, so it is modelled
/// as a status alongside the granted value rather than as an error:
///
/// - [`AllocStatus::Ready`] carries the granted value (a [`Grant`], a list of
///   ids, or a single id, depending on the call).
/// - [`AllocStatus::Exhausted`] means the root counter's window is fully
///   consumed and nothing could be granted.
///
/// Store failures are reported separately through [`Error::Store`].
///
/// # Example
///
/// ```
/// use shardseq::AllocStatus;
///
/// let status = AllocStatus::Ready { value: 7_u64 };
/// match status {
///     AllocStatus::Ready { value } => println!("got {value}"),
///     AllocStatus::Exhausted => println!("no ids left"),
/// }
/// ```
///
/// [`Grant`]: crate::Grant
/// [`Error::Store`]: crate::Error::Store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub enum AllocStatus<T> {
    /// The allocation succeeded.
    Ready {
        /// The granted value.
        value: T,
    },
    /// The root counter has no ids left.
    Exhausted,
}

impl<T> AllocStatus<T> {
    /// Returns `true` if nothing could be granted.
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Converts into an [`Option`], discarding the exhaustion marker.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready { value } => Some(value),
            Self::Exhausted => None,
        }
    }

    /// Maps the granted value, leaving [`AllocStatus::Exhausted`] untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AllocStatus<U> {
        match self {
            Self::Ready { value } => AllocStatus::Ready { value: f(value) },
            Self::Exhausted => AllocStatus::Exhausted,
        }
    }
}

impl<T> From<Option<T>> for AllocStatus<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Exhausted, |value| Self::Ready { value })
    }
}
