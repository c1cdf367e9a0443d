use core::iter::Chain;
use core::ops::Range;

use crate::counter::Grant;

/// The ids returned by [`ShardedAllocator::next`]: one contiguous run, plus a
/// second run when a short first grant had to be topped up.
///
/// Nothing is materialized: a batch covering billions of ids is two ranges.
/// Iterate it to visit the ids in issue order.
///
/// # Example
/// ```
/// use shardseq::{Grant, Ids};
///
/// let ids = Ids::new(Grant::new(4, 6), Some(Grant::new(10, 12)));
/// assert_eq!(ids.len(), 4);
/// assert_eq!(ids.into_iter().collect::<Vec<_>>(), [4, 5, 10, 11]);
/// ```
///
/// [`ShardedAllocator::next`]: crate::ShardedAllocator::next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ids {
    first: Grant,
    top_up: Option<Grant>,
}

impl Ids {
    /// No ids.
    pub const EMPTY: Self = Self {
        first: Grant::EMPTY,
        top_up: None,
    };

    /// Combines a first grant with an optional top-up.
    pub const fn new(first: Grant, top_up: Option<Grant>) -> Self {
        Self { first, top_up }
    }

    /// The first, contiguous run.
    pub const fn first(&self) -> Grant {
        self.first
    }

    /// The run that topped up a short first grant, if any.
    pub const fn top_up(&self) -> Option<Grant> {
        self.top_up
    }

    /// Total number of ids across both runs.
    pub const fn len(&self) -> u64 {
        let top_up = match self.top_up {
            Some(grant) => grant.len(),
            None => 0,
        };
        self.first.len().saturating_add(top_up)
    }

    /// Returns `true` if no ids were issued.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` is in either run.
    pub const fn contains(&self, id: u64) -> bool {
        self.first.contains(id)
            || match self.top_up {
                Some(grant) => grant.contains(id),
                None => false,
            }
    }

    /// The non-empty runs, in issue order.
    pub fn grants(&self) -> impl Iterator<Item = Grant> + use<> {
        core::iter::once(self.first)
            .chain(self.top_up)
            .filter(|grant| !grant.is_empty())
    }
}

impl From<Grant> for Ids {
    fn from(first: Grant) -> Self {
        Self::new(first, None)
    }
}

impl IntoIterator for Ids {
    type Item = u64;
    type IntoIter = Chain<Range<u64>, Range<u64>>;

    fn into_iter(self) -> Self::IntoIter {
        let top_up = self.top_up.map_or(0..0, |grant| grant.range());
        self.first.range().chain(top_up)
    }
}
