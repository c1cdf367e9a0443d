use core::{cmp, ops::Range};

/// The largest value a counter bound can take. Advancing `low` saturates here.
pub const MAX_REPRESENTABLE: u64 = u64::MAX;

/// The persisted state of a named counter: the half-open window `[low, high)`
/// of ids it still holds.
///
/// Root counters start out with the configured `[min, max)` window. Shard
/// counters start out empty and refill from their root on first use.
///
/// `low <= high` always holds: [`Counter::new`] clamps inverted windows,
/// [`Counter::grant`] never advances `low` past `high`, and deserializing an
/// inverted window fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "raw::RawCounter"))]
pub struct Counter {
    low: u64,
    high: u64,
}

impl Counter {
    /// The state of a freshly created shard counter.
    pub const EMPTY: Self = Self { low: 0, high: 0 };

    /// Creates a counter holding `[low, high)`.
    ///
    /// If `high < low` the window is clamped to empty at `low`.
    pub const fn new(low: u64, high: u64) -> Self {
        if high < low {
            Self { low, high: low }
        } else {
            Self { low, high }
        }
    }

    /// The next unissued id in the window.
    pub const fn low(&self) -> u64 {
        self.low
    }

    /// Exclusive upper bound of the window.
    pub const fn high(&self) -> u64 {
        self.high
    }

    /// Returns `true` when the window holds no ids.
    pub const fn is_exhausted(&self) -> bool {
        self.low >= self.high
    }

    /// Number of ids left in the window.
    pub const fn remaining(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }

    /// Carves up to `count` ids off the bottom of the window.
    ///
    /// `low` advances with saturating arithmetic so adversarially large
    /// requests cannot overflow, and the returned grant is clamped to the
    /// window's upper bound. A grant is never larger than `count` but may be
    /// smaller when the window runs short.
    ///
    /// # Example
    /// ```
    /// use shardseq::Counter;
    ///
    /// let mut counter = Counter::new(8, 10);
    /// let grant = counter.grant(4);
    /// assert_eq!((grant.low, grant.high), (8, 10));
    /// assert!(counter.is_exhausted());
    /// ```
    pub fn grant(&mut self, count: u64) -> Grant {
        let low = self.low;
        if self.is_exhausted() {
            return Grant::new(low, low);
        }
        let high = cmp::min(low.saturating_add(count), self.high);
        self.low = high;
        Grant::new(low, high)
    }
}

impl From<Grant> for Counter {
    fn from(grant: Grant) -> Self {
        Self::new(grant.low, grant.high)
    }
}

#[cfg(feature = "serde")]
mod raw {
    use super::Counter;

    /// Wire form of a [`Counter`], checked before conversion.
    #[derive(serde::Deserialize)]
    pub struct RawCounter {
        low: u64,
        high: u64,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("inverted counter window: low ({low}) exceeds high ({high})")]
    pub struct InvertedWindow {
        low: u64,
        high: u64,
    }

    impl TryFrom<RawCounter> for Counter {
        type Error = InvertedWindow;

        fn try_from(raw: RawCounter) -> Result<Self, Self::Error> {
            if raw.low > raw.high {
                return Err(InvertedWindow {
                    low: raw.low,
                    high: raw.high,
                });
            }
            Ok(Self::new(raw.low, raw.high))
        }
    }
}

/// A half-open range `[low, high)` of ids handed to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Grant {
    /// First granted id.
    pub low: u64,
    /// One past the last granted id.
    pub high: u64,
}

impl Grant {
    /// The empty grant returned for zero-sized requests.
    pub const EMPTY: Self = Self { low: 0, high: 0 };

    /// Creates a grant covering `[low, high)`.
    pub const fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    /// Number of ids covered.
    pub const fn len(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }

    /// Returns `true` if the grant covers no ids.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` falls inside the grant.
    pub const fn contains(&self, id: u64) -> bool {
        self.low <= id && id < self.high
    }

    /// Returns `true` if the two grants share at least one id.
    pub const fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.low < other.high && other.low < self.high
    }

    /// The grant as a standard range.
    pub const fn range(&self) -> Range<u64> {
        self.low..self.high
    }
}

impl From<Grant> for Range<u64> {
    fn from(grant: Grant) -> Self {
        grant.range()
    }
}

impl IntoIterator for Grant {
    type Item = u64;
    type IntoIter = Range<u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.range()
    }
}
