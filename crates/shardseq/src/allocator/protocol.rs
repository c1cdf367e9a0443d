//! The reservation protocol run against one counter inside an atomic scope.
//!
//! A shard that runs dry refills from its root, asking for the request plus
//! one chunk. The root has no parent; when it runs dry the family is
//! exhausted. The protocol is two levels deep and no deeper.

use crate::{
    counter::{Counter, CounterKey, Grant},
    store::Transaction,
};

/// A grant together with the state needed to undo it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reservation {
    pub(crate) grant: Grant,
    /// The counter as it stood after any refill and before the grant.
    /// Writing it back returns the grant to the counter without losing ids
    /// moved over from the root.
    pub(crate) before: Counter,
}

/// Reserves up to `count` ids from `key`, refilling from the root with
/// `count + chunk` ids if the counter's window is empty.
///
/// Returns `None`, without writing anything, when neither the counter nor its
/// root holds any ids. `count` must be non-zero.
pub(crate) fn reserve<T>(
    txn: &mut T,
    key: &CounterKey,
    count: u64,
    chunk: u64,
) -> Result<Option<Reservation>, T::Err>
where
    T: Transaction + ?Sized,
{
    debug_assert!(count > 0);

    let mut counter = match txn.get(key)? {
        Some(counter) => counter,
        // Shards come into being lazily, empty, and refill on first use.
        None if !key.is_root() => Counter::EMPTY,
        None => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%key, "root counter is missing");
            return Ok(None);
        }
    };

    if counter.is_exhausted() {
        let Some(root) = key.parent() else {
            #[cfg(feature = "tracing")]
            tracing::debug!(%key, "root counter exhausted");
            return Ok(None);
        };
        match refill(txn, &root, count.saturating_add(chunk))? {
            Some(window) => counter = window,
            None => return Ok(None),
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(%key, low = counter.low(), high = counter.high(), "refilled from root");
    }

    let before = counter;
    let grant = counter.grant(count);
    txn.put(key, counter)?;
    Ok(Some(Reservation { grant, before }))
}

/// Takes up to `count` ids off the root and returns them as a fresh window.
fn refill<T>(txn: &mut T, root: &CounterKey, count: u64) -> Result<Option<Counter>, T::Err>
where
    T: Transaction + ?Sized,
{
    let Some(mut parent) = txn.get(root)? else {
        #[cfg(feature = "tracing")]
        tracing::warn!(%root, "root counter is missing");
        return Ok(None);
    };
    if parent.is_exhausted() {
        #[cfg(feature = "tracing")]
        tracing::debug!(%root, "root counter exhausted");
        return Ok(None);
    }
    let grant = parent.grant(count);
    txn.put(root, parent)?;
    Ok(Some(Counter::from(grant)))
}
