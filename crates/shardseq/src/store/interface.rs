use core::fmt;

use crate::counter::{Counter, CounterKey};

/// Read/write access to counters inside one atomic scope.
///
/// A handle is obtained from [`Store::transact`], or supplied by a caller who
/// manages the scope themselves. Everything written through it commits
/// together or not at all.
pub trait Transaction {
    /// The error type of the owning store.
    type Err: fmt::Debug;

    /// Reads a counter, returning `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the read cannot be served.
    fn get(&mut self, key: &CounterKey) -> Result<Option<Counter>, Self::Err>;

    /// Writes a counter, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the write cannot be buffered or applied.
    fn put(&mut self, key: &CounterKey, counter: Counter) -> Result<(), Self::Err>;
}

/// Durable keyed storage for counters with atomic read-modify-write scopes.
///
/// The allocator never retries. Conflict detection, retry and abort policy all
/// belong to the implementation of [`Store::transact`]; whatever it cannot
/// resolve is reported through [`Store::Err`] and propagated to the caller
/// unchanged.
pub trait Store {
    /// The error type returned by every store operation.
    type Err: fmt::Debug;

    /// Reads a counter outside of any atomic scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &CounterKey) -> Result<Option<Counter>, Self::Err>;

    /// Reads a counter, creating it with `default` if it does not exist yet.
    ///
    /// This must be idempotent: for an existing counter `default` is ignored
    /// and the stored state returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    fn get_or_create(&self, key: &CounterKey, default: Counter) -> Result<Counter, Self::Err>;

    /// Overwrites a counter outside of any atomic scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn put(&self, key: &CounterKey, counter: Counter) -> Result<(), Self::Err>;

    /// Runs `body` inside one atomic scope covering `keys`.
    ///
    /// If `body` returns `Ok`, its writes are committed atomically. If it
    /// returns `Err`, they are discarded and the error is returned. The store
    /// may run `body` more than once when it detects a conflict; only the
    /// writes of the final, committed run take effect.
    ///
    /// `keys` declares the counters the body touches. Implementations may
    /// bound its length; the allocator never declares more than two.
    ///
    /// # Errors
    ///
    /// Returns `body`'s error, or the store's error converted into `E` when
    /// the scope cannot be opened or committed.
    fn transact<R, E, F>(&self, keys: &[CounterKey], body: F) -> Result<R, E>
    where
        F: FnMut(&mut dyn Transaction<Err = Self::Err>) -> Result<R, E>,
        E: From<Self::Err>;

    /// Removes a single counter. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete(&self, key: &CounterKey) -> Result<bool, Self::Err>;

    /// Removes every counter whose name falls in `[start, end)`. Returns how
    /// many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete_range(&self, start: &str, end: &str) -> Result<usize, Self::Err>;
}
