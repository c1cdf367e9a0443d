use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

#[cfg(feature = "parking-lot")]
use parking_lot::{Mutex, MutexGuard};
#[cfg(not(feature = "parking-lot"))]
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    counter::{Counter, CounterKey},
    store::{Store, Transaction},
};

/// Default number of times [`MemoryStore::transact`] runs a body before
/// giving up on a contended scope.
pub const DEFAULT_MAX_ATTEMPTS: usize = 64;

/// Default upper bound on the number of keys one scope may declare.
pub const DEFAULT_MAX_SCOPE: usize = 2;

/// Errors produced by [`MemoryStore`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MemoryStoreError {
    /// Every attempt at committing the scope lost to a concurrent writer.
    #[error("transaction aborted after {attempts} conflicting attempts")]
    Conflict {
        /// How many times the body was run.
        attempts: usize,
    },

    /// The body touched a counter it did not declare.
    #[error("counter {name:?} is outside the transaction scope")]
    UndeclaredKey {
        /// The offending counter name.
        name: String,
    },

    /// The scope declared more keys than the store allows.
    #[error("transaction declares {declared} keys, limit is {limit}")]
    ScopeTooLarge {
        /// Number of keys declared.
        declared: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The lock guarding the store was poisoned by a panicking thread.
    ///
    /// Not available with the `parking-lot` feature, whose mutexes do not
    /// poison.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("store lock poisoned")]
    LockPoisoned,
}

#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for MemoryStoreError {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}

#[derive(Debug, Clone, Copy)]
struct Record {
    counter: Counter,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    records: BTreeMap<String, Record>,
    // Monotonic commit clock; every write stamps its record with a fresh
    // value so a delete-then-recreate is still seen as a change.
    clock: u64,
}

impl State {
    fn write(&mut self, name: String, counter: Counter) {
        self.clock += 1;
        let version = self.clock;
        self.records.insert(name, Record { counter, version });
    }

    fn version(&self, name: &str) -> Option<u64> {
        self.records.get(name).map(|record| record.version)
    }
}

/// An in-process [`Store`] keeping versioned counters in an ordered map.
///
/// Scopes are optimistic: a body runs against a private read/write set
/// without holding the lock, and commits only if none of the counters it read
/// changed in the meantime (first committer wins). A losing body is re-run,
/// up to [`MemoryStore::with_max_attempts`] times, after which
/// [`MemoryStoreError::Conflict`] is returned.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Serializable scopes over the declared keys
/// - ❌ Durable (state lives as long as the value)
///
/// ## Recommended When
/// - Running tests, benchmarks or single-process deployments
/// - Prototyping before wiring up a persistent store
///
/// # Example
/// ```
/// use shardseq::{Counter, CounterKey, MemoryStore, Store};
///
/// let store = MemoryStore::new();
/// let key = CounterKey::try_root("orders").unwrap();
/// let created = store.get_or_create(&key, Counter::new(0, 100)).unwrap();
/// assert_eq!(created, Counter::new(0, 100));
///
/// // Existing counters keep their state.
/// let again = store.get_or_create(&key, Counter::new(50, 60)).unwrap();
/// assert_eq!(again, created);
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    max_attempts: usize,
    max_scope: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with default limits.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_scope: DEFAULT_MAX_SCOPE,
        }
    }

    /// Sets how many times a conflicting body is run before the scope fails.
    /// Values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets how many keys a single scope may declare.
    #[must_use]
    pub fn with_max_scope(mut self, keys: usize) -> Self {
        self.max_scope = keys;
        self
    }

    /// Returns every stored counter in name order.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryStoreError::LockPoisoned`] if the lock was poisoned.
    pub fn counters(&self) -> Result<Vec<(String, Counter)>, MemoryStoreError> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .map(|(name, record)| (name.clone(), record.counter))
            .collect())
    }

    /// Number of stored counters.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryStoreError::LockPoisoned`] if the lock was poisoned.
    pub fn len(&self) -> Result<usize, MemoryStoreError> {
        Ok(self.lock()?.records.len())
    }

    /// Returns `true` if no counters are stored.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryStoreError::LockPoisoned`] if the lock was poisoned.
    pub fn is_empty(&self) -> Result<bool, MemoryStoreError> {
        Ok(self.lock()?.records.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, MemoryStoreError> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(self.state.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            Ok(self.state.lock()?)
        }
    }
}

impl Store for MemoryStore {
    type Err = MemoryStoreError;

    fn get(&self, key: &CounterKey) -> Result<Option<Counter>, Self::Err> {
        let state = self.lock()?;
        Ok(state.records.get(key.as_str()).map(|record| record.counter))
    }

    fn get_or_create(&self, key: &CounterKey, default: Counter) -> Result<Counter, Self::Err> {
        let mut state = self.lock()?;
        if let Some(record) = state.records.get(key.as_str()) {
            return Ok(record.counter);
        }
        state.write(key.as_str().to_owned(), default);
        Ok(default)
    }

    fn put(&self, key: &CounterKey, counter: Counter) -> Result<(), Self::Err> {
        self.lock()?.write(key.as_str().to_owned(), counter);
        Ok(())
    }

    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, body)))]
    fn transact<R, E, F>(&self, keys: &[CounterKey], mut body: F) -> Result<R, E>
    where
        F: FnMut(&mut dyn Transaction<Err = Self::Err>) -> Result<R, E>,
        E: From<Self::Err>,
    {
        if keys.len() > self.max_scope {
            return Err(MemoryStoreError::ScopeTooLarge {
                declared: keys.len(),
                limit: self.max_scope,
            }
            .into());
        }

        for _attempt in 1..=self.max_attempts {
            let mut txn = MemoryTransaction::new(self, keys);
            let out = body(&mut txn)?;
            if txn.commit()? {
                return Ok(out);
            }
            #[cfg(feature = "tracing")]
            tracing::trace!(attempt = _attempt, "scope conflicted, retrying");
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(attempts = self.max_attempts, "giving up on contended scope");
        Err(MemoryStoreError::Conflict {
            attempts: self.max_attempts,
        }
        .into())
    }

    fn delete(&self, key: &CounterKey) -> Result<bool, Self::Err> {
        Ok(self.lock()?.records.remove(key.as_str()).is_some())
    }

    fn delete_range(&self, start: &str, end: &str) -> Result<usize, Self::Err> {
        let mut state = self.lock()?;
        let doomed: Vec<String> = state
            .records
            .range::<str, _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(name, _)| name.clone())
            .collect();
        for name in &doomed {
            state.records.remove(name);
        }
        Ok(doomed.len())
    }
}

/// One optimistic attempt at a [`MemoryStore`] scope.
struct MemoryTransaction<'s> {
    store: &'s MemoryStore,
    scope: &'s [CounterKey],
    // Version observed on first read; `None` records that the key was absent.
    reads: HashMap<String, Option<u64>>,
    writes: HashMap<String, Counter>,
}

impl<'s> MemoryTransaction<'s> {
    fn new(store: &'s MemoryStore, scope: &'s [CounterKey]) -> Self {
        Self {
            store,
            scope,
            reads: HashMap::new(),
            writes: HashMap::new(),
        }
    }

    fn check_scope(&self, key: &CounterKey) -> Result<(), MemoryStoreError> {
        if self.scope.contains(key) {
            Ok(())
        } else {
            Err(MemoryStoreError::UndeclaredKey {
                name: key.as_str().to_owned(),
            })
        }
    }

    /// Validates the read set and applies the write set. Returns `false` if a
    /// counter read by this attempt changed since it was read.
    fn commit(self) -> Result<bool, MemoryStoreError> {
        let store = self.store;
        let mut state = store.lock()?;
        let stale = self
            .reads
            .iter()
            .any(|(name, seen)| state.version(name) != *seen);
        if stale {
            return Ok(false);
        }
        for (name, counter) in self.writes {
            state.write(name, counter);
        }
        Ok(true)
    }
}

impl Transaction for MemoryTransaction<'_> {
    type Err = MemoryStoreError;

    fn get(&mut self, key: &CounterKey) -> Result<Option<Counter>, Self::Err> {
        self.check_scope(key)?;
        if let Some(counter) = self.writes.get(key.as_str()) {
            return Ok(Some(*counter));
        }
        let store = self.store;
        let state = store.lock()?;
        let record = state.records.get(key.as_str()).copied();
        self.reads
            .entry(key.as_str().to_owned())
            .or_insert(record.map(|record| record.version));
        Ok(record.map(|record| record.counter))
    }

    fn put(&mut self, key: &CounterKey, counter: Counter) -> Result<(), Self::Err> {
        self.check_scope(key)?;
        self.writes.insert(key.as_str().to_owned(), counter);
        Ok(())
    }
}
