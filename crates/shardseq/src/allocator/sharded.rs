use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    allocator::{AllocatorConfig, Options, ShardRouter, Target, protocol},
    counter::{Counter, CounterKey, Grant, Ids},
    error::{Error, Result},
    rand::{RandSource, ThreadRandom},
    status::AllocStatus,
    store::{Store, Transaction},
};

/// Hands out unique integers from a named counter family, spreading
/// contention over shard counters that reserve chunks from a shared root.
///
/// Ids are *eventually sequential*: every id in the root's window is issued
/// exactly once, but concurrent callers drawing from different shards see
/// interleaved ranges. Under low contention the issued ids converge on a
/// plain sequence.
///
/// Every call runs in a single atomic scope of the backing [`Store`] touching
/// at most two counters: the routed one and, if it must refill, its root.
///
/// ## Features
/// - ✅ Unique: issued ranges never overlap
/// - ✅ Gap-free: every id in the window is eventually issued
/// - ✅ Horizontally scalable: more shards, less contention on any one
///   counter
/// - ❌ Strictly sequential under contention
///
/// Issued ids are never taken back. Deleting a family and recreating it
/// under the same name starts over at the configured minimum and can
/// reissue ids handed out before the deletion.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use shardseq::{AllocStatus, AllocatorConfig, MemoryStore, ShardedAllocator};
///
/// let store = Arc::new(MemoryStore::new());
/// let ids = ShardedAllocator::new(store, AllocatorConfig::new("orders").with_chunk(8)).unwrap();
///
/// match ids.next(3).unwrap() {
///     AllocStatus::Ready { value } => assert_eq!(value.len(), 3),
///     AllocStatus::Exhausted => unreachable!(),
/// }
/// ```
#[derive(Debug)]
pub struct ShardedAllocator<S, R = ThreadRandom>
where
    S: Store,
    R: RandSource,
{
    store: Arc<S>,
    config: AllocatorConfig,
    router: ShardRouter<R>,
}

impl<S> ShardedAllocator<S, ThreadRandom>
where
    S: Store,
{
    /// Connects to the counter family named in `config`, creating its root
    /// with the window `[min, max)` if it does not exist yet.
    ///
    /// Connecting to an existing root leaves it untouched: `min` and `max`
    /// only apply at creation.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`] if the name is empty or contains `"__"`.
    /// - [`Error::InvalidBounds`] if `min > max`.
    /// - [`Error::Store`] if the root cannot be read or created.
    pub fn new(store: Arc<S>, config: AllocatorConfig) -> Result<Self, S::Err> {
        Self::with_rng(store, config, ThreadRandom)
    }
}

impl<S, R> ShardedAllocator<S, R>
where
    S: Store,
    R: RandSource,
{
    /// Like [`ShardedAllocator::new`], drawing shard indices from `rng`.
    ///
    /// # Errors
    ///
    /// See [`ShardedAllocator::new`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(store, rng)))]
    pub fn with_rng(store: Arc<S>, config: AllocatorConfig, rng: R) -> Result<Self, S::Err> {
        let root = CounterKey::try_root(config.name()).ok_or_else(|| Error::InvalidName {
            name: config.name().to_owned(),
        })?;
        if config.min() > config.max() {
            return Err(Error::InvalidBounds {
                min: config.min(),
                max: config.max(),
            });
        }

        let _state = store.get_or_create(&root, Counter::new(config.min(), config.max()))?;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            %root,
            low = _state.low(),
            high = _state.high(),
            shards = config.shards(),
            "connected to counter"
        );

        let router = ShardRouter::new(root, config.chunk(), config.shards(), config.direct(), rng);
        Ok(Self {
            store,
            config,
            router,
        })
    }

    /// The configuration this allocator was built with.
    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// The key of the family's root counter.
    pub const fn root(&self) -> &CounterKey {
        self.router.root()
    }

    /// The backing store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Reads the root counter's current window, or `None` if it was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store cannot be read.
    pub fn root_state(&self) -> Result<Option<Counter>, S::Err> {
        Ok(self.store.get(self.root())?)
    }

    /// Reads any counter's current window, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store cannot be read.
    pub fn counter_state(&self, key: &CounterKey) -> Result<Option<Counter>, S::Err> {
        Ok(self.store.get(key)?)
    }

    /// Decides which counter serves a request for `count` ids.
    ///
    /// Use this with the `*_in` methods when running inside a scope you
    /// opened yourself: declare [`Target::scope`] when opening it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShard`] if `options` pins a shard outside
    /// `1..=shards` and the request is not routed to the root.
    pub fn route(&self, count: u64, options: &Options) -> Result<Target, S::Err> {
        self.router
            .select(count, options)
            .ok_or_else(|| Error::InvalidShard {
                index: options.shard.unwrap_or_default(),
                shards: self.config.shards(),
            })
    }

    /// Reserves up to `count` ids as one contiguous range.
    ///
    /// The range may hold fewer than `count` ids when the serving counter
    /// runs short; it never holds more. A zero `count` yields the empty range
    /// without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails the scope.
    pub fn reserve(&self, count: u64) -> Result<AllocStatus<Grant>, S::Err> {
        self.reserve_with(count, Options::new())
    }

    /// [`ShardedAllocator::reserve`] with per-call overrides.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidShard`] if `options` pins a shard outside the family.
    /// - [`Error::Store`] if the store fails the scope.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(name = %self.root())))]
    pub fn reserve_with(&self, count: u64, options: Options) -> Result<AllocStatus<Grant>, S::Err> {
        if count == 0 {
            return Ok(AllocStatus::Ready { value: Grant::EMPTY });
        }
        let target = self.route(count, &options)?;
        self.store
            .transact(&target.scope(), |txn| self.reserve_in(txn, &target, count))
    }

    /// [`ShardedAllocator::reserve`] inside a caller-managed scope.
    ///
    /// The scope must declare [`Target::scope`]. Do not reserve twice from
    /// the same family within one scope: a store that does not show a scope
    /// its own uncommitted writes would hand out overlapping ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a read or write fails.
    pub fn reserve_in<T>(
        &self,
        txn: &mut T,
        target: &Target,
        count: u64,
    ) -> Result<AllocStatus<Grant>, S::Err>
    where
        T: Transaction<Err = S::Err> + ?Sized,
    {
        if count == 0 {
            return Ok(AllocStatus::Ready { value: Grant::EMPTY });
        }
        let reservation = protocol::reserve(txn, target.key(), count, target.chunk())?;
        Ok(reservation.map(|r| r.grant).into())
    }

    /// Returns `count` ids as an [`Ids`] batch of at most two runs. The ids
    /// are not materialized, so any `count` is cheap.
    ///
    /// With `guaranteed` set, a short first grant is topped up with a second
    /// reservation from the same counter, which by then has to refill from
    /// the root. The result then holds exactly `count` ids, possibly as two
    /// disjoint runs. If the root cannot supply the top-up at all, the first
    /// grant is handed back to its counter and [`AllocStatus::Exhausted`] is
    /// returned. If the root runs dry part way through the top-up, the ids
    /// obtained so far are returned.
    ///
    /// Without `guaranteed`, the result is the single contiguous, possibly
    /// short, range from [`ShardedAllocator::reserve`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails the scope.
    pub fn next(&self, count: u64) -> Result<AllocStatus<Ids>, S::Err> {
        self.next_with(count, true, Options::new())
    }

    /// [`ShardedAllocator::next`] with explicit guarantee and overrides.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidShard`] if `options` pins a shard outside the family.
    /// - [`Error::Store`] if the store fails the scope.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(name = %self.root())))]
    pub fn next_with(
        &self,
        count: u64,
        guaranteed: bool,
        options: Options,
    ) -> Result<AllocStatus<Ids>, S::Err> {
        if count == 0 {
            return Ok(AllocStatus::Ready { value: Ids::EMPTY });
        }
        let target = self.route(count, &options)?;
        self.store.transact(&target.scope(), |txn| {
            self.next_in(txn, &target, count, guaranteed)
        })
    }

    /// [`ShardedAllocator::next_with`] inside a caller-managed scope.
    ///
    /// The same restrictions as [`ShardedAllocator::reserve_in`] apply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a read or write fails.
    pub fn next_in<T>(
        &self,
        txn: &mut T,
        target: &Target,
        count: u64,
        guaranteed: bool,
    ) -> Result<AllocStatus<Ids>, S::Err>
    where
        T: Transaction<Err = S::Err> + ?Sized,
    {
        if count == 0 {
            return Ok(AllocStatus::Ready { value: Ids::EMPTY });
        }
        let key = target.key();
        let Some(first) = protocol::reserve(txn, key, count, target.chunk())? else {
            return Ok(AllocStatus::Exhausted);
        };

        let mut ids = Ids::from(first.grant);
        let short = count - first.grant.len();
        if guaranteed && short > 0 {
            match protocol::reserve(txn, key, short, target.chunk())? {
                Some(top_up) => ids = Ids::new(first.grant, Some(top_up.grant)),
                None => {
                    txn.put(key, first.before)?;
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        %key,
                        low = first.before.low(),
                        high = first.before.high(),
                        "top-up exhausted, restored counter"
                    );
                    return Ok(AllocStatus::Exhausted);
                }
            }
        }

        Ok(AllocStatus::Ready { value: ids })
    }

    /// Returns a single id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails the scope.
    pub fn one(&self) -> Result<AllocStatus<u64>, S::Err> {
        self.one_with(Options::new())
    }

    /// [`ShardedAllocator::one`] with per-call overrides.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidShard`] if `options` pins a shard outside the family.
    /// - [`Error::Store`] if the store fails the scope.
    pub fn one_with(&self, options: Options) -> Result<AllocStatus<u64>, S::Err> {
        Ok(self.reserve_with(1, options)?.map(|grant| grant.low))
    }

    /// [`ShardedAllocator::one`] inside a caller-managed scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if a read or write fails.
    pub fn one_in<T>(&self, txn: &mut T, target: &Target) -> Result<AllocStatus<u64>, S::Err>
    where
        T: Transaction<Err = S::Err> + ?Sized,
    {
        Ok(self.reserve_in(txn, target, 1)?.map(|grant| grant.low))
    }

    /// Removes the root and every shard-shaped counter of the family,
    /// returning how many counters were removed.
    ///
    /// All counters named `{root}__*` are removed, whatever the configured
    /// shard count. This is not atomic with respect to concurrent callers,
    /// who may observe a partial deletion or recreate shards mid-way. Use it
    /// for offline administration only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store fails a deletion.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(name = %self.root())))]
    pub fn delete(&self) -> Result<usize, S::Err> {
        // Root first, so shards recreated by racing callers find nothing to
        // refill from.
        let root = usize::from(self.store.delete(self.root())?);
        let (start, end) = self.root().shard_range();
        let shards = self.store.delete_range(&start, &end)?;
        #[cfg(feature = "tracing")]
        tracing::info!(root, shards, "deleted counter family");
        Ok(root + shards)
    }
}
