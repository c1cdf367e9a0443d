use crate::{
    AllocStatus, AllocatorConfig, Counter, CounterKey, Error, Grant, Ids, MemoryStore, MemoryStoreError,
    Options, RandSource, ShardedAllocator, Store,
};
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::scope;

/// Always picks the same shard.
#[derive(Debug, Clone, Copy)]
struct FixedShard(u64);

impl RandSource for FixedShard {
    fn rand_index(&self, _upper: u64) -> u64 {
        self.0
    }
}

trait AllocStatusExt<T> {
    fn unwrap_ready(self) -> T;
}

impl<T> AllocStatusExt<T> for AllocStatus<T> {
    fn unwrap_ready(self) -> T {
        match self {
            Self::Ready { value } => value,
            Self::Exhausted => panic!("unexpected exhaustion"),
        }
    }
}

type Allocator<R = FixedShard> = ShardedAllocator<MemoryStore, R>;

fn allocator(config: AllocatorConfig) -> Allocator {
    ShardedAllocator::with_rng(Arc::new(MemoryStore::new()), config, FixedShard(1)).unwrap()
}

fn state(alloc: &Allocator, key: &CounterKey) -> Option<Counter> {
    alloc.counter_state(key).unwrap()
}

fn issued(status: AllocStatus<Ids>) -> Vec<u64> {
    status.unwrap_ready().into_iter().collect()
}

#[test]
fn shard_refills_then_serves_from_window() {
    let alloc = allocator(
        AllocatorConfig::new("test")
            .with_chunk(5)
            .with_shards(3)
            .with_max(100)
            .with_direct(false),
    );
    let shard = alloc.root().shard(1);

    assert_eq!(alloc.reserve(5).unwrap().unwrap_ready(), Grant::new(0, 5));
    assert_eq!(state(&alloc, &shard), Some(Counter::new(5, 10)));
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(10, 100)));

    assert_eq!(alloc.reserve(3).unwrap().unwrap_ready(), Grant::new(5, 8));
    assert_eq!(state(&alloc, &shard), Some(Counter::new(8, 10)));

    // Short grant: the window only has two ids left and no refill happens.
    assert_eq!(alloc.reserve(4).unwrap().unwrap_ready(), Grant::new(8, 10));
    assert_eq!(state(&alloc, &shard), Some(Counter::new(10, 10)));
}

#[test]
fn zero_count_touches_nothing() {
    let alloc = allocator(AllocatorConfig::new("test").with_max(10));
    assert_eq!(alloc.reserve(0).unwrap(), AllocStatus::Ready { value: Grant::EMPTY });
    assert_eq!(alloc.next(0).unwrap(), AllocStatus::Ready { value: Ids::EMPTY });
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(0, 10)));
    assert_eq!(alloc.store().len().unwrap(), 1);
}

#[test]
fn root_creation_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let first = ShardedAllocator::new(
        Arc::clone(&store),
        AllocatorConfig::new("test").with_min(5).with_max(50),
    )
    .unwrap();
    first.reserve(3).unwrap().unwrap_ready();
    let before = first.root_state().unwrap();

    let second = ShardedAllocator::new(
        Arc::clone(&store),
        AllocatorConfig::new("test").with_min(1_000).with_max(2_000),
    )
    .unwrap();
    assert_eq!(second.root_state().unwrap(), before);
    assert_eq!(before, Some(Counter::new(8, 50)));
}

#[test]
fn rejects_invalid_configuration() {
    let store = Arc::new(MemoryStore::new());
    let err = ShardedAllocator::new(Arc::clone(&store), AllocatorConfig::new("a__b")).unwrap_err();
    assert_eq!(
        err,
        Error::InvalidName {
            name: "a__b".to_owned()
        }
    );

    let err = ShardedAllocator::new(Arc::clone(&store), AllocatorConfig::new("")).unwrap_err();
    assert!(matches!(err, Error::InvalidName { .. }));

    let err = ShardedAllocator::new(
        Arc::clone(&store),
        AllocatorConfig::new("ok").with_min(10).with_max(5),
    )
    .unwrap_err();
    assert_eq!(err, Error::InvalidBounds { min: 10, max: 5 });
    assert!(store.is_empty().unwrap());
}

#[test]
fn unsharded_allocation_covers_the_whole_window() {
    let alloc = allocator(AllocatorConfig::new("test").with_shards(0).with_min(10).with_max(53));
    let mut seen = Vec::new();
    let mut rng = rand::rng();
    loop {
        let count = rng.random_range(1..=7);
        let status: AllocStatus<Vec<u64>> = match rng.random_range(0..3) {
            0 => alloc.reserve(count).unwrap().map(|g| g.into_iter().collect()),
            1 => alloc.next(count).unwrap().map(|ids| ids.into_iter().collect()),
            _ => alloc.one().unwrap().map(|id| vec![id]),
        };
        match status {
            AllocStatus::Ready { value } => seen.extend(value),
            // A guaranteed request larger than what is left gives up.
            AllocStatus::Exhausted if !alloc.root_state().unwrap().unwrap().is_exhausted() => {}
            AllocStatus::Exhausted => break,
        }
    }
    assert_eq!(seen, (10..53).collect::<Vec<_>>());
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(53, 53)));
}

#[test]
fn guaranteed_next_tops_up_from_root() {
    let alloc = allocator(
        AllocatorConfig::new("test")
            .with_chunk(2)
            .with_shards(1)
            .with_max(100)
            .with_direct(false),
    );
    let shard = alloc.root().shard(1);

    assert_eq!(issued(alloc.next(1).unwrap()), vec![0]);
    assert_eq!(state(&alloc, &shard), Some(Counter::new(1, 3)));

    // Two ids come from the window, three more from a fresh refill.
    assert_eq!(issued(alloc.next(5).unwrap()), vec![1, 2, 3, 4, 5]);
    assert_eq!(state(&alloc, &shard), Some(Counter::new(6, 8)));
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(8, 100)));
}

#[test]
fn top_up_may_be_disjoint() {
    let alloc = allocator(
        AllocatorConfig::new("test")
            .with_chunk(2)
            .with_shards(2)
            .with_max(100)
            .with_direct(false),
    );
    // Shard 1 holds [1, 3); shard 2 then takes [3, 6) from the root.
    alloc.next(1).unwrap().unwrap_ready();
    alloc.reserve_with(1, Options::new().on_shard(2)).unwrap().unwrap_ready();

    let ids = alloc.next(4).unwrap().unwrap_ready();
    assert_eq!(ids.len(), 4);
    assert_eq!(ids.first(), Grant::new(1, 3));
    assert_eq!(ids.top_up(), Some(Grant::new(6, 8)));
    assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 2, 6, 7]);
}

#[test]
fn failed_top_up_restores_first_grant() {
    let alloc = allocator(
        AllocatorConfig::new("test")
            .with_chunk(2)
            .with_shards(2)
            .with_max(4)
            .with_direct(false),
    );
    let shard = alloc.root().shard(1);
    assert_eq!(alloc.one().unwrap().unwrap_ready(), 0);
    // Drain the root through another shard.
    assert_eq!(
        alloc.one_with(Options::new().on_shard(2)).unwrap().unwrap_ready(),
        3
    );
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(4, 4)));

    assert_eq!(alloc.next(5).unwrap(), AllocStatus::Exhausted);
    assert_eq!(state(&alloc, &shard), Some(Counter::new(1, 3)));
    assert_eq!(alloc.reserve(5).unwrap().unwrap_ready(), Grant::new(1, 3));
}

#[test]
fn failed_top_up_keeps_ids_moved_from_root() {
    let alloc = allocator(
        AllocatorConfig::new("test")
            .with_chunk(5)
            .with_shards(1)
            .with_max(2)
            .with_direct(false),
    );
    let shard = alloc.root().shard(1);

    // The first grant refills the empty shard with everything the root has,
    // then the top-up finds the root empty.
    assert_eq!(alloc.next(4).unwrap(), AllocStatus::Exhausted);
    assert_eq!(state(&alloc, &shard), Some(Counter::new(0, 2)));
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(2, 2)));
    assert_eq!(issued(alloc.next_with(4, false, Options::new()).unwrap()), vec![0, 1]);
}

#[test]
fn partial_top_up_returns_what_was_issued() {
    let alloc = allocator(
        AllocatorConfig::new("test")
            .with_chunk(2)
            .with_shards(1)
            .with_max(6)
            .with_direct(false),
    );
    alloc.next(1).unwrap().unwrap_ready();
    assert_eq!(issued(alloc.next(6).unwrap()), vec![1, 2, 3, 4, 5]);
    assert_eq!(alloc.next(1).unwrap(), AllocStatus::Exhausted);
}

#[test]
fn best_effort_next_is_one_contiguous_run() {
    let alloc = allocator(
        AllocatorConfig::new("test")
            .with_chunk(2)
            .with_shards(1)
            .with_max(100)
            .with_direct(false),
    );
    alloc.next(1).unwrap().unwrap_ready();
    assert_eq!(
        issued(alloc.next_with(5, false, Options::new()).unwrap()),
        vec![1, 2]
    );
}

#[test]
fn huge_batches_are_not_materialized() {
    let alloc = allocator(
        AllocatorConfig::new("test")
            .with_chunk(2)
            .with_shards(1)
            .with_direct(false),
    );
    alloc.next(1).unwrap().unwrap_ready();

    // The window gives [1, 3); the top-up drains the rest of the root.
    let ids = alloc.next(u64::MAX).unwrap().unwrap_ready();
    assert_eq!(ids.first(), Grant::new(1, 3));
    assert_eq!(ids.top_up(), Some(Grant::new(3, u64::MAX)));
    assert_eq!(ids.len(), u64::MAX - 1);
    assert_eq!(ids.into_iter().take(3).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(u64::MAX, u64::MAX)));
}

#[test]
fn out_of_range_shard_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let alloc = ShardedAllocator::new(
        Arc::clone(&store),
        AllocatorConfig::new("test").with_shards(3).with_max(100),
    )
    .unwrap();

    for index in [0, 4] {
        assert_eq!(
            alloc.one_with(Options::new().on_shard(index)),
            Err(Error::InvalidShard { index, shards: 3 })
        );
        assert_eq!(
            alloc.next_with(2, true, Options::new().on_shard(index)),
            Err(Error::InvalidShard { index, shards: 3 })
        );
    }
    // Only the root exists and it is untouched.
    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(0, 100)));

    assert_eq!(
        alloc.one_with(Options::new().on_shard(3)).unwrap().unwrap_ready(),
        0
    );
}

#[test]
fn direct_requests_skip_shards() {
    let alloc = allocator(AllocatorConfig::new("test").with_chunk(4).with_max(100));
    assert_eq!(alloc.reserve(10).unwrap().unwrap_ready(), Grant::new(0, 10));
    assert_eq!(alloc.root_state().unwrap(), Some(Counter::new(10, 100)));
    assert_eq!(alloc.store().len().unwrap(), 1);

    // Raising the chunk for one call keeps the same request on a shard.
    assert_eq!(
        alloc
            .reserve_with(10, Options::new().with_chunk(20))
            .unwrap()
            .unwrap_ready(),
        Grant::new(10, 20)
    );
    assert_eq!(state(&alloc, &alloc.root().shard(1)), Some(Counter::new(20, 40)));
}

#[test]
fn never_grants_beyond_max() {
    let alloc = allocator(AllocatorConfig::new("test").with_chunk(50).with_max(30));
    let grant = alloc.reserve(u64::MAX).unwrap().unwrap_ready();
    assert_eq!(grant, Grant::new(0, 30));
    assert_eq!(alloc.reserve(1).unwrap(), AllocStatus::Exhausted);
    assert_eq!(alloc.one().unwrap(), AllocStatus::Exhausted);
}

#[test]
fn delete_removes_family_and_recreation_restarts() {
    let store = Arc::new(MemoryStore::new());
    let config = AllocatorConfig::new("test").with_chunk(2).with_shards(3);
    let alloc = ShardedAllocator::new(Arc::clone(&store), config.clone()).unwrap();
    for shard in 1..=3 {
        alloc.one_with(Options::new().on_shard(shard)).unwrap().unwrap_ready();
    }
    // A shard outside the configured range is still part of the family.
    store.put(&alloc.root().shard(9), Counter::new(7, 9)).unwrap();
    let other = ShardedAllocator::new(Arc::clone(&store), AllocatorConfig::new("test_b")).unwrap();
    other.one().unwrap().unwrap_ready();

    assert_eq!(alloc.delete().unwrap(), 5);
    let names: Vec<String> = store
        .counters()
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert!(names.iter().all(|name| name.starts_with("test_b")));

    // With the root gone the family is exhausted until it is recreated.
    assert_eq!(alloc.one().unwrap(), AllocStatus::Exhausted);
    let again = ShardedAllocator::new(Arc::clone(&store), config).unwrap();
    assert_eq!(again.root_state().unwrap(), Some(Counter::new(0, u64::MAX)));
}

#[test]
fn caller_managed_scope() {
    let store = Arc::new(MemoryStore::new());
    let alloc = ShardedAllocator::with_rng(
        Arc::clone(&store),
        AllocatorConfig::new("test").with_chunk(4).with_shards(2),
        FixedShard(2),
    )
    .unwrap();

    let target = alloc.route(3, &Options::new()).unwrap();
    assert_eq!(target.key().as_str(), "test__2");
    let ids: Result<_, Error<MemoryStoreError>> = store.transact(&target.scope(), |txn| {
        let ids = alloc.next_in(txn, &target, 3, true)?;
        txn.put(&CounterKey::try_root("unrelated").unwrap(), Counter::EMPTY)
            .map(|()| ids)
            .map_err(Error::Store)
    });
    // The scope only declared the shard and its root.
    assert_eq!(
        ids,
        Err(Error::Store(MemoryStoreError::UndeclaredKey {
            name: "unrelated".to_owned()
        }))
    );
    assert_eq!(store.get(&alloc.root().shard(2)).unwrap(), None);

    let id = store
        .transact(&target.scope(), |txn| alloc.one_in(txn, &target))
        .unwrap();
    assert_eq!(id, AllocStatus::Ready { value: 0 });
}

#[test]
fn store_failures_propagate() {
    let store = Arc::new(MemoryStore::new().with_max_scope(1));
    let alloc = ShardedAllocator::with_rng(
        Arc::clone(&store),
        AllocatorConfig::new("test").with_chunk(4).with_shards(2),
        FixedShard(1),
    )
    .unwrap();
    assert_eq!(
        alloc.one().unwrap_err(),
        Error::Store(MemoryStoreError::ScopeTooLarge {
            declared: 2,
            limit: 1
        })
    );
    // Root-only scopes still fit.
    assert_eq!(alloc.reserve(4).unwrap().unwrap_ready(), Grant::new(0, 4));
}

#[test]
fn concurrent_callers_never_share_ids_and_leave_no_gaps() {
    const THREADS: usize = 8;
    const MAX: u64 = 5_000;

    let store = Arc::new(MemoryStore::new().with_max_attempts(usize::MAX));
    let alloc = ShardedAllocator::new(
        Arc::clone(&store),
        AllocatorConfig::new("test").with_chunk(6).with_max(MAX),
    )
    .unwrap();
    let shards = alloc.config().shards();
    let seen = Mutex::new(Vec::new());

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut rng = rand::rng();
                let mut local = Vec::new();
                loop {
                    let count = rng.random_range(1..=9);
                    let status: AllocStatus<Vec<u64>> = match rng.random_range(0..3) {
                        0 => alloc.reserve(count).unwrap().map(|g| g.into_iter().collect()),
                        1 => alloc.next(count).unwrap().map(|ids| ids.into_iter().collect()),
                        _ => alloc.one().unwrap().map(|id| vec![id]),
                    };
                    match status {
                        AllocStatus::Ready { value } => local.extend(value),
                        AllocStatus::Exhausted => break,
                    }
                }
                seen.lock().unwrap().extend(local);
            });
        }
    });

    let mut seen = seen.into_inner().unwrap();
    // Whatever the workers left parked in shards is still issuable.
    for shard in 1..=shards {
        while let AllocStatus::Ready { value } =
            alloc.reserve_with(5, Options::new().on_shard(shard)).unwrap()
        {
            seen.extend(value);
        }
    }

    let unique: HashSet<u64> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len(), "an id was issued twice");
    seen.sort_unstable();
    assert_eq!(seen, (0..MAX).collect::<Vec<_>>());
}
