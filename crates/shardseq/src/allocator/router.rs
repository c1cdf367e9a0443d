#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{allocator::Options, counter::CounterKey, rand::RandSource};

/// The counter a request was routed to, with the refill size to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    key: CounterKey,
    chunk: u64,
}

impl Target {
    /// The selected counter.
    pub const fn key(&self) -> &CounterKey {
        &self.key
    }

    /// Extra ids to request from the root if the counter runs dry.
    pub const fn chunk(&self) -> u64 {
        self.chunk
    }

    /// Returns `true` if the request bypasses the shards.
    pub fn is_root(&self) -> bool {
        self.key.is_root()
    }

    /// The keys an atomic scope must declare to serve this target: the
    /// counter itself and, for a shard, its root.
    pub fn scope(&self) -> Vec<CounterKey> {
        match self.key.parent() {
            Some(root) => vec![self.key.clone(), root],
            None => vec![self.key.clone()],
        }
    }
}

/// Decides which counter of a family serves a request.
///
/// - With zero shards every request goes to the root.
/// - In direct mode, requests of at least one chunk go to the root: a shard
///   would have to refill from it anyway.
/// - Everything else goes to the pinned shard, or to one drawn uniformly from
///   `1..=shards`. A pinned shard outside that range is refused.
#[derive(Debug, Clone)]
pub struct ShardRouter<R> {
    root: CounterKey,
    chunk: u64,
    shards: u64,
    direct: bool,
    rng: R,
}

impl<R: RandSource> ShardRouter<R> {
    /// Creates a router for the family rooted at `root`.
    pub const fn new(root: CounterKey, chunk: u64, shards: u64, direct: bool, rng: R) -> Self {
        Self {
            root,
            chunk,
            shards,
            direct,
            rng,
        }
    }

    /// The root of the family this router serves.
    pub const fn root(&self) -> &CounterKey {
        &self.root
    }

    /// Routes a request for `count` ids. Returns `None` if the request must
    /// go to a shard and `options` pins one outside `1..=shards`.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn select(&self, count: u64, options: &Options) -> Option<Target> {
        let chunk = options.chunk.unwrap_or(self.chunk);
        let key = if self.shards == 0 || (self.direct && count >= chunk) {
            self.root.clone()
        } else {
            let index = match options.shard {
                Some(index) if (1..=self.shards).contains(&index) => index,
                Some(_) => return None,
                None => self.rng.rand_index(self.shards),
            };
            self.root.shard(index)
        };
        Some(Target { key, chunk })
    }
}
