/// Refill size used when none is configured.
pub const DEFAULT_CHUNK: u64 = 2;

/// The shard count derived from a chunk size when none is configured:
/// `chunk + floor(log2(chunk))`, or `0` for a zero chunk.
///
/// A shard per chunk slot keeps per-shard refills rare; the logarithmic extra
/// absorbs several shards draining at the same moment.
///
/// # Example
/// ```
/// use shardseq::default_shards;
///
/// assert_eq!(default_shards(0), 0);
/// assert_eq!(default_shards(1), 1);
/// assert_eq!(default_shards(8), 11);
/// assert_eq!(default_shards(100), 106);
/// ```
pub const fn default_shards(chunk: u64) -> u64 {
    if chunk == 0 {
        0
    } else {
        chunk.saturating_add(chunk.ilog2() as u64)
    }
}

/// Construction parameters for a [`ShardedAllocator`].
///
/// # Example
/// ```
/// use shardseq::AllocatorConfig;
///
/// let config = AllocatorConfig::new("orders")
///     .with_chunk(16)
///     .with_min(1_000)
///     .with_max(1_000_000);
/// assert_eq!(config.shards(), 20);
/// assert!(config.direct());
/// ```
///
/// [`ShardedAllocator`]: crate::ShardedAllocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    name: String,
    chunk: u64,
    shards: Option<u64>,
    min: u64,
    max: u64,
    direct: bool,
}

impl AllocatorConfig {
    /// Creates a configuration for the counter family `name` with defaults:
    /// chunk [`DEFAULT_CHUNK`], derived shard count, window `[0, u64::MAX)`,
    /// direct mode on.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunk: DEFAULT_CHUNK,
            shards: None,
            min: 0,
            max: u64::MAX,
            direct: true,
        }
    }

    /// Sets the number of extra ids a shard requests from the root when it
    /// runs dry. Larger chunks take load off the root at the price of wider
    /// gaps between concurrently issued ids.
    #[must_use]
    pub const fn with_chunk(mut self, chunk: u64) -> Self {
        self.chunk = chunk;
        self
    }

    /// Sets the shard count explicitly. `0` disables sharding: every request
    /// goes to the root.
    #[must_use]
    pub const fn with_shards(mut self, shards: u64) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Sets the first id of a newly created root. Ignored when the root
    /// already exists.
    #[must_use]
    pub const fn with_min(mut self, min: u64) -> Self {
        self.min = min;
        self
    }

    /// Sets the exclusive upper bound of a newly created root. Ignored when
    /// the root already exists.
    #[must_use]
    pub const fn with_max(mut self, max: u64) -> Self {
        self.max = max;
        self
    }

    /// Enables or disables routing requests of at least one chunk straight to
    /// the root.
    #[must_use]
    pub const fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// The root counter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured chunk size.
    pub const fn chunk(&self) -> u64 {
        self.chunk
    }

    /// The effective shard count, derived from the chunk size unless set
    /// explicitly.
    pub const fn shards(&self) -> u64 {
        match self.shards {
            Some(shards) => shards,
            None => default_shards(self.chunk),
        }
    }

    /// The lower bound of a newly created root.
    pub const fn min(&self) -> u64 {
        self.min
    }

    /// The exclusive upper bound of a newly created root.
    pub const fn max(&self) -> u64 {
        self.max
    }

    /// Whether large requests bypass the shards.
    pub const fn direct(&self) -> bool {
        self.direct
    }
}

/// Per-call overrides for routing and refill size.
///
/// # Example
/// ```
/// use shardseq::Options;
///
/// // Draw from shard 3 and refill it with 32 extra ids if it runs dry.
/// let options = Options::new().on_shard(3).with_chunk(32);
/// assert_eq!(options.shard, Some(3));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Pin the request to this shard instead of picking one at random.
    pub shard: Option<u64>,
    /// Override the configured chunk size for this call.
    pub chunk: Option<u64>,
}

impl Options {
    /// No overrides.
    pub const fn new() -> Self {
        Self {
            shard: None,
            chunk: None,
        }
    }

    /// Pins the request to shard `index`.
    #[must_use]
    pub const fn on_shard(mut self, index: u64) -> Self {
        self.shard = Some(index);
        self
    }

    /// Overrides the chunk size.
    #[must_use]
    pub const fn with_chunk(mut self, chunk: u64) -> Self {
        self.chunk = Some(chunk);
        self
    }
}
