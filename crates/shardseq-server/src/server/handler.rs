use crate::server::config::ServerConfig;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use rand::Rng;
use serde::Deserialize;
use shardseq::{
    AllocStatus, AllocatorConfig, CounterKey, MemoryStore, ShardedAllocator, Store,
};
use std::collections::BTreeSet;
use std::fmt::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter exercised by `/scale`.
pub const SCALE_COUNTER: &str = "scale";
/// Request size used by `/scale` when none is given.
pub const DEFAULT_SCALE_SIZE: u64 = 10;
/// Operations run by `/sequential` when none is given.
pub const DEFAULT_SEQUENTIAL_OPS: usize = 1_000;
/// Upper bound on operations per `/sequential` request.
pub const MAX_SEQUENTIAL_OPS: usize = 100_000;
/// Largest count drawn per `/sequential` operation.
const SEQUENTIAL_MAX_COUNT: u64 = 9;
/// Attempts the shared store gives a contended scope.
const STORE_MAX_ATTEMPTS: usize = 1_024;

/// State shared by all handlers. Every allocator draws from the same store.
#[derive(Clone)]
pub struct AppState {
    store: Arc<MemoryStore>,
    config: Arc<ServerConfig>,
    runs: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            store: Arc::new(MemoryStore::new().with_max_attempts(STORE_MAX_ATTEMPTS)),
            config: Arc::new(config),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scale", get(scale))
        .route("/sequential", get(sequential))
        .route("/counters/{name}", delete(delete_counter))
        .with_state(state)
}

/// A failed request, rendered as a plain-text response.
#[derive(Debug)]
pub enum HandlerError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            Self::Internal(err) => {
                tracing::error!("request failed: {err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")).into_response()
            }
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct ScaleParams {
    chunk: Option<u64>,
    shards: Option<u64>,
    size: Option<u64>,
}

#[tracing::instrument(skip(state))]
async fn scale(
    State(state): State<AppState>,
    Query(params): Query<ScaleParams>,
) -> Result<String, HandlerError> {
    let size = params.size.unwrap_or(DEFAULT_SCALE_SIZE);
    if size > state.config.max_request_size {
        return Err(HandlerError::BadRequest(format!(
            "size {size} exceeds the limit of {}",
            state.config.max_request_size
        )));
    }

    let mut config = AllocatorConfig::new(SCALE_COUNTER)
        .with_chunk(params.chunk.unwrap_or(state.config.default_chunk));
    if let Some(shards) = params.shards {
        config = config.with_shards(shards);
    }
    let ops = state.config.ops_per_request;
    let store = Arc::clone(&state.store);

    let report = tokio::task::spawn_blocking(move || run_scale(store, config, size, ops)).await??;
    Ok(report)
}

/// Runs `ops` random allocation calls of up to `size` ids each and describes
/// every outcome, one line per call.
pub fn run_scale(
    store: Arc<MemoryStore>,
    config: AllocatorConfig,
    size: u64,
    ops: usize,
) -> anyhow::Result<String> {
    let alloc = ShardedAllocator::new(store, config)?;
    let mut rng = rand::rng();
    let mut out = String::new();

    for _ in 0..ops {
        let count = rng.random_range(0..=size);
        writeln!(out, "Trying to get {count} ids.")?;
        match rng.random_range(0..3) {
            0 => match alloc.next(count)? {
                AllocStatus::Ready { value } => {
                    write!(out, "Used next() to get")?;
                    for run in value.grants() {
                        write!(out, " {} {}", run.low, run.high)?;
                    }
                    writeln!(out)?;
                }
                AllocStatus::Exhausted => writeln!(out, "next() found the counter exhausted")?,
            },
            1 => match alloc.reserve(count)? {
                AllocStatus::Ready { value } => {
                    writeln!(out, "Used reserve() to get {} {}", value.low, value.high)?;
                }
                AllocStatus::Exhausted => writeln!(out, "reserve() found the counter exhausted")?,
            },
            _ => match alloc.one()? {
                AllocStatus::Ready { value } => writeln!(out, "Used one() to get {value}")?,
                AllocStatus::Exhausted => writeln!(out, "one() found the counter exhausted")?,
            },
        }
    }

    Ok(out)
}

#[derive(Debug, Deserialize)]
pub struct SequentialParams {
    ops: Option<usize>,
    chunk: Option<u64>,
}

#[tracing::instrument(skip(state))]
async fn sequential(
    State(state): State<AppState>,
    Query(params): Query<SequentialParams>,
) -> Result<String, HandlerError> {
    let ops = params.ops.unwrap_or(DEFAULT_SEQUENTIAL_OPS);
    if ops > MAX_SEQUENTIAL_OPS {
        return Err(HandlerError::BadRequest(format!(
            "ops {ops} exceeds the limit of {MAX_SEQUENTIAL_OPS}"
        )));
    }

    let run = state.runs.fetch_add(1, Ordering::Relaxed);
    let config = AllocatorConfig::new(format!("sequential-{run}"))
        .with_chunk(params.chunk.unwrap_or(state.config.default_chunk));
    let store = Arc::clone(&state.store);

    let report = tokio::task::spawn_blocking(move || run_sequential(store, config, ops)).await??;
    if !report.duplicates.is_empty() {
        tracing::error!(duplicates = report.duplicates.len(), "ids were issued twice");
    }
    Ok(report.to_string())
}

/// What a `/sequential` run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequentialReport {
    pub ops: usize,
    pub issued: usize,
    /// Ids returned by more than one call.
    pub duplicates: Vec<u64>,
    /// Ids below the highest one issued that nobody received yet. These are
    /// still parked in shard windows.
    pub missing: Vec<u64>,
}

impl fmt::Display for SequentialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Issued {} ids in {} calls.", self.issued, self.ops)?;
        for id in &self.duplicates {
            writeln!(f, "ERROR: Got id twice {id}")?;
        }
        for id in &self.missing {
            writeln!(f, "Missing {id}")?;
        }
        Ok(())
    }
}

/// Runs `ops` random allocation calls against a fresh counter family, checks
/// the issued ids, then deletes the family.
pub fn run_sequential(
    store: Arc<MemoryStore>,
    config: AllocatorConfig,
    ops: usize,
) -> anyhow::Result<SequentialReport> {
    let alloc = ShardedAllocator::new(store, config)?;
    let mut rng = rand::rng();
    let mut seen = BTreeSet::new();
    let mut duplicates = Vec::new();
    let mut issued = 0;

    for _ in 0..ops {
        let count = rng.random_range(0..=SEQUENTIAL_MAX_COUNT);
        let ids: Vec<u64> = match rng.random_range(0..3) {
            0 => alloc
                .next(count)?
                .ready()
                .map(|ids| ids.into_iter().collect())
                .unwrap_or_default(),
            1 => alloc
                .reserve(count)?
                .ready()
                .map(|grant| grant.into_iter().collect())
                .unwrap_or_default(),
            _ => alloc.one()?.ready().into_iter().collect(),
        };
        issued += ids.len();
        for id in ids {
            if !seen.insert(id) {
                duplicates.push(id);
            }
        }
    }

    let missing = match seen.last() {
        Some(&highest) => (alloc.config().min()..highest)
            .filter(|id| !seen.contains(id))
            .collect(),
        None => Vec::new(),
    };
    alloc.delete()?;

    Ok(SequentialReport {
        ops,
        issued,
        duplicates,
        missing,
    })
}

#[tracing::instrument(skip(state))]
async fn delete_counter(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, HandlerError> {
    let store = Arc::clone(&state.store);
    let removed = tokio::task::spawn_blocking(move || delete_family(store, name)).await??;
    Ok(format!("Deleted {removed} counters\n"))
}

/// Deletes the counter family rooted at `name`, returning how many counters
/// were removed.
///
/// Goes straight to the store: shards left behind by an earlier deletion are
/// removed even when the root is already gone, and no root is recreated.
pub fn delete_family(store: Arc<MemoryStore>, name: String) -> Result<usize, HandlerError> {
    let Some(root) = CounterKey::try_root(name.as_str()) else {
        return Err(HandlerError::BadRequest(format!(
            "{name:?} is not a valid counter name"
        )));
    };
    let (start, end) = root.shard_range();
    let removed = usize::from(store.delete(&root)?) + store.delete_range(&start, &end)?;
    if removed == 0 {
        return Err(HandlerError::NotFound(format!("no counter named {name:?}")));
    }
    tracing::info!(%root, removed, "deleted counter family");
    Ok(removed)
}
