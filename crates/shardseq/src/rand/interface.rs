/// A source of shard indices.
///
/// This abstraction lets the router pick shards from a real random source, or
/// from a scripted one in tests.
///
/// # Example
/// ```
/// use shardseq::RandSource;
///
/// struct AlwaysFirst;
/// impl RandSource for AlwaysFirst {
///     fn rand_index(&self, _upper: u64) -> u64 {
///         1
///     }
/// }
///
/// assert_eq!(AlwaysFirst.rand_index(8), 1);
/// ```
pub trait RandSource {
    /// Returns an integer drawn uniformly from `1..=upper`.
    ///
    /// Callers never pass `upper == 0`.
    fn rand_index(&self, upper: u64) -> u64;
}
