use rand::{Rng, rng};

use crate::rand::RandSource;

/// A [`RandSource`] backed by the thread-local RNG (`rand::rng()`).
///
/// The type is zero-sized and does not store the RNG; it reaches for the
/// calling thread's generator on each call, so it can be shared freely across
/// threads without contention.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadRandom;

impl RandSource for ThreadRandom {
    fn rand_index(&self, upper: u64) -> u64 {
        rng().random_range(1..=upper.max(1))
    }
}
