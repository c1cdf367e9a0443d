mod config;
mod protocol;
mod router;
mod sharded;
#[cfg(all(test, feature = "memory"))]
mod tests;

pub use config::*;
pub use router::*;
pub use sharded::*;
