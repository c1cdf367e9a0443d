mod ids;
mod key;
mod window;

pub use ids::*;
pub use key::*;
pub use window::*;
