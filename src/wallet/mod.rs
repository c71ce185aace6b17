pub mod sync;
pub mod types;

pub use sync::ConnectionStateSynchronizer;
pub use types::*;
