pub mod sparse_hash;

pub use sparse_hash::{IndexedAgent, SpatialIndex};
