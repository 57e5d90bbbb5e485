//! Static world: geometry, interactive objects, collision, and loading

pub mod collision;
pub mod demo;
pub mod geometry;
pub mod loader;
pub mod objects;

pub use collision::CollisionValidator;
pub use geometry::{WorldGeometry, Zone};
pub use loader::{load_from_file, load_from_json, WorldDefinition};
pub use objects::{InteractiveObject, ObjectCatalog};
