//! Plaza - autonomous-agent simulation core for a 2D social sandbox

pub mod core;
pub mod entity;
pub mod llm;
pub mod simulation;
pub mod spatial;
pub mod world;
