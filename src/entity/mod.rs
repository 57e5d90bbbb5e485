pub mod agent;
pub mod memory;
pub mod tasks;

pub use agent::{cooldown_elapsed, Agent, Cooldowns, Disposition, Greeting};
pub use memory::{MemoryKind, MemoryRecord, MemoryStream};
pub use tasks::{Task, TaskKind};
