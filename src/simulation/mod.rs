pub mod action_select;
pub mod clock;
pub mod commands;
pub mod decision;
pub mod effects;
pub mod events;
pub mod greeting;
pub mod interaction;
pub mod runtime;
pub mod schedule;
pub mod state;
pub mod steering;
pub mod stuck;
pub mod tick;

pub use action_select::{select_action, Decision, SelectionContext};
pub use clock::SimulationClock;
pub use commands::{apply_command, SimCommand};
pub use decision::{run_major_loop, run_step_loop};
pub use effects::{apply_outcome, Collaborators, EffectRequest};
pub use events::{AbandonReason, SimulationEvent};
pub use greeting::run_greeter;
pub use runtime::{RuntimeHandle, SimulationRuntime};
pub use state::{PreferredActivity, SimState, WorldSnapshot};
pub use tick::run_movement_tick;
