//! Async runtime that owns the simulation
//!
//! A single tokio task holds [`SimState`] and is its only writer. It selects
//! over the frame interval, incoming commands and finished collaborator
//! effects. Events go out on a broadcast channel; the latest snapshot is
//! published on a watch channel.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::core::error::{Result, SimError};
use crate::core::types::Millis;
use crate::simulation::clock::SimulationClock;
use crate::simulation::commands::{apply_command, SimCommand};
use crate::simulation::effects::{apply_outcome, Collaborators, EffectOutcome};
use crate::simulation::events::SimulationEvent;
use crate::simulation::state::{SimState, WorldSnapshot};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 1024;

/// Messages accepted by the runtime task
pub enum RuntimeCommand {
    Apply {
        command: SimCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Cloneable façade over the runtime's channels
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: mpsc::Sender<RuntimeCommand>,
    event_tx: broadcast::Sender<SimulationEvent>,
    snapshot_rx: watch::Receiver<WorldSnapshot>,
}

impl RuntimeHandle {
    /// Apply a command and wait for it to be accepted or rejected
    pub async fn send(&self, command: SimCommand) -> Result<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(RuntimeCommand::Apply { command, reply })
            .await
            .map_err(|_| SimError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SimError::ChannelClosed)?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimulationEvent> {
        self.event_tx.subscribe()
    }

    /// Latest committed snapshot
    pub fn snapshot(&self) -> WorldSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Ask the runtime to stop; in-flight effects are aborted
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(RuntimeCommand::Shutdown)
            .await
            .map_err(|_| SimError::ChannelClosed)
    }
}

pub struct SimulationRuntime {
    state: SimState,
    clock: SimulationClock,
    collaborators: Collaborators,
    command_rx: mpsc::Receiver<RuntimeCommand>,
    event_tx: broadcast::Sender<SimulationEvent>,
    snapshot_tx: watch::Sender<WorldSnapshot>,
    effects: JoinSet<EffectOutcome>,
    started: Instant,
}

impl SimulationRuntime {
    pub fn new(state: SimState, collaborators: Collaborators) -> (Self, RuntimeHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let clock = SimulationClock::new(&state.config.clock, 0);

        let handle = RuntimeHandle {
            command_tx,
            event_tx: event_tx.clone(),
            snapshot_rx,
        };
        let runtime = Self {
            state,
            clock,
            collaborators,
            command_rx,
            event_tx,
            snapshot_tx,
            effects: JoinSet::new(),
            started: Instant::now(),
        };
        (runtime, handle)
    }

    /// Spawn the runtime on the current tokio runtime
    pub fn spawn(state: SimState, collaborators: Collaborators) -> (RuntimeHandle, JoinHandle<()>) {
        let (runtime, handle) = Self::new(state, collaborators);
        let task = tokio::spawn(runtime.run());
        (handle, task)
    }

    fn now(&self) -> Millis {
        self.started.elapsed().as_millis() as Millis
    }

    pub async fn run(mut self) {
        let frame = Duration::from_millis(self.state.config.clock.min_frame_delta_ms.max(1));
        let mut frames = tokio::time::interval(frame);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Simulation runtime started ({} agents)", self.state.roster.len());

        loop {
            tokio::select! {
                _ = frames.tick() => {
                    let now = self.now();
                    let events = self.clock.advance(&mut self.state, now);
                    self.publish(events);
                    self.dispatch_effects();
                    self.snapshot_tx.send_replace(self.state.snapshot());
                }
                command = self.command_rx.recv() => match command {
                    Some(RuntimeCommand::Apply { command, reply }) => {
                        let now = self.now();
                        let result = apply_command(&mut self.state, command, now).map(|events| self.publish(events));
                        self.dispatch_effects();
                        self.snapshot_tx.send_replace(self.state.snapshot());
                        let _ = reply.send(result);
                    }
                    Some(RuntimeCommand::Shutdown) | None => break,
                },
                Some(joined) = self.effects.join_next(), if !self.effects.is_empty() => {
                    match joined {
                        Ok(outcome) => {
                            let now = self.now();
                            let events = apply_outcome(&mut self.state, outcome, now);
                            self.publish(events);
                        }
                        Err(e) => tracing::warn!("Effect task failed to join: {}", e),
                    }
                }
            }
        }

        self.shutdown();
    }

    fn publish(&self, events: Vec<SimulationEvent>) {
        for event in events {
            // No subscribers is not an error
            let _ = self.event_tx.send(event);
        }
    }

    /// Hand queued requests to the collaborators without awaiting them
    fn dispatch_effects(&mut self) {
        let limit = self.state.config.effects.max_in_flight;
        for request in self.state.drain_outbox() {
            if self.effects.len() >= limit {
                tracing::warn!(
                    "Dropping {} for {}: {} effects already in flight",
                    request.label(),
                    request.agent(),
                    limit
                );
                continue;
            }
            let collaborators = self.collaborators.clone();
            self.effects.spawn(async move { collaborators.perform(request).await });
        }
    }

    fn shutdown(&mut self) {
        self.effects.abort_all();
        self.state.movement.walking_near_player = false;
        let _ = self.event_tx.send(SimulationEvent::WalkingAudio { active: false });
        self.snapshot_tx.send_replace(self.state.snapshot());
        tracing::info!("Simulation runtime stopped at tick {}", self.state.tick);
    }
}
