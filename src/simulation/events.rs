//! Events emitted by the simulation loops
//!
//! Every loop returns the events it produced; the runtime forwards them to
//! subscribers (rendering, audio, mastery/debrief logic).

use serde::Serialize;

use crate::core::types::{AgentId, ObjectId, RoomId, Vec2};
use crate::entity::tasks::TaskKind;

/// Why a task ended without completing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    /// Referenced partner no longer exists or is locked
    PartnerMissing,
    /// Partner no longer holds the mirrored task
    PartnerCancelled,
    /// Referenced object no longer exists
    ObjectMissing,
    /// Movement failed for too many frames
    Stuck,
    /// Patrol exceeded its timeout
    PatrolTimeout,
    /// An async collaborator failed
    EffectFailed,
    /// Cleared by an external command
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimulationEvent {
    TaskAssigned {
        agent: AgentId,
        task: TaskKind,
        room: RoomId,
    },
    TaskCompleted {
        agent: AgentId,
        task: TaskKind,
        room: RoomId,
    },
    TaskAbandoned {
        agent: AgentId,
        task: TaskKind,
        room: RoomId,
        reason: AbandonReason,
    },
    ChatStarted {
        initiator: AgentId,
        partner: AgentId,
        task: TaskKind,
    },
    ChatEnded {
        initiator: AgentId,
        partner: AgentId,
    },
    MemoryShared {
        from: AgentId,
        to: AgentId,
        description: String,
    },
    ObjectUseStarted {
        agent: AgentId,
        object: ObjectId,
        activity: String,
    },
    ObjectUseFinished {
        agent: AgentId,
        object: ObjectId,
        activity: String,
    },
    BlockerRedirected {
        stuck: AgentId,
        blocker: AgentId,
        target: Vec2,
    },
    Greeted {
        from: AgentId,
        to: AgentId,
        text: String,
    },
    RelationshipChanged {
        agent: AgentId,
        toward: AgentId,
        delta: f32,
        score: f32,
    },
    ArtifactCreated {
        agent: AgentId,
        title: String,
    },
    EffectFailed {
        agent: AgentId,
        effect: &'static str,
        error: String,
    },
    /// Edge-triggered: any audible agent started/stopped walking near the player
    WalkingAudio { active: bool },
}
