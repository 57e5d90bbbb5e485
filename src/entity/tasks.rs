//! Autonomous tasks held by agents

use crate::core::types::{AgentId, Millis, ObjectId, Vec2};
use crate::entity::memory::MemoryRecord;
use serde::{Deserialize, Serialize};

/// The current autonomous goal of an agent
///
/// `Talk` and `SmallTalk` are always held in mirrored pairs: if A holds one
/// naming B, B holds the same kind naming A.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// Gossip delivery. The initiator carries the memory; the listener's
    /// mirrored task carries `None`.
    Talk {
        partner: AgentId,
        memory: Option<MemoryRecord>,
        started_at: Millis,
    },
    /// Token-free social filler
    SmallTalk { partner: AgentId },
    /// Travel to and operate an interactive object
    UseObject {
        object: ObjectId,
        activity: String,
        started_at: Millis,
    },
    /// Travel to an arbitrary point; subject to a hard timeout
    Patrol { target: Vec2, started_at: Millis },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Talk,
    SmallTalk,
    UseObject,
    Patrol,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Talk => "talk",
            TaskKind::SmallTalk => "small_talk",
            TaskKind::UseObject => "use_object",
            TaskKind::Patrol => "patrol",
        }
    }
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Talk { .. } => TaskKind::Talk,
            Task::SmallTalk { .. } => TaskKind::SmallTalk,
            Task::UseObject { .. } => TaskKind::UseObject,
            Task::Patrol { .. } => TaskKind::Patrol,
        }
    }

    pub fn patrol(target: Vec2, now: Millis) -> Self {
        Task::Patrol { target, started_at: now }
    }

    /// Partner of a paired conversation task
    pub fn partner(&self) -> Option<&AgentId> {
        match self {
            Task::Talk { partner, .. } | Task::SmallTalk { partner } => Some(partner),
            _ => None,
        }
    }

    /// Major tasks occupy their room's single activity slot
    pub fn is_major(&self) -> bool {
        !matches!(self, Task::Patrol { .. })
    }

    /// Whether `other` is the partner-side mirror of this task held by `owner`
    pub fn is_mirrored_by(&self, owner: &AgentId, other: &Task) -> bool {
        self.kind() == other.kind() && other.partner() == Some(owner)
    }
}
