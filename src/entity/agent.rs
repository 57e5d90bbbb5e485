//! The agent: the central mutable entity of the simulation

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, Millis, RoomId, Vec2};
use crate::entity::memory::{MemoryRecord, MemoryStream};
use crate::entity::tasks::Task;

/// Conversational temperament, derived once from the persona text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Friendly,
    #[default]
    Neutral,
    Rude,
}

const RUDE_KEYWORDS: [&str; 3] = ["rude", "arrogant", "dismissive"];
const FRIENDLY_KEYWORDS: [&str; 3] = ["friendly", "engaging", "curious"];

impl Disposition {
    /// Classify a persona. A persona matching both keyword sets is Rude.
    pub fn from_persona(persona: &str) -> Self {
        let lower = persona.to_lowercase();
        if RUDE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Disposition::Rude
        } else if FRIENDLY_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Disposition::Friendly
        } else {
            Disposition::Neutral
        }
    }
}

/// Transient speech bubble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Greeting {
    pub text: String,
    pub timestamp: Millis,
}

/// Per-agent cooldown stamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cooldowns {
    pub last_gossip: Option<Millis>,
    pub last_small_talk: Option<Millis>,
    pub last_interaction: Option<Millis>,
    pub last_movement_failure: Option<Millis>,
}

/// Whether `stamp` is at least `cooldown` ms in the past (or never set)
pub fn cooldown_elapsed(stamp: Option<Millis>, cooldown: Millis, now: Millis) -> bool {
    stamp.map_or(true, |t| now.saturating_sub(t) >= cooldown)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub is_player: bool,

    pub position: Vec2,
    /// Cached zone of `position`; recomputed on every committed move
    pub room_id: RoomId,

    pub persona: String,
    pub disposition: Disposition,
    /// Greeting sound for animals
    pub sound: Option<String>,

    pub is_chatting: bool,
    pub is_using_object: bool,
    pub is_waiting: bool,
    pub waiting_until: Option<Millis>,
    /// Locked agents are invisible to every simulation loop
    pub is_locked: bool,
    pub is_animal: bool,

    pub current_task: Option<Task>,
    /// Back-reference resolved against the roster each tick
    pub following: Option<AgentId>,
    pub greeting: Option<Greeting>,

    pub memory_stream: MemoryStream,
    /// Signed affinity toward other agents, clamped to [-100, 100]
    pub relationships: AHashMap<AgentId, f32>,

    pub cooldowns: Cooldowns,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>, position: Vec2) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_player: false,
            position,
            room_id: RoomId::outside(),
            persona: String::new(),
            disposition: Disposition::Neutral,
            sound: None,
            is_chatting: false,
            is_using_object: false,
            is_waiting: false,
            waiting_until: None,
            is_locked: false,
            is_animal: false,
            current_task: None,
            following: None,
            greeting: None,
            memory_stream: MemoryStream::new(),
            relationships: AHashMap::new(),
            cooldowns: Cooldowns::default(),
        }
    }

    pub fn player(id: impl Into<AgentId>, name: impl Into<String>, position: Vec2) -> Self {
        let mut agent = Self::new(id, name, position);
        agent.is_player = true;
        agent
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self.disposition = Disposition::from_persona(&self.persona);
        self
    }

    pub fn as_animal(mut self, sound: impl Into<String>) -> Self {
        self.is_animal = true;
        self.sound = Some(sound.into());
        self
    }

    pub fn locked(mut self) -> Self {
        self.is_locked = true;
        self
    }

    /// Whether the agent is held in place by a wait flag or deadline
    pub fn is_waiting_at(&self, now: Millis) -> bool {
        self.is_waiting || self.waiting_until.is_some_and(|t| t > now)
    }

    pub fn has_active_greeting(&self, now: Millis, display_ms: Millis) -> bool {
        self.greeting
            .as_ref()
            .is_some_and(|g| now.saturating_sub(g.timestamp) < display_ms)
    }

    /// Busy with a timed action (chatting or operating an object)
    pub fn is_mid_action(&self) -> bool {
        self.is_chatting || self.is_using_object
    }

    /// No task and not mid-action
    pub fn is_idle(&self) -> bool {
        self.current_task.is_none() && !self.is_mid_action()
    }

    pub fn relationship_with(&self, other: &AgentId) -> f32 {
        self.relationships.get(other).copied().unwrap_or(0.0)
    }

    /// Shift affinity toward `other`, returning the new score
    pub fn adjust_relationship(&mut self, other: &AgentId, delta: f32) -> f32 {
        let score = self.relationships.entry(other.clone()).or_insert(0.0);
        *score = (*score + delta).clamp(-100.0, 100.0);
        *score
    }

    pub fn remember(&mut self, record: MemoryRecord, capacity: usize) {
        self.memory_stream.add(record, capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_keywords() {
        assert_eq!(Disposition::from_persona("A friendly baker"), Disposition::Friendly);
        assert_eq!(Disposition::from_persona("Curious about everything"), Disposition::Friendly);
        assert_eq!(Disposition::from_persona("An ARROGANT noble"), Disposition::Rude);
        assert_eq!(Disposition::from_persona("A quiet librarian"), Disposition::Neutral);
    }

    #[test]
    fn test_disposition_rude_wins_over_friendly() {
        assert_eq!(
            Disposition::from_persona("friendly to some, dismissive to most"),
            Disposition::Rude
        );
    }

    #[test]
    fn test_cooldown_elapsed() {
        assert!(cooldown_elapsed(None, 1_000, 0));
        assert!(!cooldown_elapsed(Some(500), 1_000, 1_000));
        assert!(cooldown_elapsed(Some(500), 1_000, 1_500));
    }

    #[test]
    fn test_relationship_clamped() {
        let mut agent = Agent::new("a", "A", Vec2::ZERO);
        let other = AgentId::from("b");
        assert_eq!(agent.relationship_with(&other), 0.0);
        agent.adjust_relationship(&other, 80.0);
        assert_eq!(agent.adjust_relationship(&other, 80.0), 100.0);
        assert_eq!(agent.adjust_relationship(&other, -250.0), -100.0);
    }

    #[test]
    fn test_waiting_until_expires() {
        let mut agent = Agent::new("a", "A", Vec2::ZERO);
        agent.waiting_until = Some(1_000);
        assert!(agent.is_waiting_at(999));
        assert!(!agent.is_waiting_at(1_000));
    }

    #[test]
    fn test_greeting_activity_window() {
        let mut agent = Agent::new("a", "A", Vec2::ZERO);
        agent.greeting = Some(Greeting { text: "Hi!".into(), timestamp: 100 });
        assert!(agent.has_active_greeting(1_000, 3_000));
        assert!(!agent.has_active_greeting(3_100, 3_000));
    }
}
