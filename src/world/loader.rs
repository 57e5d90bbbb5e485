//! Load a world definition (geometry, roster, preferred activities) from JSON
//!
//! The definition is validated as a whole before any simulation state is
//! built from it, so a bad file fails at startup rather than mid-run.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::config::SimulationConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, Vec2};
use crate::entity::agent::Agent;
use crate::entity::memory::{MemoryKind, MemoryRecord};
use crate::simulation::state::{PreferredActivity, SimState};
use crate::world::geometry::WorldGeometry;

/// Current world file format version
pub const WORLD_FORMAT_VERSION: u32 = 1;

/// Root structure of a world JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldDefinition {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub geometry: WorldGeometry,
    pub agents: Vec<AgentDefinition>,
    #[serde(default)]
    pub preferred_activities: AHashMap<AgentId, PreferredActivity>,
}

fn default_version() -> u32 {
    WORLD_FORMAT_VERSION
}

/// One agent as written in a world file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: AgentId,
    pub name: String,
    pub position: Vec2,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub is_player: bool,
    #[serde(default)]
    pub is_animal: bool,
    /// Greeting sound for animals
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub memories: Vec<MemorySeed>,
    #[serde(default)]
    pub relationships: AHashMap<AgentId, f32>,
}

/// A memory an agent starts with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySeed {
    pub kind: MemoryKind,
    pub description: String,
    pub importance: f32,
}

impl AgentDefinition {
    fn into_agent(self, memory_capacity: usize) -> Agent {
        let mut agent = if self.is_player {
            Agent::player(self.id, self.name, self.position)
        } else {
            Agent::new(self.id, self.name, self.position)
        }
        .with_persona(self.persona);

        if self.is_animal {
            agent.is_animal = true;
            agent.sound = self.sound;
        }
        agent.is_locked = self.is_locked;
        for seed in self.memories {
            agent.remember(MemoryRecord::new(seed.kind, seed.description, seed.importance, 0), memory_capacity);
        }
        for (other, score) in self.relationships {
            agent.adjust_relationship(&other, score);
        }
        agent
    }
}

/// Load a world definition from a JSON string
pub fn load_from_json(json: &str) -> Result<WorldDefinition> {
    let definition: WorldDefinition = serde_json::from_str(json)?;
    definition.validate()?;
    Ok(definition)
}

/// Load a world definition from a JSON file on disk
pub fn load_from_file(path: &Path) -> Result<WorldDefinition> {
    let content = std::fs::read_to_string(path)?;
    let definition = load_from_json(&content)?;
    tracing::info!(
        "Loaded world {} from {}",
        definition.name.as_deref().unwrap_or("<unnamed>"),
        path.display()
    );
    Ok(definition)
}

impl WorldDefinition {
    /// Check internal consistency of the definition
    pub fn validate(&self) -> Result<()> {
        if self.version > WORLD_FORMAT_VERSION {
            return Err(SimError::InvalidWorld(format!(
                "unsupported world format version {} (max {})",
                self.version, WORLD_FORMAT_VERSION
            )));
        }

        let bounds = self.geometry.bounds;
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Err(SimError::InvalidWorld("world bounds must have positive size".into()));
        }

        for object in &self.geometry.objects {
            if !object.room_id.is_outside() && self.geometry.zone(&object.room_id).is_none() {
                return Err(SimError::InvalidWorld(format!(
                    "object '{}' references unknown room '{}'",
                    object.id, object.room_id
                )));
            }
        }

        let blocked = |p: Vec2| {
            !bounds.contains_closed(p) || self.geometry.obstacles.iter().any(|o| o.contains_strict(p))
        };
        for agent in &self.agents {
            if blocked(agent.position) {
                return Err(SimError::InvalidWorld(format!(
                    "agent '{}' starts at an invalid position ({}, {})",
                    agent.id, agent.position.x, agent.position.y
                )));
            }
        }

        for (agent, preferred) in &self.preferred_activities {
            if !self.agents.iter().any(|a| &a.id == agent) {
                return Err(SimError::InvalidWorld(format!(
                    "preferred activity for unknown agent '{}'",
                    agent
                )));
            }
            if !self.geometry.objects.iter().any(|o| o.id == preferred.object) {
                return Err(SimError::InvalidWorld(format!(
                    "agent '{}' prefers unknown object '{}'",
                    agent, preferred.object
                )));
            }
        }

        Ok(())
    }

    /// Build simulation state from this definition
    pub fn into_state(self, config: SimulationConfig) -> Result<SimState> {
        self.validate()?;
        let capacity = config.social.max_memories;
        let agents = self.agents.into_iter().map(|a| a.into_agent(capacity)).collect();
        let state = SimState::new(config, self.geometry, agents)?;
        Ok(state.with_preferred_activities(self.preferred_activities))
    }
}
