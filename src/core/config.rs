//! Simulation configuration with documented constants
//!
//! All tunables are collected here. Every section deserializes from TOML with
//! per-field defaults, so a config file only needs to name what it changes.

use ahash::AHashMap;
use serde::Deserialize;
use std::path::Path;

use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, RoomId, Vec2};

/// Configuration for the simulation systems
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for the simulation PRNG
    pub seed: u64,

    /// Minimum batch size before steering plans are computed in parallel
    ///
    /// Below this, rayon's fork/join overhead exceeds the work.
    pub parallel_threshold: usize,

    /// Initial value of the "autonomy enabled" flag
    pub autonomy_enabled: bool,

    pub spatial: SpatialConfig,
    pub clock: ClockConfig,
    pub movement: MovementConfig,
    pub conversation: ConversationConfig,
    pub stuck: StuckConfig,
    pub decisions: DecisionConfig,
    pub utility: UtilityConfig,
    pub social: SocialConfig,
    pub greeting: GreetingConfig,
    pub effects: EffectsConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            parallel_threshold: 256,
            autonomy_enabled: true,
            spatial: SpatialConfig::default(),
            clock: ClockConfig::default(),
            movement: MovementConfig::default(),
            conversation: ConversationConfig::default(),
            stuck: StuckConfig::default(),
            decisions: DecisionConfig::default(),
            utility: UtilityConfig::default(),
            social: SocialConfig::default(),
            greeting: GreetingConfig::default(),
            effects: EffectsConfig::default(),
        }
    }
}

// === SPATIAL SYSTEM ===

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Size of each cell in the movement-loop spatial grid (world units)
    ///
    /// Large relative to the avoidance radius so a query touches at most
    /// four cells.
    pub cell_size: f32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self { cell_size: 200.0 }
    }
}

// === CLOCK ===

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Minimum wall-clock delta between two movement ticks (ms)
    pub min_frame_delta_ms: u64,

    /// Cadence of the step (patrol) decision loop (ms)
    pub step_interval_ms: u64,

    /// Cadence of the major-decision loop (ms)
    pub major_interval_ms: u64,

    /// Cadence of the greeting loop (ms); 500 = 2Hz
    pub greeter_interval_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            min_frame_delta_ms: 16,
            step_interval_ms: 2_500,
            major_interval_ms: 30_000,
            greeter_interval_ms: 500,
        }
    }
}

// === MOVEMENT / STEERING ===

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Agents processed per movement tick (round-robin)
    pub batch_size: usize,

    /// Displacement per tick before multipliers (world units)
    pub base_speed: f32,

    /// Speed multiplier while pursuing a goal (task, follow, debrief)
    pub purposeful_multiplier: f32,

    /// Speed multiplier inside the outdoor region
    pub outdoor_multiplier: f32,

    /// Player displacement per `MovePlayer` command
    pub player_speed: f32,

    /// Blended vectors shorter than this are treated as "no movement"
    pub epsilon: f32,

    /// Neighbors closer than this push the agent away
    pub avoidance_radius: f32,

    /// Neighbors closer than this trigger the id-ordered yield
    pub deadlock_distance: f32,

    /// Weight of the avoidance vector relative to the unit desired vector
    pub avoidance_strength: f32,

    /// Stop distance for talk / small_talk partners
    pub chat_stop_distance: f32,

    /// Stop distance for interactive-object use points
    pub object_stop_distance: f32,

    /// Stop distance for patrol targets
    pub patrol_stop_distance: f32,

    /// Stop distance behind a followed agent
    pub follow_stop_distance: f32,

    /// Agents within this distance of a debrief point stop gathering
    pub debrief_gather_distance: f32,

    /// Patrol tasks older than this are abandoned (ms)
    pub patrol_timeout_ms: u64,

    /// Moving agents within this distance of the player are audible
    pub audible_radius: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            batch_size: 40,
            base_speed: 2.0,
            purposeful_multiplier: 1.5,
            outdoor_multiplier: 1.25,
            player_speed: 4.0,
            epsilon: 0.05,
            avoidance_radius: 40.0,
            deadlock_distance: 20.0,
            avoidance_strength: 20.0,
            chat_stop_distance: 60.0,
            object_stop_distance: 12.0,
            patrol_stop_distance: 10.0,
            follow_stop_distance: 50.0,
            debrief_gather_distance: 40.0,
            patrol_timeout_ms: 20_000,
            audible_radius: 300.0,
        }
    }
}

/// Micro-movement of an agent while it is in conversation with the player
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Per-tick chance a friendly agent steps closer
    pub approach_chance: f32,

    /// Per-tick chance a rude agent steps away
    pub retreat_chance: f32,

    /// Friendly agents never approach closer than this
    pub min_distance: f32,

    /// Rude agents never retreat further than this
    pub max_distance: f32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            approach_chance: 0.02,
            retreat_chance: 0.02,
            min_distance: 40.0,
            max_distance: 160.0,
        }
    }
}

// === STUCK RESOLUTION ===

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StuckConfig {
    /// Consecutive failed frames before the resolver intervenes
    pub threshold_frames: u32,

    /// Radius searched for an idle blocker
    pub search_radius: f32,

    /// How far past the blocker its detour point is placed
    pub redirect_distance: f32,
}

impl Default for StuckConfig {
    fn default() -> Self {
        Self {
            threshold_frames: 30,
            search_radius: 60.0,
            redirect_distance: 60.0,
        }
    }
}

// === TASK ASSIGNMENT ===

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Step-loop patrol chance for outdoor or animal agents
    pub outdoor_patrol_chance: f32,

    /// Step-loop patrol chance for indoor agents sharing the player's room
    pub indoor_patrol_chance: f32,

    /// Random patrol points are drawn within this radius
    pub patrol_radius: f32,

    /// Attempts at a random valid point before falling back to the base point
    pub point_attempts: u32,

    /// Jitter applied around a patrol destination / object use point
    pub target_jitter: f32,

    /// Chance a room with idle agents is considered in a major cycle
    pub room_wake_probability: f32,

    /// Room cooldown written when a major task completes or is abandoned (ms)
    pub room_cooldown_ms: u64,

    /// Agents whose task was abandoned for being stuck sit out this long (ms)
    pub movement_failure_cooldown_ms: u64,

    /// Agents that never receive autonomous patrols
    pub stationary_agents: Vec<AgentId>,

    /// Rooms whose occupants are never assigned autonomous tasks
    pub excluded_rooms: Vec<RoomId>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            outdoor_patrol_chance: 0.3,
            indoor_patrol_chance: 0.05,
            patrol_radius: 150.0,
            point_attempts: 5,
            target_jitter: 15.0,
            room_wake_probability: 0.5,
            room_cooldown_ms: 45_000,
            movement_failure_cooldown_ms: 10_000,
            stationary_agents: Vec::new(),
            excluded_rooms: vec![RoomId::new("dungeon")],
        }
    }
}

/// Utility weights for the major-decision loop
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UtilityConfig {
    /// Flat utility of using the agent's preferred object
    pub use_object_bonus: f32,

    /// Base utility of gossip when a shareable memory exists
    pub gossip_base: f32,

    /// Gossip utility per point of memory importance
    pub gossip_importance_weight: f32,

    /// Gossip utility per point of relationship with the chosen partner
    pub gossip_relationship_weight: f32,

    /// Memories at or below this importance are not worth gossiping about
    pub gossip_importance_floor: f32,

    /// Minimum time between two gossip tasks of one agent (ms)
    pub gossip_cooldown_ms: u64,

    /// Utility of small talk when a partner is available
    pub small_talk_base: f32,

    /// Minimum time between two small-talk tasks of one agent (ms)
    pub small_talk_cooldown_ms: u64,

    /// Utility of patrolling toward a partner or object in the room
    pub patrol_score: f32,

    /// Baseline utility of wandering (always available)
    pub wander_score: f32,

    /// Softmax temperature for partner choice: weight = exp(score / temperature)
    pub relationship_temperature: f32,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            use_object_bonus: 60.0,
            gossip_base: 20.0,
            gossip_importance_weight: 5.0,
            gossip_relationship_weight: 0.2,
            gossip_importance_floor: 5.0,
            gossip_cooldown_ms: 120_000,
            small_talk_base: 25.0,
            small_talk_cooldown_ms: 60_000,
            patrol_score: 15.0,
            wander_score: 10.0,
            relationship_temperature: 50.0,
        }
    }
}

// === SOCIAL INTERACTIONS ===

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    /// How long a gossip conversation lasts after arrival (ms)
    pub chat_duration_ms: u64,

    /// How long small talk lasts after arrival (ms)
    pub small_talk_duration_ms: u64,

    /// How long an agent operates an interactive object (ms)
    pub object_use_duration_ms: u64,

    /// Relationship delta applied for a positive gossip reaction
    pub positive_reaction_delta: f32,

    /// Relationship delta applied for a negative gossip reaction
    pub negative_reaction_delta: f32,

    /// Importance multiplier for memories received second-hand
    pub gossip_importance_decay: f32,

    /// Importance of the memory an agent forms about its own artifact
    pub artifact_memory_importance: f32,

    /// Activities whose completion triggers artifact creation
    pub creative_activities: Vec<String>,

    /// Offset from an object's use point per activity
    pub activity_offsets: AHashMap<String, Vec2>,

    /// Memory streams are capped at this many records
    pub max_memories: usize,
}

impl Default for SocialConfig {
    fn default() -> Self {
        let mut activity_offsets = AHashMap::new();
        activity_offsets.insert("sit".to_string(), Vec2::new(0.0, 10.0));
        activity_offsets.insert("read".to_string(), Vec2::new(0.0, 10.0));
        activity_offsets.insert("paint".to_string(), Vec2::new(0.0, 25.0));
        activity_offsets.insert("play".to_string(), Vec2::new(-20.0, 0.0));

        Self {
            chat_duration_ms: 8_000,
            small_talk_duration_ms: 5_000,
            object_use_duration_ms: 10_000,
            positive_reaction_delta: 5.0,
            negative_reaction_delta: -5.0,
            gossip_importance_decay: 0.8,
            artifact_memory_importance: 6.0,
            creative_activities: vec![
                "paint".to_string(),
                "draw".to_string(),
                "sculpt".to_string(),
                "write".to_string(),
                "compose".to_string(),
            ],
            activity_offsets,
            max_memories: 100,
        }
    }
}

// === GREETINGS ===

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GreetingConfig {
    /// Agents closer than this may greet each other
    pub distance: f32,

    /// Minimum time since an agent's last interaction before it greets again (ms)
    pub cooldown_ms: u64,

    /// How long a greeting bubble stays active (ms)
    pub display_ms: u64,

    /// Canned phrases picked at random for non-animal agents
    pub phrases: Vec<String>,

    /// Fallback for animals without a configured sound
    pub default_animal_sound: String,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            distance: 80.0,
            cooldown_ms: 30_000,
            display_ms: 3_000,
            phrases: vec![
                "Hi!".to_string(),
                "Hello there!".to_string(),
                "Hey!".to_string(),
                "Good to see you.".to_string(),
                "Nice day, isn't it?".to_string(),
            ],
            default_animal_sound: "...".to_string(),
        }
    }
}

// === ASYNC COLLABORATORS ===

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Use the LLM-backed collaborators when the key variable is set
    ///
    /// When false (or no key is set) the offline keyword/template
    /// collaborators are used.
    pub use_llm: bool,

    /// Completion endpoint; anthropic.com URLs use the messages API,
    /// anything else the chat-completions shape
    pub api_url: String,

    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Replies are one small JSON object
    pub max_reply_tokens: u32,

    /// Collaborator calls taking longer than this fail (ms)
    pub timeout_ms: u64,

    /// Requests beyond this many in flight are dropped with a warning
    pub max_in_flight: usize,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            use_llm: true,
            api_url: "https://api.anthropic.com/v1/messages".into(),
            model: "claude-3-haiku-20240307".into(),
            api_key_env: "LLM_API_KEY".into(),
            max_reply_tokens: 256,
            timeout_ms: 15_000,
            max_in_flight: 16,
        }
    }
}

impl SimulationConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) TOML config
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Cell size of the greeting loop's grid
    pub fn greeting_cell_size(&self) -> f32 {
        self.greeting.distance * 2.0
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.spatial.cell_size <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "spatial.cell_size must be positive (got {})",
                self.spatial.cell_size
            )));
        }

        if self.movement.batch_size == 0 {
            return Err(SimError::InvalidConfig(
                "movement.batch_size must be at least 1".into(),
            ));
        }

        if self.movement.deadlock_distance > self.movement.avoidance_radius {
            return Err(SimError::InvalidConfig(format!(
                "movement.deadlock_distance ({}) should be <= avoidance_radius ({})",
                self.movement.deadlock_distance, self.movement.avoidance_radius
            )));
        }

        if self.movement.base_speed <= 0.0 {
            return Err(SimError::InvalidConfig("movement.base_speed must be positive".into()));
        }

        if self.greeting.distance <= 0.0 {
            return Err(SimError::InvalidConfig("greeting.distance must be positive".into()));
        }

        if self.clock.step_interval_ms == 0
            || self.clock.major_interval_ms == 0
            || self.clock.greeter_interval_ms == 0
        {
            return Err(SimError::InvalidConfig("clock intervals must be non-zero".into()));
        }

        if self.utility.relationship_temperature <= 0.0 {
            return Err(SimError::InvalidConfig(
                "utility.relationship_temperature must be positive".into(),
            ));
        }

        if self.effects.max_in_flight == 0 {
            return Err(SimError::InvalidConfig(
                "effects.max_in_flight must be at least 1".into(),
            ));
        }

        if self.effects.max_reply_tokens == 0 {
            return Err(SimError::InvalidConfig(
                "effects.max_reply_tokens must be at least 1".into(),
            ));
        }

        for p in [
            self.decisions.outdoor_patrol_chance,
            self.decisions.indoor_patrol_chance,
            self.decisions.room_wake_probability,
            self.conversation.approach_chance,
            self.conversation.retreat_chance,
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::InvalidConfig(format!(
                    "probability {} is outside [0, 1]",
                    p
                )));
            }
        }

        Ok(())
    }
}
