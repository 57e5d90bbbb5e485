//! Shared simulation state: the roster, world lookups and every
//! cross-loop table (room cooldowns, schedule, outbox)
//!
//! `SimState` has a single writer. Loops borrow it mutably in turn; the
//! runtime is the only place it lives across awaits.

use ahash::{AHashMap, AHashSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::SimulationConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, Millis, ObjectId, RoomId, Vec2};
use crate::entity::agent::Agent;
use crate::entity::tasks::{Task, TaskKind};
use crate::simulation::effects::EffectRequest;
use crate::simulation::events::{AbandonReason, SimulationEvent};
use crate::simulation::schedule::ActionSchedule;
use crate::world::collision::CollisionValidator;
use crate::world::geometry::WorldGeometry;
use crate::world::objects::ObjectCatalog;

/// The object + activity an agent gravitates to when its room is woken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferredActivity {
    pub object: ObjectId,
    pub activity: String,
}

/// An active mentor debrief pulling a room's agents toward a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Debrief {
    pub gather_point: Vec2,
}

/// How a task left an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEnd {
    Completed,
    Abandoned(AbandonReason),
}

/// Agents indexed by id, in definition order
#[derive(Debug, Clone, Default)]
pub struct Roster {
    agents: Vec<Agent>,
    index: AHashMap<AgentId, usize>,
}

impl Roster {
    pub fn new(agents: Vec<Agent>) -> Result<Self> {
        let mut index = AHashMap::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            if index.insert(agent.id.clone(), i).is_some() {
                return Err(SimError::InvalidWorld(format!("duplicate agent id '{}'", agent.id)));
            }
        }
        Ok(Self { agents, index })
    }

    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.index.get(id).map(|&i| &self.agents[i])
    }

    pub fn get_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.agents[i]),
            None => None,
        }
    }

    /// Lookup that treats locked agents as absent
    pub fn get_active(&self, id: &AgentId) -> Option<&Agent> {
        self.get(id).filter(|a| !a.is_locked)
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.index.contains_key(id)
    }

    pub fn at(&self, index: usize) -> &Agent {
        &self.agents[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.iter_mut()
    }

    pub fn player(&self) -> Option<&Agent> {
        self.agents.iter().find(|a| a.is_player)
    }

    pub fn remove(&mut self, id: &AgentId) -> Option<Agent> {
        let idx = self.index.remove(id)?;
        let agent = self.agents.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(agent)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Bookkeeping owned by the movement loop across ticks
#[derive(Debug, Clone, Default)]
pub struct MovementMemory {
    /// Round-robin cursor into the eligible agent list
    pub cursor: usize,
    /// Consecutive frames each agent wanted to move but did not
    pub stuck_frames: AHashMap<AgentId, u32>,
    /// Agents whose position changed in the last committed tick
    pub moved_last_tick: AHashSet<AgentId>,
    /// Last reported walking-audio state
    pub walking_near_player: bool,
}

/// What the renderer needs each frame
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub agents: Vec<AgentView>,
    pub walking_near_player: bool,
    pub modal_open: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub id: AgentId,
    pub name: String,
    pub position: Vec2,
    pub room_id: RoomId,
    pub task: Option<TaskKind>,
    pub is_chatting: bool,
    pub is_using_object: bool,
    pub is_locked: bool,
    pub greeting: Option<String>,
}

pub struct SimState {
    pub config: SimulationConfig,
    pub geometry: WorldGeometry,
    pub validator: CollisionValidator,
    pub objects: ObjectCatalog,
    pub roster: Roster,
    pub preferred_activities: AHashMap<AgentId, PreferredActivity>,

    /// Rooms that may not start a new major activity before the stamp
    pub room_cooldowns: AHashMap<RoomId, Millis>,

    /// Global pause for steering, decisions and greetings
    pub modal_open: bool,
    pub autonomy_enabled: bool,
    /// Agent currently in conversation with the player
    pub conversation: Option<AgentId>,
    pub debriefs: AHashMap<RoomId, Debrief>,
    /// Agent being dragged by the user, if any
    pub dragging: Option<AgentId>,

    pub movement: MovementMemory,
    pub schedule: ActionSchedule,
    /// Requests for async collaborators, drained by the runtime
    pub outbox: Vec<EffectRequest>,

    pub rng: ChaCha8Rng,
    pub tick: u64,
}

impl SimState {
    /// Build state from a roster, enforcing exactly one player
    pub fn new(config: SimulationConfig, geometry: WorldGeometry, agents: Vec<Agent>) -> Result<Self> {
        config.validate()?;

        let players = agents.iter().filter(|a| a.is_player).count();
        if players != 1 {
            return Err(SimError::InvalidWorld(format!(
                "expected exactly one player, found {}",
                players
            )));
        }

        let validator = CollisionValidator::new(&geometry);
        let objects = ObjectCatalog::new(geometry.objects.clone());
        let mut roster = Roster::new(agents)?;
        for agent in roster.iter_mut() {
            agent.room_id = validator.room_for(agent.position);
        }

        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let autonomy_enabled = config.autonomy_enabled;

        tracing::info!(
            "Simulation state ready: {} agents, {} zones, {} objects",
            roster.len(),
            geometry.zones.len(),
            objects.len()
        );

        Ok(Self {
            config,
            geometry,
            validator,
            objects,
            roster,
            preferred_activities: AHashMap::new(),
            room_cooldowns: AHashMap::new(),
            modal_open: false,
            autonomy_enabled,
            conversation: None,
            debriefs: AHashMap::new(),
            dragging: None,
            movement: MovementMemory::default(),
            schedule: ActionSchedule::new(),
            outbox: Vec::new(),
            rng,
            tick: 0,
        })
    }

    pub fn with_preferred_activities(mut self, table: AHashMap<AgentId, PreferredActivity>) -> Self {
        self.preferred_activities = table;
        self
    }

    pub fn player(&self) -> Option<&Agent> {
        self.roster.player()
    }

    pub fn player_room(&self) -> Option<RoomId> {
        self.player().map(|p| p.room_id.clone())
    }

    /// Move an agent and refresh its cached room in one step
    pub fn commit_position(&mut self, id: &AgentId, position: Vec2) {
        let room = self.validator.room_for(position);
        if let Some(agent) = self.roster.get_mut(id) {
            agent.position = position;
            agent.room_id = room;
        }
    }

    pub fn set_room_cooldown(&mut self, room: &RoomId, now: Millis) {
        let until = now + self.config.decisions.room_cooldown_ms;
        self.room_cooldowns.insert(room.clone(), until);
    }

    pub fn room_on_cooldown(&self, room: &RoomId, now: Millis) -> bool {
        self.room_cooldowns.get(room).is_some_and(|&until| now < until)
    }

    /// Clear an agent's task, its partner's mirrored task, and stamp the room
    /// cooldown where one applies
    ///
    /// Completed patrols leave no cooldown; every major task and every
    /// abandonment does.
    pub fn end_task(&mut self, id: &AgentId, end: TaskEnd, now: Millis, events: &mut Vec<SimulationEvent>) {
        let Some(agent) = self.roster.get_mut(id) else {
            return;
        };
        let Some(task) = agent.current_task.take() else {
            return;
        };
        let room = agent.room_id.clone();
        self.record_task_end(id, &task, room, end, now, events);

        let Some(partner_id) = task.partner().cloned() else {
            return;
        };
        let Some(partner) = self.roster.get_mut(&partner_id) else {
            return;
        };
        let mirrored = partner
            .current_task
            .as_ref()
            .is_some_and(|pt| task.is_mirrored_by(id, pt));
        if !mirrored {
            return;
        }
        let Some(partner_task) = partner.current_task.take() else {
            return;
        };
        let partner_room = partner.room_id.clone();
        let partner_end = match end {
            TaskEnd::Completed => TaskEnd::Completed,
            TaskEnd::Abandoned(_) => TaskEnd::Abandoned(AbandonReason::PartnerCancelled),
        };
        self.record_task_end(&partner_id, &partner_task, partner_room, partner_end, now, events);
    }

    fn record_task_end(
        &mut self,
        id: &AgentId,
        task: &Task,
        room: RoomId,
        end: TaskEnd,
        now: Millis,
        events: &mut Vec<SimulationEvent>,
    ) {
        if task.is_major() || matches!(end, TaskEnd::Abandoned(_)) {
            self.set_room_cooldown(&room, now);
        }

        match end {
            TaskEnd::Completed => {
                tracing::debug!("{} completed {}", id, task.kind().as_str());
                events.push(SimulationEvent::TaskCompleted {
                    agent: id.clone(),
                    task: task.kind(),
                    room,
                });
            }
            TaskEnd::Abandoned(reason) => {
                tracing::debug!("{} abandoned {} ({:?})", id, task.kind().as_str(), reason);
                events.push(SimulationEvent::TaskAbandoned {
                    agent: id.clone(),
                    task: task.kind(),
                    room,
                    reason,
                });
            }
        }
    }

    /// Assign a task and announce it
    pub fn assign_task(&mut self, id: &AgentId, task: Task, events: &mut Vec<SimulationEvent>) {
        if let Some(agent) = self.roster.get_mut(id) {
            events.push(SimulationEvent::TaskAssigned {
                agent: id.clone(),
                task: task.kind(),
                room: agent.room_id.clone(),
            });
            agent.current_task = Some(task);
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<EffectRequest> {
        std::mem::take(&mut self.outbox)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            agents: self
                .roster
                .iter()
                .map(|a| AgentView {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    position: a.position,
                    room_id: a.room_id.clone(),
                    task: a.current_task.as_ref().map(Task::kind),
                    is_chatting: a.is_chatting,
                    is_using_object: a.is_using_object,
                    is_locked: a.is_locked,
                    greeting: a.greeting.as_ref().map(|g| g.text.clone()),
                })
                .collect(),
            walking_near_player: self.movement.walking_near_player,
            modal_open: self.modal_open,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::core::types::Rect;

    /// Open 1000x1000 world with no zones or obstacles
    pub fn open_world() -> WorldGeometry {
        WorldGeometry::new(Rect::new(0.0, 0.0, 1000.0, 1000.0))
    }

    pub fn state_with(geometry: WorldGeometry, agents: Vec<Agent>) -> SimState {
        let mut all = vec![Agent::player("player", "Player", Vec2::new(990.0, 990.0))];
        all.extend(agents);
        SimState::new(SimulationConfig::default(), geometry, all).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::core::types::Rect;

    #[test]
    fn test_exactly_one_player_required() {
        let none = SimState::new(
            SimulationConfig::default(),
            open_world(),
            vec![Agent::new("a", "A", Vec2::ZERO)],
        );
        assert!(matches!(none, Err(SimError::InvalidWorld(_))));

        let two = SimState::new(
            SimulationConfig::default(),
            open_world(),
            vec![
                Agent::player("p1", "P1", Vec2::ZERO),
                Agent::player("p2", "P2", Vec2::ZERO),
            ],
        );
        assert!(two.is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = Roster::new(vec![
            Agent::new("a", "A", Vec2::ZERO),
            Agent::new("a", "A again", Vec2::ZERO),
        ]);
        assert!(matches!(result, Err(SimError::InvalidWorld(_))));
    }

    #[test]
    fn test_rooms_computed_on_load_and_commit() {
        let geometry = open_world().with_zone("cafe", Rect::new(0.0, 0.0, 100.0, 100.0));
        let mut state = state_with(geometry, vec![Agent::new("a", "A", Vec2::new(50.0, 50.0))]);
        let id = AgentId::from("a");
        assert_eq!(state.roster.get(&id).unwrap().room_id, RoomId::from("cafe"));

        state.commit_position(&id, Vec2::new(500.0, 500.0));
        assert!(state.roster.get(&id).unwrap().room_id.is_outside());
    }

    #[test]
    fn test_end_task_clears_mirror_and_sets_cooldown() {
        let mut state = state_with(
            open_world(),
            vec![
                Agent::new("a", "A", Vec2::new(10.0, 10.0)),
                Agent::new("b", "B", Vec2::new(20.0, 10.0)),
            ],
        );
        let a = AgentId::from("a");
        let b = AgentId::from("b");
        state.roster.get_mut(&a).unwrap().current_task = Some(Task::SmallTalk { partner: b.clone() });
        state.roster.get_mut(&b).unwrap().current_task = Some(Task::SmallTalk { partner: a.clone() });

        let mut events = Vec::new();
        state.end_task(&a, TaskEnd::Abandoned(AbandonReason::Stuck), 1_000, &mut events);

        assert!(state.roster.get(&a).unwrap().current_task.is_none());
        assert!(state.roster.get(&b).unwrap().current_task.is_none());
        assert!(state.room_on_cooldown(&RoomId::outside(), 1_000));
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            SimulationEvent::TaskAbandoned { reason: AbandonReason::PartnerCancelled, .. }
        ));
    }

    #[test]
    fn test_completed_patrol_sets_no_cooldown() {
        let mut state = state_with(open_world(), vec![Agent::new("a", "A", Vec2::new(10.0, 10.0))]);
        let a = AgentId::from("a");
        state.roster.get_mut(&a).unwrap().current_task = Some(Task::patrol(Vec2::new(50.0, 50.0), 0));

        let mut events = Vec::new();
        state.end_task(&a, TaskEnd::Completed, 500, &mut events);
        assert!(!state.room_on_cooldown(&RoomId::outside(), 500));
    }

    #[test]
    fn test_roster_remove_keeps_index_consistent() {
        let mut roster = Roster::new(vec![
            Agent::new("a", "A", Vec2::ZERO),
            Agent::new("b", "B", Vec2::ZERO),
            Agent::new("c", "C", Vec2::ZERO),
        ])
        .unwrap();
        assert!(roster.remove(&AgentId::from("a")).is_some());
        assert_eq!(roster.get(&AgentId::from("c")).unwrap().name, "C");
        assert_eq!(roster.len(), 2);
    }
}
