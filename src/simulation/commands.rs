//! External commands: the only way collaborators mutate the simulation

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, Millis, RoomId, Vec2};
use crate::entity::agent::Agent;
use crate::entity::memory::{MemoryKind, MemoryRecord};
use crate::simulation::events::{AbandonReason, SimulationEvent};
use crate::simulation::state::{Debrief, SimState, TaskEnd};

/// Rings searched for a free spot when a drag ends inside an obstacle
const DROP_SEARCH_STEP: f32 = 10.0;
const DROP_SEARCH_RINGS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SimCommand {
    SetModalOpen { open: bool },
    SetAutonomy { enabled: bool },
    /// Player input; `direction` need not be normalized
    MovePlayer { direction: Vec2 },
    /// Manual placement; bypasses collision until `EndDrag`
    DragAgent { agent: AgentId, position: Vec2 },
    EndDrag,
    StartConversation { agent: AgentId },
    EndConversation,
    Follow { agent: AgentId, target: Option<AgentId> },
    WaitUntil { agent: AgentId, until: Option<Millis> },
    StartDebrief { room: RoomId, gather_point: Vec2 },
    EndDebrief { room: RoomId },
    SetLocked { agent: AgentId, locked: bool },
    AddMemory {
        agent: AgentId,
        kind: MemoryKind,
        description: String,
        importance: f32,
    },
    RemoveAgent { agent: AgentId },
}

fn agent_mut<'a>(state: &'a mut SimState, id: &AgentId) -> Result<&'a mut Agent> {
    state
        .roster
        .get_mut(id)
        .ok_or_else(|| SimError::AgentNotFound(id.clone()))
}

fn require(state: &SimState, id: &AgentId) -> Result<()> {
    if state.roster.contains(id) {
        Ok(())
    } else {
        Err(SimError::AgentNotFound(id.clone()))
    }
}

/// Apply one command at time `now`
pub fn apply_command(state: &mut SimState, command: SimCommand, now: Millis) -> Result<Vec<SimulationEvent>> {
    let mut events = Vec::new();
    tracing::debug!("command: {:?}", command);

    match command {
        SimCommand::SetModalOpen { open } => state.modal_open = open,
        SimCommand::SetAutonomy { enabled } => state.autonomy_enabled = enabled,
        SimCommand::MovePlayer { direction } => move_player(state, direction),
        SimCommand::DragAgent { agent, position } => {
            require(state, &agent)?;
            state.dragging = Some(agent.clone());
            state.commit_position(&agent, position);
        }
        SimCommand::EndDrag => {
            if let Some(agent) = state.dragging.take() {
                drop_agent(state, &agent);
            }
        }
        SimCommand::StartConversation { agent } => {
            require(state, &agent)?;
            state.end_task(&agent, TaskEnd::Abandoned(AbandonReason::Cancelled), now, &mut events);
            let a = agent_mut(state, &agent)?;
            a.following = None;
            state.conversation = Some(agent);
        }
        SimCommand::EndConversation => {
            if let Some(agent) = state.conversation.take() {
                if let Some(a) = state.roster.get_mut(&agent) {
                    a.cooldowns.last_interaction = Some(now);
                }
            }
        }
        SimCommand::Follow { agent, target } => {
            if let Some(target) = &target {
                require(state, target)?;
            }
            agent_mut(state, &agent)?.following = target;
        }
        SimCommand::WaitUntil { agent, until } => {
            agent_mut(state, &agent)?.waiting_until = until;
        }
        SimCommand::StartDebrief { room, gather_point } => {
            tracing::info!("Debrief started in {}", room);
            state.debriefs.insert(room, Debrief { gather_point });
        }
        SimCommand::EndDebrief { room } => {
            state.debriefs.remove(&room);
        }
        SimCommand::SetLocked { agent, locked } => {
            require(state, &agent)?;
            if locked {
                state.end_task(&agent, TaskEnd::Abandoned(AbandonReason::Cancelled), now, &mut events);
                state.movement.stuck_frames.remove(&agent);
            }
            let a = agent_mut(state, &agent)?;
            a.is_locked = locked;
            if locked {
                a.is_chatting = false;
                a.is_using_object = false;
                a.following = None;
            }
        }
        SimCommand::AddMemory {
            agent,
            kind,
            description,
            importance,
        } => {
            let capacity = state.config.social.max_memories;
            agent_mut(state, &agent)?.remember(MemoryRecord::new(kind, description, importance, now), capacity);
        }
        SimCommand::RemoveAgent { agent } => {
            let is_player = state
                .roster
                .get(&agent)
                .map(|a| a.is_player)
                .ok_or_else(|| SimError::AgentNotFound(agent.clone()))?;
            if is_player {
                return Err(SimError::InvalidWorld("the player cannot be removed".into()));
            }
            state.roster.remove(&agent);
            if state.conversation.as_ref() == Some(&agent) {
                state.conversation = None;
            }
            if state.dragging.as_ref() == Some(&agent) {
                state.dragging = None;
            }
            state.movement.stuck_frames.remove(&agent);
            state.movement.moved_last_tick.remove(&agent);
            state.preferred_activities.remove(&agent);
            tracing::info!("Removed agent {}", agent);
        }
    }

    Ok(events)
}

/// Move the player one step, sliding along walls; no-op while the modal is open
fn move_player(state: &mut SimState, direction: Vec2) {
    if state.modal_open {
        return;
    }
    let Some(player) = state.player() else {
        return;
    };
    let id = player.id.clone();
    let pos = player.position;
    let step = direction.normalize() * state.config.movement.player_speed;
    if step == Vec2::ZERO {
        return;
    }

    let next = [step, Vec2::new(step.x, 0.0), Vec2::new(0.0, step.y)]
        .into_iter()
        .map(|d| pos + d)
        .find(|p| state.validator.is_free(*p));
    if let Some(next) = next {
        state.commit_position(&id, next);
    }
}

/// Settle a dropped agent on the nearest free point around the drop spot
fn drop_agent(state: &mut SimState, id: &AgentId) {
    let Some(pos) = state.roster.get(id).map(|a| a.position) else {
        return;
    };
    if state.validator.is_free(pos) {
        return;
    }

    let directions = [
        Vec2::new(1.0, 0.0),
        Vec2::new(-1.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(0.0, -1.0),
        Vec2::new(1.0, 1.0).normalize(),
        Vec2::new(-1.0, 1.0).normalize(),
        Vec2::new(1.0, -1.0).normalize(),
        Vec2::new(-1.0, -1.0).normalize(),
    ];
    let free = (1..=DROP_SEARCH_RINGS)
        .flat_map(|ring| directions.iter().map(move |d| *d * (ring as f32 * DROP_SEARCH_STEP)))
        .map(|offset| pos + offset)
        .find(|p| state.validator.is_free(*p));

    match free {
        Some(p) => state.commit_position(id, p),
        None => tracing::warn!("{} dropped inside geometry with no free spot nearby", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Rect;
    use crate::entity::tasks::Task;
    use crate::simulation::state::test_support::*;

    #[test]
    fn test_move_player_slides_along_wall() {
        let geometry = open_world().with_obstacle(Rect::new(0.0, 0.0, 1000.0, 500.0));
        let mut state = state_with(geometry, vec![]);
        state.commit_position(&AgentId::from("player"), Vec2::new(500.0, 500.0));

        apply_command(&mut state, SimCommand::MovePlayer { direction: Vec2::new(1.0, -1.0) }, 0).unwrap();

        let p = state.player().unwrap().position;
        assert!(p.x > 500.0);
        assert_eq!(p.y, 500.0);
    }

    #[test]
    fn test_drag_ignores_geometry_until_drop() {
        let geometry = open_world()
            .with_obstacle(Rect::new(400.0, 400.0, 600.0, 600.0))
            .with_zone("hall", Rect::new(0.0, 0.0, 300.0, 300.0));
        let mut state = state_with(geometry, vec![Agent::new("a", "A", Vec2::new(100.0, 700.0))]);
        let id = AgentId::from("a");

        apply_command(&mut state, SimCommand::DragAgent { agent: id.clone(), position: Vec2::new(100.0, 100.0) }, 0).unwrap();
        assert_eq!(state.roster.get(&id).unwrap().room_id, RoomId::new("hall"));

        apply_command(&mut state, SimCommand::DragAgent { agent: id.clone(), position: Vec2::new(500.0, 500.0) }, 0).unwrap();
        assert_eq!(state.roster.get(&id).unwrap().position, Vec2::new(500.0, 500.0));

        apply_command(&mut state, SimCommand::EndDrag, 0).unwrap();
        let a = state.roster.get(&id).unwrap();
        assert!(state.validator.is_free(a.position));
        assert!(state.dragging.is_none());
    }

    #[test]
    fn test_lock_cancels_partner_task() {
        let mut a = Agent::new("a", "A", Vec2::new(100.0, 100.0));
        a.current_task = Some(Task::SmallTalk { partner: "b".into() });
        let mut b = Agent::new("b", "B", Vec2::new(300.0, 100.0));
        b.current_task = Some(Task::SmallTalk { partner: "a".into() });
        let mut state = state_with(open_world(), vec![a, b]);

        let events = apply_command(&mut state, SimCommand::SetLocked { agent: "a".into(), locked: true }, 50).unwrap();

        assert_eq!(events.len(), 2);
        assert!(state.roster.get(&AgentId::from("a")).unwrap().is_locked);
        assert!(state.roster.get(&AgentId::from("b")).unwrap().current_task.is_none());
    }

    #[test]
    fn test_unknown_agent_is_an_error() {
        let mut state = state_with(open_world(), vec![]);
        let result = apply_command(&mut state, SimCommand::WaitUntil { agent: "ghost".into(), until: Some(5) }, 0);
        assert!(matches!(result, Err(SimError::AgentNotFound(_))));
    }

    #[test]
    fn test_conversation_clears_task_and_follow() {
        let mut a = Agent::new("a", "A", Vec2::new(100.0, 100.0));
        a.current_task = Some(Task::patrol(Vec2::new(400.0, 400.0), 0));
        a.following = Some("player".into());
        let mut state = state_with(open_world(), vec![a]);

        apply_command(&mut state, SimCommand::StartConversation { agent: "a".into() }, 10).unwrap();
        let a = state.roster.get(&AgentId::from("a")).unwrap();
        assert!(a.current_task.is_none());
        assert!(a.following.is_none());
        assert_eq!(state.conversation, Some(AgentId::from("a")));

        apply_command(&mut state, SimCommand::EndConversation, 20).unwrap();
        assert!(state.conversation.is_none());
        assert_eq!(state.roster.get(&AgentId::from("a")).unwrap().cooldowns.last_interaction, Some(20));
    }

    #[test]
    fn test_commands_parse_from_json() {
        let command: SimCommand =
            serde_json::from_str(r#"{"command":"follow","agent":"a","target":"player"}"#).unwrap();
        assert_eq!(
            command,
            SimCommand::Follow {
                agent: "a".into(),
                target: Some("player".into())
            }
        );
    }
}
