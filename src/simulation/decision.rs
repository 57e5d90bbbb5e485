//! Task assignment loops
//!
//! The step loop hands out short random patrols. The major-decision loop
//! wakes rooms and assigns at most one utility-chosen activity per room.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::types::{AgentId, Millis, RoomId};
use crate::entity::agent::{cooldown_elapsed, Agent};
use crate::entity::tasks::Task;
use crate::simulation::action_select::{random_point_near, select_action, Decision, RoomMate, SelectionContext};
use crate::simulation::events::SimulationEvent;
use crate::simulation::state::SimState;

/// Whether an agent may receive an autonomous task at all right now
fn is_assignable(state: &SimState, agent: &Agent, now: Millis) -> bool {
    let decisions = &state.config.decisions;
    !agent.is_locked
        && !agent.is_player
        && agent.is_idle()
        && agent.following.is_none()
        && !agent.is_waiting_at(now)
        && state.conversation.as_ref() != Some(&agent.id)
        && !decisions.stationary_agents.contains(&agent.id)
        && !decisions.excluded_rooms.contains(&agent.room_id)
        && cooldown_elapsed(
            agent.cooldowns.last_movement_failure,
            decisions.movement_failure_cooldown_ms,
            now,
        )
}

/// Step loop: random short patrols
///
/// Outdoor and animal agents roll against the outdoor chance. Indoor agents
/// only roll while the player shares their room.
pub fn run_step_loop(state: &mut SimState, now: Millis) -> Vec<SimulationEvent> {
    let mut events = Vec::new();
    if state.modal_open {
        return events;
    }

    let player_room = state.player_room();
    let decisions = state.config.decisions.clone();

    let candidates: Vec<(AgentId, crate::core::types::Vec2, f32)> = state
        .roster
        .iter()
        .filter(|a| is_assignable(state, a, now))
        .filter_map(|a| {
            let chance = if a.room_id.is_outside() || a.is_animal {
                decisions.outdoor_patrol_chance
            } else if player_room.as_ref() == Some(&a.room_id) {
                decisions.indoor_patrol_chance
            } else {
                return None;
            };
            Some((a.id.clone(), a.position, chance))
        })
        .collect();

    for (id, position, chance) in candidates {
        if state.rng.gen::<f32>() >= chance {
            continue;
        }
        let target = random_point_near(
            &state.validator,
            &mut state.rng,
            position,
            decisions.patrol_radius,
            decisions.point_attempts,
        );
        tracing::trace!("{} patrols to ({:.0}, {:.0})", id, target.x, target.y);
        state.assign_task(&id, Task::patrol(target, now), &mut events);
    }

    events
}

/// A room already hosting a major activity
fn room_is_busy(state: &SimState, room: &RoomId) -> bool {
    state.roster.iter().any(|a| {
        !a.is_locked
            && &a.room_id == room
            && (a.is_mid_action() || a.current_task.as_ref().is_some_and(Task::is_major))
    })
}

fn room_mates(state: &SimState, agent: &Agent) -> Vec<RoomMate> {
    state
        .roster
        .iter()
        .filter(|o| !o.is_locked && !o.is_player && o.id != agent.id && o.room_id == agent.room_id)
        .map(|o| RoomMate {
            id: o.id.clone(),
            position: o.position,
            relationship: agent.relationship_with(&o.id),
            is_animal: o.is_animal,
            idle: o.is_idle() && state.conversation.as_ref() != Some(&o.id),
        })
        .collect()
}

/// Major-decision loop: one utility-chosen task per woken room
pub fn run_major_loop(state: &mut SimState, now: Millis) -> Vec<SimulationEvent> {
    let mut events = Vec::new();
    if state.modal_open {
        return events;
    }

    let player_room = state.player_room();

    // BTreeMap keeps room iteration, and thus rng consumption, stable
    let mut rooms: BTreeMap<RoomId, Vec<AgentId>> = BTreeMap::new();
    for agent in state.roster.iter().filter(|a| is_assignable(state, a, now)) {
        rooms.entry(agent.room_id.clone()).or_default().push(agent.id.clone());
    }

    for (room, members) in rooms {
        if room_is_busy(state, &room) || state.room_on_cooldown(&room, now) {
            continue;
        }
        if !room.is_outside() && player_room.as_ref() != Some(&room) {
            continue;
        }
        if state.rng.gen::<f32>() >= state.config.decisions.room_wake_probability {
            continue;
        }
        let Some(chosen) = members.choose(&mut state.rng).cloned() else {
            continue;
        };
        assign_major(state, &chosen, now, &mut events);
    }

    events
}

fn assign_major(state: &mut SimState, id: &AgentId, now: Millis, events: &mut Vec<SimulationEvent>) {
    let Some(agent) = state.roster.get(id) else {
        return;
    };

    let preferred = state.preferred_activities.get(id).filter(|p| {
        state.objects.get(&p.object).is_some()
            && !state.roster.iter().any(|o| {
                o.id != *id && matches!(&o.current_task, Some(Task::UseObject { object, .. }) if *object == p.object)
            })
    });
    let offsets = &state.config.social.activity_offsets;
    let ctx = SelectionContext {
        agent,
        room_mates: room_mates(state, agent),
        preferred,
        object_points: state.objects.in_room(&agent.room_id).map(|o| o.use_point("", offsets)).collect(),
        autonomy_enabled: state.autonomy_enabled,
        now,
        config: &state.config.utility,
    };
    let position = agent.position;
    let (decision, scores) = select_action(&ctx, &mut state.rng);

    tracing::debug!("{} chose {:?} (scores {:?})", id, decision.candidate(), scores);

    let decisions = state.config.decisions.clone();
    match decision {
        Decision::UseObject { object, activity } => {
            state.assign_task(
                id,
                Task::UseObject {
                    object,
                    activity,
                    started_at: now,
                },
                events,
            );
        }
        Decision::Gossip { partner, memory } => {
            state.assign_task(
                id,
                Task::Talk {
                    partner: partner.clone(),
                    memory: Some(memory),
                    started_at: now,
                },
                events,
            );
            state.assign_task(
                &partner,
                Task::Talk {
                    partner: id.clone(),
                    memory: None,
                    started_at: now,
                },
                events,
            );
            if let Some(a) = state.roster.get_mut(id) {
                a.cooldowns.last_gossip = Some(now);
            }
        }
        Decision::SmallTalk { partner } => {
            state.assign_task(id, Task::SmallTalk { partner: partner.clone() }, events);
            state.assign_task(&partner, Task::SmallTalk { partner: id.clone() }, events);
            for who in [id, &partner] {
                if let Some(a) = state.roster.get_mut(who) {
                    a.cooldowns.last_small_talk = Some(now);
                }
            }
        }
        Decision::Patrol { base } => {
            let target = random_point_near(
                &state.validator,
                &mut state.rng,
                base,
                decisions.target_jitter,
                decisions.point_attempts,
            );
            state.assign_task(id, Task::patrol(target, now), events);
        }
        Decision::Wander => {
            let target = random_point_near(
                &state.validator,
                &mut state.rng,
                position,
                decisions.patrol_radius,
                decisions.point_attempts,
            );
            state.assign_task(id, Task::patrol(target, now), events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Rect, Vec2};
    use crate::entity::memory::{MemoryKind, MemoryRecord};
    use crate::simulation::state::test_support::*;

    fn town() -> crate::world::geometry::WorldGeometry {
        open_world()
            .with_zone("cafe", Rect::new(0.0, 0.0, 300.0, 300.0))
            .with_zone("dungeon", Rect::new(700.0, 0.0, 1000.0, 300.0))
    }

    #[test]
    fn test_step_loop_patrols_outdoor_agents_only() {
        let outdoor = Agent::new("out", "Out", Vec2::new(500.0, 500.0));
        let indoor = Agent::new("in", "In", Vec2::new(100.0, 100.0));
        let jailed = Agent::new("jail", "Jail", Vec2::new(800.0, 100.0)).as_animal("squeak");
        let mut state = state_with(town(), vec![outdoor, indoor, jailed]);
        state.config.decisions.outdoor_patrol_chance = 1.0;
        state.config.decisions.indoor_patrol_chance = 1.0;

        let events = run_step_loop(&mut state, 1_000);

        assert_eq!(events.len(), 1);
        assert!(state.roster.get(&AgentId::from("out")).unwrap().current_task.is_some());
        // Player is outside, so the cafe is not eligible
        assert!(state.roster.get(&AgentId::from("in")).unwrap().current_task.is_none());
        // Dungeon is excluded even for animals
        assert!(state.roster.get(&AgentId::from("jail")).unwrap().current_task.is_none());
    }

    #[test]
    fn test_step_loop_skips_recent_movement_failure() {
        let mut agent = Agent::new("a", "A", Vec2::new(500.0, 500.0));
        agent.cooldowns.last_movement_failure = Some(900);
        let mut state = state_with(town(), vec![agent]);
        state.config.decisions.outdoor_patrol_chance = 1.0;

        assert!(run_step_loop(&mut state, 1_000).is_empty());
        assert_eq!(run_step_loop(&mut state, 20_000).len(), 1);
    }

    #[test]
    fn test_major_loop_pairs_small_talk() {
        let a = Agent::new("a", "A", Vec2::new(500.0, 500.0));
        let b = Agent::new("b", "B", Vec2::new(560.0, 500.0));
        let mut state = state_with(town(), vec![a, b]);
        state.config.decisions.room_wake_probability = 1.0;

        run_major_loop(&mut state, 1_000);

        let a = state.roster.get(&AgentId::from("a")).unwrap();
        let b = state.roster.get(&AgentId::from("b")).unwrap();
        let (Some(ta), Some(tb)) = (&a.current_task, &b.current_task) else {
            panic!("both agents should hold a task");
        };
        assert!(ta.is_mirrored_by(&a.id, tb));
        assert!(tb.is_mirrored_by(&b.id, ta));
        assert_eq!(a.cooldowns.last_small_talk, Some(1_000));
        assert_eq!(b.cooldowns.last_small_talk, Some(1_000));
    }

    #[test]
    fn test_major_loop_gossip_stamps_initiator() {
        let mut a = Agent::new("a", "A", Vec2::new(500.0, 500.0));
        a.remember(MemoryRecord::new(MemoryKind::Observation, "the mayor resigned", 9.0, 0), 10);
        let mut b = Agent::new("b", "B", Vec2::new(560.0, 500.0));
        // b has nothing to share and small talk on cooldown, so only a can gossip
        b.cooldowns.last_small_talk = Some(900);
        a.cooldowns.last_small_talk = Some(900);
        let mut state = state_with(town(), vec![a, b]);
        state.config.decisions.room_wake_probability = 1.0;

        // Run until the room picks `a` (selection is random among members)
        for attempt in 0..20u64 {
            state.room_cooldowns.clear();
            for agent in state.roster.iter_mut() {
                agent.current_task = None;
            }
            run_major_loop(&mut state, 1_000 + attempt);
            if matches!(
                state.roster.get(&AgentId::from("a")).unwrap().current_task,
                Some(Task::Talk { memory: Some(_), .. })
            ) {
                break;
            }
        }

        let a = state.roster.get(&AgentId::from("a")).unwrap();
        assert!(matches!(a.current_task, Some(Task::Talk { memory: Some(_), .. })));
        assert!(a.cooldowns.last_gossip.is_some());
        let b = state.roster.get(&AgentId::from("b")).unwrap();
        assert!(matches!(b.current_task, Some(Task::Talk { memory: None, .. })));
        assert!(b.cooldowns.last_gossip.is_none());
    }

    #[test]
    fn test_major_loop_respects_busy_room_and_cooldown() {
        let mut busy = Agent::new("busy", "Busy", Vec2::new(400.0, 500.0));
        busy.is_using_object = true;
        let idle = Agent::new("idle", "Idle", Vec2::new(500.0, 500.0));
        let mut state = state_with(town(), vec![busy, idle]);
        state.config.decisions.room_wake_probability = 1.0;

        assert!(run_major_loop(&mut state, 1_000).is_empty());

        state.roster.get_mut(&AgentId::from("busy")).unwrap().is_using_object = false;
        state.set_room_cooldown(&RoomId::outside(), 1_000);
        assert!(run_major_loop(&mut state, 2_000).is_empty());
        assert!(!run_major_loop(&mut state, 50_000).is_empty());
    }

    #[test]
    fn test_indoor_room_needs_player() {
        let a = Agent::new("a", "A", Vec2::new(100.0, 100.0));
        let b = Agent::new("b", "B", Vec2::new(150.0, 100.0));
        let mut state = state_with(town(), vec![a, b]);
        state.config.decisions.room_wake_probability = 1.0;

        assert!(run_major_loop(&mut state, 1_000).is_empty());

        state.commit_position(&AgentId::from("player"), Vec2::new(200.0, 200.0));
        assert!(!run_major_loop(&mut state, 2_000).is_empty());
    }

    #[test]
    fn test_modal_pauses_decisions() {
        let mut state = state_with(town(), vec![Agent::new("a", "A", Vec2::new(500.0, 500.0))]);
        state.config.decisions.outdoor_patrol_chance = 1.0;
        state.config.decisions.room_wake_probability = 1.0;
        state.modal_open = true;

        assert!(run_step_loop(&mut state, 1_000).is_empty());
        assert!(run_major_loop(&mut state, 1_000).is_empty());
    }
}
