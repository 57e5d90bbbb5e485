//! Movement tick - the per-frame steering pass
//!
//! Order within one tick:
//! due timed actions -> greeting expiry -> index rebuild -> batch selection
//! -> planning (parallel above the threshold) -> batch commit -> arrivals and
//! abandonments -> stuck accounting -> walking-audio edge.
//!
//! No agent observes another agent's uncommitted position from the same tick.

use ahash::AHashSet;
use rand::Rng;
use rayon::prelude::*;

use crate::core::types::{AgentId, Millis};
use crate::simulation::events::SimulationEvent;
use crate::simulation::interaction::{handle_arrival, run_due_actions};
use crate::simulation::state::{SimState, TaskEnd};
use crate::simulation::steering::{plan_agent, PlanOutcome, SteeringPlan};
use crate::simulation::stuck::resolve_stuck;
use crate::spatial::sparse_hash::SpatialIndex;

/// Round-robin slice of the non-locked, non-player roster
///
/// Returns roster indices and advances the cursor by the batch size modulo
/// the eligible count.
fn next_batch(state: &mut SimState) -> Vec<usize> {
    let eligible: Vec<usize> = state
        .roster
        .iter()
        .enumerate()
        .filter(|(_, a)| !a.is_locked && !a.is_player)
        .map(|(i, _)| i)
        .collect();
    if eligible.is_empty() {
        return Vec::new();
    }

    let len = eligible.len();
    let take = state.config.movement.batch_size.min(len);
    let start = state.movement.cursor % len;
    state.movement.cursor = (start + take) % len;

    (0..take).map(|k| eligible[(start + k) % len]).collect()
}

fn expire_greetings(state: &mut SimState, now: Millis) {
    let display_ms = state.config.greeting.display_ms;
    for agent in state.roster.iter_mut() {
        if agent.greeting.is_some() && !agent.has_active_greeting(now, display_ms) {
            agent.greeting = None;
        }
    }
}

/// Run one movement tick at simulation time `now`
pub fn run_movement_tick(state: &mut SimState, now: Millis) -> Vec<SimulationEvent> {
    let mut events = run_due_actions(state, now);

    if state.modal_open {
        return events;
    }

    expire_greetings(state, now);

    let mut index = SpatialIndex::new(state.config.spatial.cell_size);
    index.rebuild(
        state
            .roster
            .iter()
            .filter(|a| !a.is_locked)
            .map(|a| (a.id.clone(), a.position)),
    );

    let display_ms = state.config.greeting.display_ms;
    let batch: Vec<usize> = next_batch(state)
        .into_iter()
        .filter(|&i| {
            let a = state.roster.at(i);
            !a.is_mid_action() && !a.has_active_greeting(now, display_ms)
        })
        .collect();

    // Rolls are drawn up front so planning order never changes outcomes
    let rolled: Vec<(usize, f32)> = batch.into_iter().map(|i| (i, state.rng.gen::<f32>())).collect();

    let plans: Vec<SteeringPlan> = {
        let view: &SimState = state;
        let plan = |&(i, roll): &(usize, f32)| plan_agent(view, &index, view.roster.at(i), roll, now);
        if rolled.len() >= view.config.parallel_threshold {
            rolled.par_iter().map(plan).collect()
        } else {
            rolled.iter().map(plan).collect()
        }
    };

    commit_plans(state, &index, plans, now, &mut events);

    update_walking_audio(state, &mut events);
    state.tick += 1;

    tracing::trace!("tick {} committed", state.tick);
    events
}

fn commit_plans(state: &mut SimState, index: &SpatialIndex, plans: Vec<SteeringPlan>, now: Millis, events: &mut Vec<SimulationEvent>) {
    // Positions and rooms for the whole batch land together
    for plan in plans.iter().filter(|p| p.moved) {
        state.commit_position(&plan.agent, plan.position);
    }

    let mut engaged: AHashSet<AgentId> = AHashSet::new();
    for plan in &plans {
        match plan.outcome {
            Some(PlanOutcome::Arrived) => handle_arrival(state, &plan.agent, now, &mut engaged, events),
            Some(PlanOutcome::Abandon(reason)) => {
                if !engaged.contains(&plan.agent) {
                    state.end_task(&plan.agent, TaskEnd::Abandoned(reason), now, events);
                }
            }
            None => {}
        }
    }

    let threshold = state.config.stuck.threshold_frames;
    let moving_agents: AHashSet<AgentId> = plans.iter().filter(|p| p.moved).map(|p| p.agent.clone()).collect();

    for plan in &plans {
        if plan.moved || !plan.wanted_to_move || plan.outcome.is_some() {
            state.movement.stuck_frames.remove(&plan.agent);
            continue;
        }
        if plan.yielded {
            continue;
        }
        let frames = state.movement.stuck_frames.entry(plan.agent.clone()).or_insert(0);
        *frames += 1;
        let frames = *frames;
        if frames > threshold {
            resolve_stuck(state, index, &plan.agent, plan.heading, now, events);
        }
    }

    state.movement.moved_last_tick = moving_agents;
}

/// Edge-triggered audio cue: any audible agent moving near the player
fn update_walking_audio(state: &mut SimState, events: &mut Vec<SimulationEvent>) {
    let radius = state.config.movement.audible_radius;
    let active = match state.player() {
        Some(player) => state.movement.moved_last_tick.iter().any(|id| {
            state
                .roster
                .get_active(id)
                .is_some_and(|a| !a.is_player && a.position.distance(&player.position) <= radius)
        }),
        None => false,
    };

    if active != state.movement.walking_near_player {
        state.movement.walking_near_player = active;
        events.push(SimulationEvent::WalkingAudio { active });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Rect, Vec2};
    use crate::entity::agent::Agent;
    use crate::entity::tasks::Task;
    use crate::simulation::events::AbandonReason;
    use crate::simulation::state::test_support::*;

    #[test]
    fn test_round_robin_cursor_wraps() {
        let agents = (0..5).map(|i| Agent::new(format!("a{}", i), "A", Vec2::new(10.0 * i as f32, 0.0))).collect();
        let mut state = state_with(open_world(), agents);
        state.config.movement.batch_size = 3;

        let first = next_batch(&mut state);
        let second = next_batch(&mut state);
        let ids = |b: &[usize], s: &SimState| b.iter().map(|&i| s.roster.at(i).id.0.clone()).collect::<Vec<_>>();

        assert_eq!(ids(&first[..], &state), vec!["a0", "a1", "a2"]);
        assert_eq!(ids(&second[..], &state), vec!["a3", "a4", "a0"]);
    }

    #[test]
    fn test_modal_pauses_movement_but_not_timers() {
        let mut a = Agent::new("a", "A", Vec2::new(100.0, 100.0));
        a.current_task = Some(Task::patrol(Vec2::new(400.0, 100.0), 0));
        let mut state = state_with(open_world(), vec![a]);
        state.modal_open = true;

        run_movement_tick(&mut state, 16);
        assert_eq!(state.roster.get(&AgentId::from("a")).unwrap().position, Vec2::new(100.0, 100.0));
        assert_eq!(state.tick, 0);
    }

    #[test]
    fn test_patrol_completes_through_ticks() {
        let mut a = Agent::new("a", "A", Vec2::new(100.0, 100.0));
        a.current_task = Some(Task::patrol(Vec2::new(130.0, 100.0), 0));
        let mut state = state_with(open_world(), vec![a]);

        let mut completed = false;
        for frame in 1..20 {
            let events = run_movement_tick(&mut state, frame * 16);
            completed |= events.iter().any(|e| matches!(e, SimulationEvent::TaskCompleted { .. }));
        }
        assert!(completed);
        assert!(state.roster.get(&AgentId::from("a")).unwrap().current_task.is_none());
    }

    #[test]
    fn test_boxed_in_agent_eventually_gives_up() {
        // A one-cell pocket: every candidate step lands inside an obstacle
        let geometry = open_world()
            .with_obstacle(Rect::new(0.0, 0.0, 1000.0, 99.0))
            .with_obstacle(Rect::new(0.0, 101.0, 1000.0, 1000.0))
            .with_obstacle(Rect::new(0.0, 0.0, 99.0, 1000.0))
            .with_obstacle(Rect::new(101.0, 0.0, 1000.0, 1000.0));
        let mut a = Agent::new("a", "A", Vec2::new(100.0, 100.0));
        a.current_task = Some(Task::patrol(Vec2::new(500.0, 100.0), 0));
        let mut state = state_with(geometry, vec![a]);

        let mut abandoned = false;
        for frame in 1..=40 {
            let events = run_movement_tick(&mut state, frame * 16);
            abandoned |= events.iter().any(|e| {
                matches!(e, SimulationEvent::TaskAbandoned { reason: AbandonReason::Stuck, .. })
            });
        }
        assert!(abandoned);
        let a = state.roster.get(&AgentId::from("a")).unwrap();
        assert!(a.current_task.is_none());
        assert_eq!(a.position, Vec2::new(100.0, 100.0));
    }

    #[test]
    fn test_waiting_agent_keeps_its_task_moving() {
        let mut a = Agent::new("a", "A", Vec2::new(100.0, 100.0));
        a.current_task = Some(Task::patrol(Vec2::new(400.0, 100.0), 0));
        a.waiting_until = Some(10_000);
        let mut state = state_with(open_world(), vec![a]);

        run_movement_tick(&mut state, 16);
        assert!(state.roster.get(&AgentId::from("a")).unwrap().position.x > 100.0);
    }

    #[test]
    fn test_waiting_follower_stays_put() {
        let leader = Agent::new("leader", "L", Vec2::new(400.0, 100.0));
        let mut a = Agent::new("a", "A", Vec2::new(100.0, 100.0));
        a.following = Some(AgentId::from("leader"));
        a.waiting_until = Some(10_000);
        let mut state = state_with(open_world(), vec![leader, a]);

        run_movement_tick(&mut state, 16);
        assert_eq!(state.roster.get(&AgentId::from("a")).unwrap().position, Vec2::new(100.0, 100.0));

        run_movement_tick(&mut state, 10_016);
        assert!(state.roster.get(&AgentId::from("a")).unwrap().position.x > 100.0);
    }

    #[test]
    fn test_walking_audio_is_edge_triggered() {
        let mut a = Agent::new("a", "A", Vec2::new(900.0, 900.0));
        a.current_task = Some(Task::patrol(Vec2::new(700.0, 900.0), 0));
        let mut state = state_with(open_world(), vec![a]);

        let first = run_movement_tick(&mut state, 16);
        assert!(first.contains(&SimulationEvent::WalkingAudio { active: true }));
        let second = run_movement_tick(&mut state, 32);
        assert!(!second.iter().any(|e| matches!(e, SimulationEvent::WalkingAudio { .. })));
    }
}
