//! Stuck-agent intervention
//!
//! Called by the movement tick once an agent has wanted to move but failed
//! for more than `stuck.threshold_frames` consecutive frames. Either an idle
//! neighbor is sent on a detour, or the stuck agent gives up.

use ordered_float::OrderedFloat;

use crate::core::types::{AgentId, Millis, Vec2};
use crate::entity::tasks::Task;
use crate::simulation::events::{AbandonReason, SimulationEvent};
use crate::simulation::state::{SimState, TaskEnd};
use crate::spatial::sparse_hash::SpatialIndex;

/// What the resolver did
#[derive(Debug, Clone, PartialEq)]
pub enum StuckResolution {
    /// An idle blocker was given a patrol to `target`
    Redirected { blocker: AgentId, target: Vec2 },
    /// The stuck agent's own task (or follow) was dropped
    GaveUp,
}

/// Idle non-player neighbors, those ahead of the agent first, then nearest
fn candidate_blockers(state: &SimState, index: &SpatialIndex, id: &AgentId, pos: Vec2, heading: Vec2) -> Vec<(AgentId, Vec2)> {
    let mut found: Vec<(bool, OrderedFloat<f32>, AgentId, Vec2)> = index
        .query(pos, state.config.stuck.search_radius)
        .into_iter()
        .filter(|n| n.id != *id)
        .filter_map(|n| {
            let agent = state.roster.get_active(&n.id)?;
            if agent.is_player || !agent.is_idle() {
                return None;
            }
            let offset = agent.position - pos;
            let behind = offset.dot(&heading) <= 0.0;
            Some((behind, OrderedFloat(offset.length()), agent.id.clone(), agent.position))
        })
        .collect();

    found.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));
    found.into_iter().map(|(_, _, id, p)| (id, p)).collect()
}

/// A valid point past the blocker: straight away from the stuck agent,
/// else either perpendicular
fn detour_point(state: &SimState, stuck_pos: Vec2, blocker_pos: Vec2, heading: Vec2) -> Option<Vec2> {
    let mut away = (blocker_pos - stuck_pos).normalize();
    if away == Vec2::ZERO {
        away = if heading == Vec2::ZERO { Vec2::new(1.0, 0.0) } else { heading };
    }
    let reach = state.config.stuck.redirect_distance;
    [away, away.perp(), -away.perp()]
        .into_iter()
        .map(|dir| blocker_pos + dir * reach)
        .find(|p| state.validator.is_free(*p))
}

/// Intervene for a stuck agent; always resets its stuck counter
pub fn resolve_stuck(
    state: &mut SimState,
    index: &SpatialIndex,
    id: &AgentId,
    heading: Vec2,
    now: Millis,
    events: &mut Vec<SimulationEvent>,
) -> StuckResolution {
    state.movement.stuck_frames.insert(id.clone(), 0);

    let Some(pos) = state.roster.get(id).map(|a| a.position) else {
        return StuckResolution::GaveUp;
    };

    let redirect = candidate_blockers(state, index, id, pos, heading)
        .into_iter()
        .find_map(|(blocker, bpos)| detour_point(state, pos, bpos, heading).map(|t| (blocker, t)));

    if let Some((blocker, target)) = redirect {
        tracing::debug!("{} is stuck; redirecting idle blocker {}", id, blocker);
        state.assign_task(&blocker, Task::patrol(target, now), events);
        events.push(SimulationEvent::BlockerRedirected {
            stuck: id.clone(),
            blocker: blocker.clone(),
            target,
        });
        return StuckResolution::Redirected { blocker, target };
    }

    tracing::debug!("{} is stuck with no idle blocker; giving up", id);
    let (had_task, room) = match state.roster.get_mut(id) {
        Some(agent) => {
            agent.cooldowns.last_movement_failure = Some(now);
            let had_task = agent.current_task.is_some();
            if !had_task {
                agent.following = None;
            }
            (had_task, agent.room_id.clone())
        }
        None => return StuckResolution::GaveUp,
    };

    if had_task {
        state.end_task(id, TaskEnd::Abandoned(AbandonReason::Stuck), now, events);
    } else {
        state.set_room_cooldown(&room, now);
    }
    StuckResolution::GaveUp
}
