//! Per-agent steering: goal selection, neighbor avoidance, and collision
//! probing
//!
//! Planning is read-only. Every plan in a tick is computed against the last
//! committed state and the freshly rebuilt spatial index; the movement tick
//! commits them together afterwards.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::core::types::{AgentId, Millis, Vec2};
use crate::entity::agent::{Agent, Disposition};
use crate::entity::tasks::Task;
use crate::simulation::events::AbandonReason;
use crate::simulation::state::SimState;
use crate::spatial::sparse_hash::SpatialIndex;

/// Displacements at or below this are not movement
const MOVE_EPSILON: f32 = 0.01;

/// What the steering pass decided about the agent's task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Within stop distance of the task target
    Arrived,
    Abandon(AbandonReason),
}

/// One agent's result for the current tick
#[derive(Debug, Clone, PartialEq)]
pub struct SteeringPlan {
    pub agent: AgentId,
    pub position: Vec2,
    pub moved: bool,
    /// The agent had a non-zero desired vector before yielding
    pub wanted_to_move: bool,
    /// Desired vector suppressed by the deadlock rule
    pub yielded: bool,
    /// Unit direction toward the goal (zero when idle)
    pub heading: Vec2,
    pub outcome: Option<PlanOutcome>,
}

enum Goal {
    Idle,
    Steer { heading: Vec2, purposeful: bool },
    Arrived,
    Abandon(AbandonReason),
}

fn toward(from: Vec2, target: Vec2, stop_distance: f32, purposeful: bool) -> Goal {
    if from.distance(&target) <= stop_distance {
        Goal::Arrived
    } else {
        Goal::Steer {
            heading: (target - from).normalize(),
            purposeful,
        }
    }
}

/// Desired motion, in priority order: debrief, player conversation, task,
/// follow target
fn resolve_goal(state: &SimState, agent: &Agent, roll: f32, now: Millis) -> Goal {
    let movement = &state.config.movement;

    if let Some(debrief) = state.debriefs.get(&agent.room_id) {
        return match toward(agent.position, debrief.gather_point, movement.debrief_gather_distance, true) {
            Goal::Arrived => Goal::Idle,
            goal => goal,
        };
    }

    if state.conversation.as_ref() == Some(&agent.id) {
        return conversation_goal(state, agent, roll);
    }

    if let Some(task) = &agent.current_task {
        return task_goal(state, agent, task, now);
    }

    if let Some(target_id) = &agent.following {
        if agent.is_waiting_at(now) {
            return Goal::Idle;
        }
        return match state.roster.get_active(target_id) {
            Some(target) => match toward(agent.position, target.position, movement.follow_stop_distance, true) {
                Goal::Arrived => Goal::Idle,
                goal => goal,
            },
            None => Goal::Idle,
        };
    }

    Goal::Idle
}

/// Small random drift relative to the player while talking to them
fn conversation_goal(state: &SimState, agent: &Agent, roll: f32) -> Goal {
    let Some(player) = state.player() else {
        return Goal::Idle;
    };
    let conv = &state.config.conversation;
    let dist = agent.position.distance(&player.position);

    match agent.disposition {
        Disposition::Friendly if roll < conv.approach_chance && dist > conv.min_distance => Goal::Steer {
            heading: (player.position - agent.position).normalize(),
            purposeful: false,
        },
        Disposition::Rude if roll < conv.retreat_chance && dist < conv.max_distance => Goal::Steer {
            heading: (agent.position - player.position).normalize(),
            purposeful: false,
        },
        _ => Goal::Idle,
    }
}

fn task_goal(state: &SimState, agent: &Agent, task: &Task, now: Millis) -> Goal {
    let movement = &state.config.movement;
    match task {
        Task::Patrol { target, started_at } => {
            if now.saturating_sub(*started_at) > movement.patrol_timeout_ms {
                return Goal::Abandon(AbandonReason::PatrolTimeout);
            }
            toward(agent.position, *target, movement.patrol_stop_distance, true)
        }
        Task::Talk { partner, .. } | Task::SmallTalk { partner } => {
            let Some(other) = state.roster.get_active(partner) else {
                return Goal::Abandon(AbandonReason::PartnerMissing);
            };
            let mirrored = other
                .current_task
                .as_ref()
                .is_some_and(|t| task.is_mirrored_by(&agent.id, t));
            if !mirrored {
                return Goal::Abandon(AbandonReason::PartnerCancelled);
            }
            toward(agent.position, other.position, movement.chat_stop_distance, true)
        }
        Task::UseObject { object, activity, .. } => {
            let Some(obj) = state.objects.get(object) else {
                return Goal::Abandon(AbandonReason::ObjectMissing);
            };
            let point = obj.use_point(activity, &state.config.social.activity_offsets);
            toward(agent.position, point, movement.object_stop_distance, true)
        }
    }
}

/// Plan one agent's motion for this tick
///
/// `roll` is a uniform [0, 1) draw made before planning so parallel planning
/// stays deterministic.
pub fn plan_agent(state: &SimState, index: &SpatialIndex, agent: &Agent, roll: f32, now: Millis) -> SteeringPlan {
    let movement = &state.config.movement;
    let pos = agent.position;

    let (heading, purposeful, outcome) = match resolve_goal(state, agent, roll, now) {
        Goal::Idle => (Vec2::ZERO, false, None),
        Goal::Steer { heading, purposeful } => (heading, purposeful, None),
        Goal::Arrived => (Vec2::ZERO, false, Some(PlanOutcome::Arrived)),
        Goal::Abandon(reason) => (Vec2::ZERO, false, Some(PlanOutcome::Abandon(reason))),
    };

    let wanted_to_move = heading != Vec2::ZERO;
    let mut desired = heading;
    let mut avoidance = Vec2::ZERO;
    let mut yielded = false;

    for neighbor in index.query(pos, movement.avoidance_radius) {
        if neighbor.id == agent.id {
            continue;
        }
        let diff = pos - neighbor.position;
        let dist = diff.length();
        if dist >= movement.avoidance_radius {
            continue;
        }
        if dist <= f32::EPSILON {
            // Coincident agents: push apart along x, direction fixed by id order
            let side = if agent.id < neighbor.id { -1.0 } else { 1.0 };
            avoidance += Vec2::new(side, 0.0);
        } else {
            avoidance += diff * (1.0 / (dist * dist));
        }
        if dist < movement.deadlock_distance && neighbor.id > agent.id {
            yielded = true;
        }
    }

    if yielded && wanted_to_move {
        desired = Vec2::ZERO;
    } else {
        yielded = false;
    }

    let blended = desired + avoidance * movement.avoidance_strength;
    let mut position = pos;
    if blended.length() > movement.epsilon {
        let mut speed = movement.base_speed;
        if purposeful && desired != Vec2::ZERO {
            speed *= movement.purposeful_multiplier;
        }
        if agent.room_id.is_outside() {
            speed *= movement.outdoor_multiplier;
        }
        let step = blended.normalize() * speed;
        position = resolve_step(state, pos, step);
    }

    let moved = position.distance(&pos) > MOVE_EPSILON;

    SteeringPlan {
        agent: agent.id.clone(),
        position: if moved { position } else { pos },
        moved,
        wanted_to_move,
        yielded,
        heading,
        outcome,
    }
}

/// Probe the step, deflect by +-45 and +-90 degrees, else reverse; then
/// apply the chosen displacement axis by axis so agents slide along walls
pub(crate) fn resolve_step(state: &SimState, pos: Vec2, step: Vec2) -> Vec2 {
    let validator = &state.validator;
    let candidates = [
        step,
        step.rotate(FRAC_PI_4),
        step.rotate(-FRAC_PI_4),
        step.rotate(FRAC_PI_2),
        step.rotate(-FRAC_PI_2),
    ];
    let chosen = candidates
        .into_iter()
        .find(|c| validator.is_free(pos + *c))
        .unwrap_or(-step);

    [chosen, Vec2::new(chosen.x, 0.0), Vec2::new(0.0, chosen.y)]
        .into_iter()
        .map(|d| pos + d)
        .find(|p| validator.is_free(*p))
        .unwrap_or(pos)
}
