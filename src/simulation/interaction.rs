//! Timed interactions: what happens when an agent reaches its task target,
//! and how chats and object use end
//!
//! Arrival starts the timed state and schedules its end on the
//! [`ActionSchedule`](crate::simulation::schedule::ActionSchedule); the
//! movement tick drains due entries before anything else.

use ahash::AHashSet;

use crate::core::types::{AgentId, Millis, ObjectId};
use crate::entity::memory::{MemoryKind, MemoryRecord};
use crate::entity::tasks::Task;
use crate::simulation::effects::{ArtifactRequest, EffectRequest, ReactionRequest};
use crate::simulation::events::{AbandonReason, SimulationEvent};
use crate::simulation::schedule::ScheduledKind;
use crate::simulation::state::{SimState, TaskEnd};

/// Resolve an arrival reported by the steering plan
///
/// `engaged` holds agents that already started an interaction this tick, so
/// two partners arriving at each other in the same tick start one chat.
pub fn handle_arrival(
    state: &mut SimState,
    id: &AgentId,
    now: Millis,
    engaged: &mut AHashSet<AgentId>,
    events: &mut Vec<SimulationEvent>,
) {
    if engaged.contains(id) {
        return;
    }
    let Some(agent) = state.roster.get(id) else {
        return;
    };
    let Some(task) = agent.current_task.clone() else {
        return;
    };

    match task {
        Task::Patrol { .. } => state.end_task(id, TaskEnd::Completed, now, events),
        Task::Talk { partner, .. } | Task::SmallTalk { partner } => {
            if engaged.contains(&partner) {
                return;
            }
            start_chat(state, id, &partner, now, engaged, events);
        }
        Task::UseObject { object, activity, .. } => {
            if state.objects.get(&object).is_none() {
                state.end_task(id, TaskEnd::Abandoned(AbandonReason::ObjectMissing), now, events);
                return;
            }
            if let Some(agent) = state.roster.get_mut(id) {
                agent.is_using_object = true;
            }
            engaged.insert(id.clone());
            let due = now + state.config.social.object_use_duration_ms;
            tracing::debug!("{} started to {} at {}", id, activity, object);
            events.push(SimulationEvent::ObjectUseStarted {
                agent: id.clone(),
                object: object.clone(),
                activity: activity.clone(),
            });
            state.schedule.schedule(
                due,
                ScheduledKind::FinishObjectUse {
                    agent: id.clone(),
                    object,
                    activity,
                },
            );
        }
    }
}

fn start_chat(
    state: &mut SimState,
    id: &AgentId,
    partner_id: &AgentId,
    now: Millis,
    engaged: &mut AHashSet<AgentId>,
    events: &mut Vec<SimulationEvent>,
) {
    let (Some(agent), Some(partner)) = (state.roster.get(id), state.roster.get_active(partner_id)) else {
        state.end_task(id, TaskEnd::Abandoned(AbandonReason::PartnerMissing), now, events);
        return;
    };
    let (Some(own_task), Some(partner_task)) = (agent.current_task.clone(), partner.current_task.clone()) else {
        state.end_task(id, TaskEnd::Abandoned(AbandonReason::PartnerCancelled), now, events);
        return;
    };
    if !own_task.is_mirrored_by(id, &partner_task) {
        state.end_task(id, TaskEnd::Abandoned(AbandonReason::PartnerCancelled), now, events);
        return;
    }

    // The memory rides on whichever side initiated the gossip
    let shared = match (&own_task, &partner_task) {
        (Task::Talk { memory: Some(m), .. }, _) => Some((id.clone(), partner_id.clone(), m.clone())),
        (_, Task::Talk { memory: Some(m), .. }) => Some((partner_id.clone(), id.clone(), m.clone())),
        _ => None,
    };
    let speaker_name = shared
        .as_ref()
        .and_then(|(speaker, _, _)| state.roster.get(speaker))
        .map(|a| a.name.clone())
        .unwrap_or_default();

    for who in [id, partner_id] {
        if let Some(a) = state.roster.get_mut(who) {
            a.is_chatting = true;
            a.cooldowns.last_interaction = Some(now);
        }
        engaged.insert(who.clone());
    }

    let (initiator, listener) = match &shared {
        Some((speaker, listener, _)) => (speaker.clone(), listener.clone()),
        None => (id.clone(), partner_id.clone()),
    };
    events.push(SimulationEvent::ChatStarted {
        initiator: initiator.clone(),
        partner: listener.clone(),
        task: own_task.kind(),
    });

    let duration = if let Some((speaker, listener, memory)) = shared {
        deliver_gossip(state, &speaker, &speaker_name, &listener, &memory, now, events);
        state.config.social.chat_duration_ms
    } else {
        state.config.social.small_talk_duration_ms
    };

    tracing::debug!("{} and {} started chatting", initiator, listener);
    state.schedule.schedule(
        now + duration,
        ScheduledKind::EndChat {
            initiator,
            partner: listener,
        },
    );
}

fn deliver_gossip(
    state: &mut SimState,
    speaker: &AgentId,
    speaker_name: &str,
    listener: &AgentId,
    memory: &MemoryRecord,
    now: Millis,
    events: &mut Vec<SimulationEvent>,
) {
    let importance = memory.importance * state.config.social.gossip_importance_decay;
    let capacity = state.config.social.max_memories;
    let description = format!("{} told me: {}", speaker_name, memory.description);

    let Some(agent) = state.roster.get_mut(listener) else {
        return;
    };
    agent.remember(
        MemoryRecord::new(MemoryKind::Gossip, description.clone(), importance, now),
        capacity,
    );
    let listener_persona = agent.persona.clone();

    events.push(SimulationEvent::MemoryShared {
        from: speaker.clone(),
        to: listener.clone(),
        description: memory.description.clone(),
    });

    if state.autonomy_enabled {
        state.outbox.push(EffectRequest::AnalyzeReaction(ReactionRequest {
            listener: listener.clone(),
            speaker: speaker.clone(),
            listener_persona,
            description: memory.description.clone(),
        }));
    }
}

/// Pop and apply every scheduled action due at `now`
///
/// Runs even while the modal is open: timed actions are wall-clock based.
pub fn run_due_actions(state: &mut SimState, now: Millis) -> Vec<SimulationEvent> {
    let mut events = Vec::new();
    while let Some(action) = state.schedule.pop_due(now) {
        match action.kind {
            ScheduledKind::EndChat { initiator, partner } => {
                end_chat(state, &initiator, &partner, now, &mut events);
            }
            ScheduledKind::FinishObjectUse { agent, object, activity } => {
                finish_object_use(state, &agent, object, activity, now, &mut events);
            }
        }
    }
    events
}

fn end_chat(state: &mut SimState, initiator: &AgentId, partner: &AgentId, now: Millis, events: &mut Vec<SimulationEvent>) {
    for (who, other) in [(initiator, partner), (partner, initiator)] {
        let holds_chat = match state.roster.get_mut(who) {
            Some(agent) => {
                agent.is_chatting = false;
                agent
                    .current_task
                    .as_ref()
                    .and_then(Task::partner)
                    .is_some_and(|p| p == other)
            }
            None => false,
        };
        if holds_chat {
            state.end_task(who, TaskEnd::Completed, now, events);
        }
    }
    tracing::debug!("{} and {} finished chatting", initiator, partner);
    events.push(SimulationEvent::ChatEnded {
        initiator: initiator.clone(),
        partner: partner.clone(),
    });
}

fn finish_object_use(
    state: &mut SimState,
    id: &AgentId,
    object: ObjectId,
    activity: String,
    now: Millis,
    events: &mut Vec<SimulationEvent>,
) {
    let Some(agent) = state.roster.get_mut(id) else {
        return;
    };
    agent.is_using_object = false;
    let still_using = matches!(
        &agent.current_task,
        Some(Task::UseObject { object: o, .. }) if *o == object
    );
    let agent_name = agent.name.clone();
    let persona = agent.persona.clone();

    if still_using {
        state.end_task(id, TaskEnd::Completed, now, events);
    }
    events.push(SimulationEvent::ObjectUseFinished {
        agent: id.clone(),
        object: object.clone(),
        activity: activity.clone(),
    });

    if state.config.social.creative_activities.iter().any(|a| *a == activity) {
        state.outbox.push(EffectRequest::CreateArtifact(ArtifactRequest {
            agent: id.clone(),
            agent_name,
            persona,
            object,
            activity,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Rect, Vec2};
    use crate::entity::agent::Agent;
    use crate::simulation::state::test_support::*;

    fn talk_pair(state: &mut SimState) {
        let a = AgentId::from("a");
        let b = AgentId::from("b");
        let memory = MemoryRecord::new(MemoryKind::Observation, "the well ran dry", 8.0, 0);
        state.roster.get_mut(&a).unwrap().current_task = Some(Task::Talk {
            partner: b.clone(),
            memory: Some(memory),
            started_at: 0,
        });
        state.roster.get_mut(&b).unwrap().current_task = Some(Task::Talk {
            partner: a,
            memory: None,
            started_at: 0,
        });
    }

    #[test]
    fn test_talk_arrival_shares_memory_and_schedules_end() {
        let mut state = state_with(
            open_world(),
            vec![
                Agent::new("a", "Ada", Vec2::new(100.0, 100.0)),
                Agent::new("b", "Bo", Vec2::new(150.0, 100.0)),
            ],
        );
        talk_pair(&mut state);

        let mut engaged = AHashSet::new();
        let mut events = Vec::new();
        // The listener arriving first still receives the speaker's memory
        handle_arrival(&mut state, &AgentId::from("b"), 1_000, &mut engaged, &mut events);
        handle_arrival(&mut state, &AgentId::from("a"), 1_000, &mut engaged, &mut events);

        let b = state.roster.get(&AgentId::from("b")).unwrap();
        assert!(b.is_chatting);
        let heard = b.memory_stream.last().unwrap();
        assert_eq!(heard.kind, MemoryKind::Gossip);
        assert!(heard.description.contains("the well ran dry"));
        assert!((heard.importance - 6.4).abs() < 1e-4);
        assert_eq!(state.outbox.len(), 1);
        assert_eq!(state.schedule.len(), 1);

        let due = 1_000 + state.config.social.chat_duration_ms;
        let events = run_due_actions(&mut state, due);
        assert!(events.iter().any(|e| matches!(e, SimulationEvent::ChatEnded { .. })));
        for id in ["a", "b"] {
            let agent = state.roster.get(&AgentId::from(id)).unwrap();
            assert!(!agent.is_chatting);
            assert!(agent.current_task.is_none());
        }
        assert!(state.room_on_cooldown(&crate::core::types::RoomId::outside(), 9_000));
    }

    #[test]
    fn test_no_reaction_request_without_autonomy() {
        let mut state = state_with(
            open_world(),
            vec![
                Agent::new("a", "Ada", Vec2::new(100.0, 100.0)),
                Agent::new("b", "Bo", Vec2::new(150.0, 100.0)),
            ],
        );
        state.autonomy_enabled = false;
        talk_pair(&mut state);

        let mut engaged = AHashSet::new();
        let mut events = Vec::new();
        handle_arrival(&mut state, &AgentId::from("a"), 0, &mut engaged, &mut events);
        assert!(state.outbox.is_empty());
    }

    #[test]
    fn test_creative_object_use_requests_artifact() {
        let geometry = open_world().with_object("easel", "outside", Rect::new(100.0, 100.0, 140.0, 120.0));
        let mut agent = Agent::new("a", "Ada", Vec2::new(120.0, 145.0));
        agent.current_task = Some(Task::UseObject {
            object: "easel".into(),
            activity: "paint".into(),
            started_at: 0,
        });
        let mut state = state_with(geometry, vec![agent]);
        let id = AgentId::from("a");

        let mut engaged = AHashSet::new();
        let mut events = Vec::new();
        handle_arrival(&mut state, &id, 500, &mut engaged, &mut events);
        assert!(state.roster.get(&id).unwrap().is_using_object);

        // Not yet due
        assert!(run_due_actions(&mut state, 600).is_empty());

        let due = 500 + state.config.social.object_use_duration_ms;
        let events = run_due_actions(&mut state, due);
        let agent = state.roster.get(&id).unwrap();
        assert!(agent.is_idle());
        assert!(events.iter().any(|e| matches!(e, SimulationEvent::ObjectUseFinished { .. })));
        assert!(matches!(state.outbox[0], EffectRequest::CreateArtifact(_)));
    }

    #[test]
    fn test_partner_gone_before_arrival_abandons() {
        let mut state = state_with(
            open_world(),
            vec![
                Agent::new("a", "Ada", Vec2::new(100.0, 100.0)),
                Agent::new("b", "Bo", Vec2::new(150.0, 100.0)),
            ],
        );
        talk_pair(&mut state);
        state.roster.remove(&AgentId::from("b"));

        let mut engaged = AHashSet::new();
        let mut events = Vec::new();
        handle_arrival(&mut state, &AgentId::from("a"), 0, &mut engaged, &mut events);
        assert!(state.roster.get(&AgentId::from("a")).unwrap().current_task.is_none());
        assert!(matches!(
            events[0],
            SimulationEvent::TaskAbandoned { reason: AbandonReason::PartnerMissing, .. }
        ));
    }
}
