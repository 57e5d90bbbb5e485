//! Greeting loop
//!
//! Outdoor agents passing each other exchange a short phrase (or, for
//! animals, their sound). Indoor rooms never produce greetings.

use ahash::AHashSet;
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::config::GreetingConfig;
use crate::core::types::{AgentId, Millis};
use crate::entity::agent::{cooldown_elapsed, Agent, Greeting};
use crate::simulation::events::SimulationEvent;
use crate::simulation::state::SimState;
use crate::spatial::sparse_hash::SpatialIndex;

/// Whether an agent can take part in a greeting right now
fn is_available(agent: &Agent, config: &GreetingConfig, now: Millis) -> bool {
    !agent.is_chatting
        && !agent.is_using_object
        && !agent.has_active_greeting(now, config.display_ms)
        && cooldown_elapsed(agent.cooldowns.last_interaction, config.cooldown_ms, now)
}

fn greeting_text<R: Rng>(agent: &Agent, config: &GreetingConfig, rng: &mut R) -> String {
    if agent.is_animal {
        return agent.sound.clone().unwrap_or_else(|| config.default_animal_sound.clone());
    }
    config
        .phrases
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| "Hi!".to_string())
}

/// Run one greeting cycle at `now`
pub fn run_greeter(state: &mut SimState, now: Millis) -> Vec<SimulationEvent> {
    let mut events = Vec::new();
    if state.modal_open {
        return events;
    }

    let config = state.config.greeting.clone();

    // The player is indexed as a possible partner but never initiates
    let mut index = SpatialIndex::new(state.config.greeting_cell_size());
    index.rebuild(
        state
            .roster
            .iter()
            .filter(|a| !a.is_locked && a.room_id.is_outside())
            .map(|a| (a.id.clone(), a.position)),
    );

    let initiators: Vec<AgentId> = state
        .roster
        .iter()
        .filter(|a| !a.is_locked && !a.is_player && a.room_id.is_outside())
        .map(|a| a.id.clone())
        .collect();

    let mut greeted: AHashSet<AgentId> = AHashSet::new();

    for id in initiators {
        if greeted.contains(&id) {
            continue;
        }
        let Some(agent) = state.roster.get(&id) else {
            continue;
        };
        if !is_available(agent, &config, now) {
            continue;
        }

        let partner = index
            .query(agent.position, config.distance)
            .into_iter()
            .filter(|n| n.id != id && !greeted.contains(&n.id))
            .filter_map(|n| {
                let other = state.roster.get_active(&n.id)?;
                if other.room_id != agent.room_id || !is_available(other, &config, now) {
                    return None;
                }
                Some((OrderedFloat(other.position.distance(&agent.position)), other.id.clone()))
            })
            .min();
        let Some((_, partner)) = partner else {
            continue;
        };

        greeted.insert(id.clone());
        greeted.insert(partner.clone());

        let text = greeting_text(agent, &config, &mut state.rng);
        let partner_is_player = state.roster.get(&partner).is_some_and(|p| p.is_player);
        let reply = match state.roster.get(&partner) {
            Some(p) if !partner_is_player => Some(greeting_text(p, &config, &mut state.rng)),
            _ => None,
        };

        tracing::trace!("{} greets {}: {}", id, partner, text);

        if let Some(a) = state.roster.get_mut(&id) {
            a.greeting = Some(Greeting {
                text: text.clone(),
                timestamp: now,
            });
            a.cooldowns.last_interaction = Some(now);
        }
        events.push(SimulationEvent::Greeted {
            from: id.clone(),
            to: partner.clone(),
            text,
        });

        if let Some(p) = state.roster.get_mut(&partner) {
            p.cooldowns.last_interaction = Some(now);
            if let Some(reply) = reply {
                p.greeting = Some(Greeting {
                    text: reply.clone(),
                    timestamp: now,
                });
                events.push(SimulationEvent::Greeted {
                    from: partner.clone(),
                    to: id.clone(),
                    text: reply,
                });
            }
        }
    }

    events
}
