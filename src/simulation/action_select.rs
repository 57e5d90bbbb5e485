//! Action selection - utility scoring for the major-decision loop
//!
//! Five candidates are scored for one agent. The strictly highest utility
//! wins; ties go to the earlier candidate in priority order
//! (use object > gossip > small talk > patrol > wander).

use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::config::UtilityConfig;
use crate::core::types::{AgentId, Millis, ObjectId, Vec2};
use crate::entity::agent::{cooldown_elapsed, Agent};
use crate::entity::memory::MemoryRecord;
use crate::simulation::state::PreferredActivity;
use crate::world::collision::CollisionValidator;

/// Another agent in the evaluated agent's room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMate {
    pub id: AgentId,
    pub position: Vec2,
    /// The evaluated agent's affinity toward this one
    pub relationship: f32,
    pub is_animal: bool,
    /// No task and not mid-action; only idle agents can take a mirrored task
    pub idle: bool,
}

/// Context provided to the action selection algorithm
pub struct SelectionContext<'a> {
    pub agent: &'a Agent,
    /// Non-locked, non-player agents sharing the room (excluding `agent`)
    pub room_mates: Vec<RoomMate>,
    /// Set only when the preferred object exists and nobody else is using it
    pub preferred: Option<&'a PreferredActivity>,
    /// Use points of interactive objects in the room
    pub object_points: Vec<Vec2>,
    pub autonomy_enabled: bool,
    pub now: Millis,
    pub config: &'a UtilityConfig,
}

/// Candidates in tie-break priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    UseObject,
    Gossip,
    SmallTalk,
    Patrol,
    Wander,
}

/// The winning action with everything needed to build its task
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    UseObject { object: ObjectId, activity: String },
    Gossip { partner: AgentId, memory: MemoryRecord },
    SmallTalk { partner: AgentId },
    /// Patrol toward a room mate or object; `base` is un-jittered
    Patrol { base: Vec2 },
    Wander,
}

impl Decision {
    pub fn candidate(&self) -> Candidate {
        match self {
            Decision::UseObject { .. } => Candidate::UseObject,
            Decision::Gossip { .. } => Candidate::Gossip,
            Decision::SmallTalk { .. } => Candidate::SmallTalk,
            Decision::Patrol { .. } => Candidate::Patrol,
            Decision::Wander => Candidate::Wander,
        }
    }
}

/// Pick a gossip partner: weighted random with weight = exp(score / temperature)
pub fn choose_weighted_partner<'m, R: Rng>(
    candidates: &[&'m RoomMate],
    temperature: f32,
    rng: &mut R,
) -> Option<&'m RoomMate> {
    if candidates.is_empty() {
        return None;
    }
    // Shift by the max score so exp() cannot overflow
    let max = candidates
        .iter()
        .map(|c| c.relationship)
        .fold(f32::NEG_INFINITY, f32::max);
    let weights: Vec<f32> = candidates
        .iter()
        .map(|c| ((c.relationship - max) / temperature).exp())
        .collect();
    let total: f32 = weights.iter().sum();

    let mut pick = rng.gen::<f32>() * total;
    for (candidate, weight) in candidates.iter().zip(&weights) {
        if pick < *weight {
            return Some(*candidate);
        }
        pick -= weight;
    }
    candidates.last().copied()
}

/// Score every candidate and return the winner
///
/// Scores of unavailable candidates are `None`. Randomness (partner and
/// patrol base choice) is drawn from `rng`.
pub fn select_action<R: Rng>(ctx: &SelectionContext, rng: &mut R) -> (Decision, Vec<(Candidate, Option<f32>)>) {
    let cfg = ctx.config;
    let agent = ctx.agent;
    let mut options: Vec<(Option<f32>, Option<Decision>)> = Vec::with_capacity(5);

    // Use object
    let use_object = ctx
        .preferred
        .filter(|_| ctx.autonomy_enabled)
        .map(|p| Decision::UseObject {
            object: p.object.clone(),
            activity: p.activity.clone(),
        });
    options.push((use_object.as_ref().map(|_| cfg.use_object_bonus), use_object));

    // Gossip
    let mut gossip = (None, None);
    if ctx.autonomy_enabled
        && !agent.is_animal
        && cooldown_elapsed(agent.cooldowns.last_gossip, cfg.gossip_cooldown_ms, ctx.now)
    {
        if let Some(memory) = agent
            .memory_stream
            .most_important_shareable()
            .filter(|m| m.importance > cfg.gossip_importance_floor)
        {
            let listeners: Vec<&RoomMate> = ctx.room_mates.iter().filter(|m| m.idle && !m.is_animal).collect();
            if let Some(partner) = choose_weighted_partner(&listeners, cfg.relationship_temperature, rng) {
                let score = cfg.gossip_base
                    + memory.importance * cfg.gossip_importance_weight
                    + partner.relationship * cfg.gossip_relationship_weight;
                gossip = (
                    Some(score),
                    Some(Decision::Gossip {
                        partner: partner.id.clone(),
                        memory: memory.clone(),
                    }),
                );
            }
        }
    }
    options.push(gossip);

    // Small talk
    let mut small_talk = (None, None);
    if ctx.autonomy_enabled && cooldown_elapsed(agent.cooldowns.last_small_talk, cfg.small_talk_cooldown_ms, ctx.now) {
        let partners: Vec<&RoomMate> = ctx.room_mates.iter().filter(|m| m.idle).collect();
        if let Some(partner) = partners.choose(rng) {
            small_talk = (
                Some(cfg.small_talk_base),
                Some(Decision::SmallTalk {
                    partner: partner.id.clone(),
                }),
            );
        }
    }
    options.push(small_talk);

    // Patrol toward something in the room
    let bases: Vec<Vec2> = ctx
        .room_mates
        .iter()
        .map(|m| m.position)
        .chain(ctx.object_points.iter().copied())
        .collect();
    let patrol = bases.choose(rng).map(|&base| Decision::Patrol { base });
    options.push((patrol.as_ref().map(|_| cfg.patrol_score), patrol));

    options.push((Some(cfg.wander_score), Some(Decision::Wander)));

    let scores: Vec<(Candidate, Option<f32>)> = [
        Candidate::UseObject,
        Candidate::Gossip,
        Candidate::SmallTalk,
        Candidate::Patrol,
        Candidate::Wander,
    ]
    .into_iter()
    .zip(options.iter().map(|(s, _)| *s))
    .collect();

    // Strict improvement only, so earlier candidates win ties
    let mut best: Option<(f32, Decision)> = None;
    for (score, decision) in options {
        let (Some(score), Some(decision)) = (score, decision) else {
            continue;
        };
        if best.as_ref().map_or(true, |(b, _)| score > *b) {
            best = Some((score, decision));
        }
    }

    (best.map(|(_, d)| d).unwrap_or(Decision::Wander), scores)
}

/// A valid point within `radius` of `base`, retried `attempts` times before
/// falling back to `base` itself
pub fn random_point_near<R: Rng>(
    validator: &CollisionValidator,
    rng: &mut R,
    base: Vec2,
    radius: f32,
    attempts: u32,
) -> Vec2 {
    for _ in 0..attempts {
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let dist = rng.gen_range(0.0..=radius.max(0.0));
        let candidate = base + Vec2::new(angle.cos(), angle.sin()) * dist;
        if validator.is_free(candidate) {
            return candidate;
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Rect;
    use crate::entity::memory::MemoryKind;
    use crate::world::geometry::WorldGeometry;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn mate(id: &str, relationship: f32) -> RoomMate {
        RoomMate {
            id: id.into(),
            position: Vec2::new(50.0, 50.0),
            relationship,
            is_animal: false,
            idle: true,
        }
    }

    fn gossiper() -> Agent {
        let mut agent = Agent::new("a", "A", Vec2::ZERO);
        agent.remember(
            MemoryRecord::new(MemoryKind::Observation, "a stranger arrived", 8.0, 0),
            10,
        );
        agent
    }

    #[test]
    fn test_tie_goes_to_use_object() {
        let agent = gossiper();
        let preferred = PreferredActivity {
            object: "easel".into(),
            activity: "paint".into(),
        };
        // gossip = 20 + 8 * 5 + 0 = 60 == use_object_bonus
        let config = UtilityConfig::default();
        let ctx = SelectionContext {
            agent: &agent,
            room_mates: vec![mate("b", 0.0)],
            preferred: Some(&preferred),
            object_points: vec![],
            autonomy_enabled: true,
            now: 1_000_000,
            config: &config,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (decision, scores) = select_action(&ctx, &mut rng);

        assert_eq!(scores[0], (Candidate::UseObject, Some(60.0)));
        assert_eq!(scores[1], (Candidate::Gossip, Some(60.0)));
        assert_eq!(decision.candidate(), Candidate::UseObject);
    }

    #[test]
    fn test_autonomy_off_limits_to_patrol_and_wander() {
        let agent = gossiper();
        let config = UtilityConfig::default();
        let ctx = SelectionContext {
            agent: &agent,
            room_mates: vec![mate("b", 0.0)],
            preferred: None,
            object_points: vec![],
            autonomy_enabled: false,
            now: 1_000_000,
            config: &config,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (decision, scores) = select_action(&ctx, &mut rng);

        assert!(scores[..3].iter().all(|(_, s)| s.is_none()));
        assert_eq!(decision.candidate(), Candidate::Patrol);
    }

    #[test]
    fn test_low_importance_memory_does_not_gossip() {
        let mut agent = Agent::new("a", "A", Vec2::ZERO);
        agent.remember(MemoryRecord::new(MemoryKind::Observation, "it rained", 3.0, 0), 10);
        let config = UtilityConfig::default();
        let ctx = SelectionContext {
            agent: &agent,
            room_mates: vec![mate("b", 0.0)],
            preferred: None,
            object_points: vec![],
            autonomy_enabled: true,
            now: 1_000_000,
            config: &config,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (decision, scores) = select_action(&ctx, &mut rng);
        assert_eq!(scores[1].1, None);
        assert_eq!(decision, Decision::SmallTalk { partner: "b".into() });
    }

    #[test]
    fn test_alone_with_nothing_wanders() {
        let agent = Agent::new("a", "A", Vec2::ZERO);
        let config = UtilityConfig::default();
        let ctx = SelectionContext {
            agent: &agent,
            room_mates: vec![],
            preferred: None,
            object_points: vec![],
            autonomy_enabled: true,
            now: 0,
            config: &config,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(select_action(&ctx, &mut rng).0, Decision::Wander);
    }

    #[test]
    fn test_weighted_partner_prefers_friends() {
        let friend = mate("friend", 100.0);
        let rival = mate("rival", -100.0);
        let candidates = vec![&friend, &rival];
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let friend_picks = (0..1_000)
            .filter(|_| choose_weighted_partner(&candidates, 50.0, &mut rng).unwrap().id == friend.id)
            .count();
        // exp(4) : 1 odds, roughly 98%
        assert!(friend_picks > 950);
    }

    #[test]
    fn test_random_point_falls_back_to_base() {
        let geometry = WorldGeometry::new(Rect::new(0.0, 0.0, 100.0, 100.0))
            .with_obstacle(Rect::new(-1000.0, -1000.0, 1000.0, 1000.0));
        let validator = CollisionValidator::new(&geometry);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let base = Vec2::new(50.0, 50.0);
        assert_eq!(random_point_near(&validator, &mut rng, base, 30.0, 5), base);
    }
}
