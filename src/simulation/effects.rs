//! Async collaborators: gossip reaction analysis and artifact creation
//!
//! Loops never await. They push an [`EffectRequest`] onto the state's
//! outbox; the runtime performs it off-tick and feeds the [`EffectOutcome`]
//! back through [`apply_outcome`] as a regular state mutation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::config::EffectsConfig;
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, Millis, ObjectId};
use crate::entity::memory::{MemoryKind, MemoryRecord};
use crate::entity::tasks::Task;
use crate::simulation::events::{AbandonReason, SimulationEvent};
use crate::simulation::state::{SimState, TaskEnd};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionRequest {
    pub listener: AgentId,
    pub speaker: AgentId,
    pub listener_persona: String,
    /// The gossip that was delivered
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRequest {
    pub agent: AgentId,
    pub agent_name: String,
    pub persona: String,
    pub object: ObjectId,
    pub activity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectRequest {
    AnalyzeReaction(ReactionRequest),
    CreateArtifact(ArtifactRequest),
}

impl EffectRequest {
    /// The agent whose state the outcome mutates
    pub fn agent(&self) -> &AgentId {
        match self {
            EffectRequest::AnalyzeReaction(r) => &r.listener,
            EffectRequest::CreateArtifact(r) => &r.agent,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EffectRequest::AnalyzeReaction(_) => "analyze_reaction",
            EffectRequest::CreateArtifact(_) => "create_artifact",
        }
    }
}

/// How a listener took a piece of gossip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EffectResult {
    Reaction(Reaction),
    Artifact(Artifact),
}

#[derive(Debug)]
pub struct EffectOutcome {
    pub request: EffectRequest,
    pub result: Result<EffectResult>,
}

/// Classifies how a listener reacts to gossip
#[async_trait]
pub trait ReactionAnalyzer: Send + Sync {
    async fn analyze(&self, request: &ReactionRequest) -> Result<Reaction>;
}

/// Produces the artifact of a finished creative activity
#[async_trait]
pub trait ArtifactCreator: Send + Sync {
    async fn create(&self, request: &ArtifactRequest) -> Result<Artifact>;
}

const NEGATIVE_WORDS: [&str; 8] = [
    "stole", "lied", "broke", "angry", "fight", "burned", "cheat", "insult",
];
const POSITIVE_WORDS: [&str; 8] = [
    "helped", "gift", "kind", "won", "beautiful", "celebrat", "friend", "thank",
];

/// Offline analyzer: keyword matching over the gossip text
#[derive(Debug, Clone, Default)]
pub struct KeywordReactionAnalyzer;

#[async_trait]
impl ReactionAnalyzer for KeywordReactionAnalyzer {
    async fn analyze(&self, request: &ReactionRequest) -> Result<Reaction> {
        let text = request.description.to_lowercase();
        let negative = NEGATIVE_WORDS.iter().filter(|w| text.contains(*w)).count();
        let positive = POSITIVE_WORDS.iter().filter(|w| text.contains(*w)).count();
        Ok(match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Reaction::Positive,
            std::cmp::Ordering::Less => Reaction::Negative,
            std::cmp::Ordering::Equal => Reaction::Neutral,
        })
    }
}

/// Offline creator: names the artifact after its maker and medium
#[derive(Debug, Clone, Default)]
pub struct TemplateArtifactCreator;

fn medium_for(activity: &str) -> &'static str {
    match activity {
        "paint" => "painting",
        "draw" => "sketch",
        "sculpt" => "sculpture",
        "write" => "story",
        "compose" => "melody",
        _ => "piece",
    }
}

#[async_trait]
impl ArtifactCreator for TemplateArtifactCreator {
    async fn create(&self, request: &ArtifactRequest) -> Result<Artifact> {
        let medium = medium_for(&request.activity);
        Ok(Artifact {
            title: format!("{}'s {}", request.agent_name, medium),
            description: format!("A {} made at the {}", medium, request.object),
        })
    }
}

/// The pair of collaborators the runtime dispatches requests to
#[derive(Clone)]
pub struct Collaborators {
    pub reactions: Arc<dyn ReactionAnalyzer>,
    pub artifacts: Arc<dyn ArtifactCreator>,
    pub timeout: Duration,
}

impl Collaborators {
    pub fn new(
        reactions: Arc<dyn ReactionAnalyzer>,
        artifacts: Arc<dyn ArtifactCreator>,
        timeout: Duration,
    ) -> Self {
        Self {
            reactions,
            artifacts,
            timeout,
        }
    }

    pub fn offline() -> Self {
        Self::new(
            Arc::new(KeywordReactionAnalyzer),
            Arc::new(TemplateArtifactCreator),
            Duration::from_millis(EffectsConfig::default().timeout_ms),
        )
    }

    /// LLM-backed collaborators when enabled and a key is configured,
    /// offline ones otherwise
    pub fn from_config(config: &EffectsConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        if config.use_llm {
            match crate::llm::client::LlmClient::from_config(config) {
                Ok(client) => {
                    let client = Arc::new(client);
                    tracing::info!("Using LLM collaborators");
                    return Self::new(
                        Arc::new(crate::llm::reaction::LlmReactionAnalyzer::new(client.clone())),
                        Arc::new(crate::llm::artifact::LlmArtifactCreator::new(client)),
                        timeout,
                    );
                }
                Err(e) => {
                    tracing::warn!("{} - falling back to offline collaborators", e);
                }
            }
        }
        let mut offline = Self::offline();
        offline.timeout = timeout;
        offline
    }

    /// Run one request to completion (bounded by the timeout)
    pub async fn perform(&self, request: EffectRequest) -> EffectOutcome {
        let result = match &request {
            EffectRequest::AnalyzeReaction(r) => {
                match tokio::time::timeout(self.timeout, self.reactions.analyze(r)).await {
                    Ok(result) => result.map(EffectResult::Reaction),
                    Err(_) => Err(SimError::Collaborator("reaction analysis timed out".into())),
                }
            }
            EffectRequest::CreateArtifact(r) => {
                match tokio::time::timeout(self.timeout, self.artifacts.create(r)).await {
                    Ok(result) => result.map(EffectResult::Artifact),
                    Err(_) => Err(SimError::Collaborator("artifact creation timed out".into())),
                }
            }
        };
        EffectOutcome { request, result }
    }
}

/// Fold a collaborator outcome back into the simulation
///
/// Outcomes for agents that no longer exist are dropped. A failed artifact
/// releases the agent only if it is still on the matching object use.
pub fn apply_outcome(state: &mut SimState, outcome: EffectOutcome, now: Millis) -> Vec<SimulationEvent> {
    let mut events = Vec::new();
    let agent_id = outcome.request.agent().clone();

    match (outcome.request, outcome.result) {
        (EffectRequest::AnalyzeReaction(req), Ok(EffectResult::Reaction(reaction))) => {
            let delta = match reaction {
                Reaction::Positive => state.config.social.positive_reaction_delta,
                Reaction::Negative => state.config.social.negative_reaction_delta,
                Reaction::Neutral => 0.0,
            };
            let Some(listener) = state.roster.get_mut(&req.listener) else {
                return events;
            };
            if delta != 0.0 {
                let score = listener.adjust_relationship(&req.speaker, delta);
                tracing::debug!("{} feels {:?} about {} ({:.0})", req.listener, reaction, req.speaker, score);
                events.push(SimulationEvent::RelationshipChanged {
                    agent: req.listener,
                    toward: req.speaker,
                    delta,
                    score,
                });
            }
        }
        (EffectRequest::CreateArtifact(req), Ok(EffectResult::Artifact(artifact))) => {
            let importance = state.config.social.artifact_memory_importance;
            let capacity = state.config.social.max_memories;
            let Some(agent) = state.roster.get_mut(&req.agent) else {
                return events;
            };
            agent.remember(
                MemoryRecord::new(
                    MemoryKind::Creation,
                    format!("I created \"{}\": {}", artifact.title, artifact.description),
                    importance,
                    now,
                ),
                capacity,
            );
            tracing::info!("{} created \"{}\"", req.agent, artifact.title);
            events.push(SimulationEvent::ArtifactCreated {
                agent: req.agent,
                title: artifact.title,
            });
        }
        (request, Ok(_)) => {
            tracing::warn!("Mismatched outcome for {} request", request.label());
        }
        (request, Err(e)) => {
            tracing::warn!("{} failed for {}: {}", request.label(), agent_id, e);
            events.push(SimulationEvent::EffectFailed {
                agent: agent_id,
                effect: request.label(),
                error: e.to_string(),
            });
            // A failed reaction leaves the chat alone; the gossip was already delivered
            if let EffectRequest::CreateArtifact(req) = &request {
                release_object_use(state, req, now, &mut events);
            }
        }
    }

    events
}

/// Free an agent still bound to the object the failed artifact was for
fn release_object_use(state: &mut SimState, req: &ArtifactRequest, now: Millis, events: &mut Vec<SimulationEvent>) {
    let Some(agent) = state.roster.get_mut(&req.agent) else {
        return;
    };
    let bound = matches!(
        &agent.current_task,
        Some(Task::UseObject { object, .. }) if *object == req.object
    );
    if !bound {
        return;
    }
    agent.is_using_object = false;
    state.end_task(&req.agent, TaskEnd::Abandoned(AbandonReason::EffectFailed), now, events);
}
