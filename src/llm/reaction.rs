//! LLM-backed gossip reaction analysis

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::llm::client::LlmClient;
use crate::llm::parser::ReactionReply;
use crate::simulation::effects::{Reaction, ReactionAnalyzer, ReactionRequest};

pub struct LlmReactionAnalyzer {
    client: Arc<LlmClient>,
}

impl LlmReactionAnalyzer {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

fn user_prompt(request: &ReactionRequest) -> String {
    let persona = if request.listener_persona.is_empty() {
        "an ordinary townsperson"
    } else {
        request.listener_persona.as_str()
    };
    format!(
        "LISTENER PERSONA:\n{}\n\nGOSSIP HEARD FROM {}:\n{}\n\nClassify the listener's reaction:",
        persona, request.speaker, request.description
    )
}

#[async_trait]
impl ReactionAnalyzer for LlmReactionAnalyzer {
    async fn analyze(&self, request: &ReactionRequest) -> Result<Reaction> {
        tracing::debug!(
            "Analyzing reaction of {} to gossip from {} ({})",
            request.listener,
            request.speaker,
            self.client.model()
        );
        let reply: ReactionReply = self
            .client
            .complete_json(REACTION_SYSTEM_PROMPT, &user_prompt(request))
            .await?;
        Ok(reply.reaction)
    }
}

const REACTION_SYSTEM_PROMPT: &str = r#"You judge how a character in a small town reacts to a piece of gossip.
Consider the listener's persona and whether the news would please, bore, or upset them,
and whether it makes them think better or worse of the person who told them.

OUTPUT FORMAT (JSON only, no explanation):
{"reaction": "positive" | "neutral" | "negative"}

Examples:
Persona "a kind baker", gossip "Mara helped rebuild the bridge" -> {"reaction": "positive"}
Persona "a suspicious guard", gossip "Someone saw Tom near the storehouse at night" -> {"reaction": "negative"}
Persona "a busy merchant", gossip "The weather turned cold" -> {"reaction": "neutral"}
"#;
