//! LLM-backed artifact creation for finished creative activities

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::llm::client::LlmClient;
use crate::llm::parser::check_artifact;
use crate::simulation::effects::{Artifact, ArtifactCreator, ArtifactRequest};

pub struct LlmArtifactCreator {
    client: Arc<LlmClient>,
}

impl LlmArtifactCreator {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactCreator for LlmArtifactCreator {
    async fn create(&self, request: &ArtifactRequest) -> Result<Artifact> {
        let user = format!(
            "ARTIST: {}\nPERSONA: {}\nACTIVITY: {}\nWORKSTATION: {}\n\nDescribe what they made:",
            request.agent_name, request.persona, request.activity, request.object
        );
        let artifact = check_artifact(self.client.complete_json(ARTIFACT_SYSTEM_PROMPT, &user).await?)?;
        tracing::debug!("LLM artifact for {}: \"{}\"", request.agent, artifact.title);
        Ok(artifact)
    }
}

const ARTIFACT_SYSTEM_PROMPT: &str = r#"You invent the artwork a character just finished in a cozy town simulation.
The work must fit the activity (a painting for "paint", a melody for "compose", and so on)
and reflect the artist's persona. Keep the title under eight words and the description to one sentence.

OUTPUT FORMAT (JSON only, no explanation):
{"title": "...", "description": "..."}
"#;
