//! Parse collaborator replies into simulation types
//!
//! Models are asked for a single JSON object but routinely wrap it in prose
//! or code fences, so the object is cut out of the reply before decoding.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::core::error::{Result, SimError};
use crate::simulation::effects::{Artifact, Reaction};

/// Extract JSON object from LLM response (handles surrounding text)
pub fn extract_json(response: &str) -> Result<&str> {
    let start = response
        .find('{')
        .ok_or_else(|| SimError::LlmError("No JSON found in response".into()))?;
    let end = response
        .rfind('}')
        .ok_or_else(|| SimError::LlmError("No closing brace found in response".into()))?;
    if end < start {
        return Err(SimError::LlmError("Malformed JSON object in response".into()));
    }
    Ok(&response[start..=end])
}

/// Cut the object out of a reply and decode it
pub fn decode_reply<T: DeserializeOwned>(response: &str) -> Result<T> {
    let json = extract_json(response)?;
    serde_json::from_str(json)
        .map_err(|e| SimError::LlmError(format!("Unexpected reply shape: {} - Response: {}", e, response)))
}

#[derive(Debug, Deserialize)]
pub struct ReactionReply {
    pub reaction: Reaction,
}

pub fn check_artifact(artifact: Artifact) -> Result<Artifact> {
    if artifact.title.trim().is_empty() {
        return Err(SimError::LlmError("Artifact title is empty".into()));
    }
    Ok(artifact)
}
