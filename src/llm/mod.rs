//! LLM-backed collaborators

pub mod artifact;
pub mod client;
pub mod parser;
pub mod reaction;

pub use artifact::LlmArtifactCreator;
pub use client::LlmClient;
pub use reaction::LlmReactionAnalyzer;
