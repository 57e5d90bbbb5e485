use serde::{Deserialize, Serialize};

use crate::core::types::Millis;

/// Category of a memory record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Identity-defining background; never gossiped about
    Core,
    Observation,
    Conversation,
    /// Heard second-hand from another agent
    Gossip,
    /// Something the agent made itself
    Creation,
}

/// A single entry of an agent's memory stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub kind: MemoryKind,
    pub description: String,
    /// How impactful (0.0 to 10.0)
    pub importance: f32,
    pub created_at: Millis,
}

impl MemoryRecord {
    pub fn new(kind: MemoryKind, description: impl Into<String>, importance: f32, now: Millis) -> Self {
        Self {
            kind,
            description: description.into(),
            importance: importance.clamp(0.0, 10.0),
            created_at: now,
        }
    }

    pub fn is_shareable(&self) -> bool {
        self.kind != MemoryKind::Core
    }
}

/// Ordered memory stream (oldest first) with a bounded length
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStream {
    records: Vec<MemoryRecord>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a memory, evicting the oldest non-core records beyond `capacity`
    pub fn add(&mut self, record: MemoryRecord, capacity: usize) {
        self.records.push(record);
        while self.records.len() > capacity.max(1) {
            match self.records.iter().position(|r| r.kind != MemoryKind::Core) {
                Some(idx) => {
                    self.records.remove(idx);
                }
                None => break,
            }
        }
    }

    /// Most important record that may be passed on to others
    pub fn most_important_shareable(&self) -> Option<&MemoryRecord> {
        self.records
            .iter()
            .filter(|r| r.is_shareable())
            .max_by(|a, b| {
                a.importance
                    .partial_cmp(&b.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&MemoryRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_clamped() {
        let r = MemoryRecord::new(MemoryKind::Observation, "saw a comet", 42.0, 0);
        assert_eq!(r.importance, 10.0);
    }

    #[test]
    fn test_core_memories_never_shareable() {
        let mut stream = MemoryStream::new();
        stream.add(MemoryRecord::new(MemoryKind::Core, "I grew up by the sea", 9.0, 0), 10);
        stream.add(MemoryRecord::new(MemoryKind::Observation, "the baker burned bread", 4.0, 1), 10);

        let best = stream.most_important_shareable().unwrap();
        assert_eq!(best.description, "the baker burned bread");
    }

    #[test]
    fn test_capacity_evicts_oldest_non_core() {
        let mut stream = MemoryStream::new();
        stream.add(MemoryRecord::new(MemoryKind::Core, "core", 1.0, 0), 2);
        stream.add(MemoryRecord::new(MemoryKind::Observation, "first", 1.0, 1), 2);
        stream.add(MemoryRecord::new(MemoryKind::Observation, "second", 1.0, 2), 2);

        assert_eq!(stream.len(), 2);
        let descriptions: Vec<_> = stream.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descriptions, vec!["core", "second"]);
    }

    #[test]
    fn test_empty_stream_has_nothing_to_share() {
        assert!(MemoryStream::new().most_important_shareable().is_none());
    }
}
