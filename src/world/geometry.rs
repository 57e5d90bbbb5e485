//! Static world geometry: bounds, zones, obstacles, interactive objects
//!
//! All rectangles arrive pre-padded for sprite footprints; nothing here
//! adds padding.

use serde::{Deserialize, Serialize};

use crate::core::types::{ObjectId, Rect, RoomId};
use crate::world::objects::InteractiveObject;

/// A named rectangular region (room) of the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: RoomId,
    pub rect: Rect,
}

/// Everything the simulation needs to know about the static world
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldGeometry {
    /// Positions outside this rectangle are never valid
    pub bounds: Rect,
    /// Zones are tested in order; the first match wins
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub obstacles: Vec<Rect>,
    #[serde(default)]
    pub objects: Vec<InteractiveObject>,
}

impl WorldGeometry {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            zones: Vec::new(),
            obstacles: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn with_zone(mut self, id: impl Into<String>, rect: Rect) -> Self {
        self.zones.push(Zone { id: RoomId::new(id), rect });
        self
    }

    pub fn with_obstacle(mut self, rect: Rect) -> Self {
        self.obstacles.push(rect);
        self
    }

    pub fn with_object(mut self, id: impl Into<String>, room: impl Into<String>, rect: Rect) -> Self {
        self.objects.push(InteractiveObject {
            id: ObjectId::new(id),
            room_id: RoomId::new(room),
            rect,
        });
        self
    }

    pub fn zone(&self, id: &RoomId) -> Option<&Zone> {
        self.zones.iter().find(|z| &z.id == id)
    }
}
