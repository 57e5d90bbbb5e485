//! Interactive object catalog and queries

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::types::{ObjectId, Rect, RoomId, Vec2};

/// An object agents can walk to and operate (easel, bookshelf, piano...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveObject {
    pub id: ObjectId,
    pub room_id: RoomId,
    /// Bounding box (already padded)
    pub rect: Rect,
}

impl InteractiveObject {
    /// Where an agent stands to perform `activity`: just below the box,
    /// shifted by the activity's configured offset
    pub fn use_point(&self, activity: &str, offsets: &AHashMap<String, Vec2>) -> Vec2 {
        let base = Vec2::new(self.rect.center().x, self.rect.y2);
        let offset = offsets.get(activity).copied().unwrap_or(Vec2::new(0.0, 10.0));
        base + offset
    }
}

/// Storage for all interactive objects
#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
    objects: Vec<InteractiveObject>,
    by_id: AHashMap<ObjectId, usize>,
}

impl ObjectCatalog {
    pub fn new(objects: Vec<InteractiveObject>) -> Self {
        let by_id = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.id.clone(), i))
            .collect();
        Self { objects, by_id }
    }

    /// Get an object by ID
    pub fn get(&self, id: &ObjectId) -> Option<&InteractiveObject> {
        self.by_id.get(id).map(|&i| &self.objects[i])
    }

    /// Objects located in `room`
    pub fn in_room<'a>(&'a self, room: &'a RoomId) -> impl Iterator<Item = &'a InteractiveObject> + 'a {
        self.objects.iter().filter(move |o| &o.room_id == room)
    }

    /// Iterate over all objects
    pub fn iter(&self) -> impl Iterator<Item = &InteractiveObject> {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
