//! Point validity and room lookup over static geometry
//!
//! Pure and side-effect free: steering checks several candidate points per
//! agent per tick.

use crate::core::types::{AgentId, Rect, RoomId, Vec2};
use crate::world::geometry::{WorldGeometry, Zone};

#[derive(Debug, Clone)]
pub struct CollisionValidator {
    bounds: Rect,
    obstacles: Vec<Rect>,
    zones: Vec<Zone>,
}

impl CollisionValidator {
    pub fn new(geometry: &WorldGeometry) -> Self {
        Self {
            bounds: geometry.bounds,
            obstacles: geometry.obstacles.clone(),
            zones: geometry.zones.clone(),
        }
    }

    /// Whether `pos` is in bounds and outside every obstacle interior
    ///
    /// A drag in progress always wins so the user is never blocked mid-drag.
    /// `_moving_agent` identifies the caller for future per-agent rules and is
    /// not consulted today.
    pub fn is_valid(&self, pos: Vec2, is_dragging: bool, _moving_agent: Option<&AgentId>) -> bool {
        if is_dragging {
            return true;
        }
        if !self.bounds.contains_closed(pos) {
            return false;
        }
        !self.obstacles.iter().any(|o| o.contains_strict(pos))
    }

    /// Shorthand for the common non-drag check
    #[inline]
    pub fn is_free(&self, pos: Vec2) -> bool {
        self.is_valid(pos, false, None)
    }

    /// Id of the first zone containing `pos`, or the outside room
    pub fn room_for(&self, pos: Vec2) -> RoomId {
        self.zones
            .iter()
            .find(|z| z.rect.contains_closed(pos))
            .map(|z| z.id.clone())
            .unwrap_or_else(RoomId::outside)
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> CollisionValidator {
        let geometry = WorldGeometry::new(Rect::new(0.0, 0.0, 1000.0, 800.0))
            .with_zone("cafe", Rect::new(0.0, 0.0, 300.0, 300.0))
            .with_zone("cafe_annex", Rect::new(200.0, 0.0, 400.0, 300.0))
            .with_obstacle(Rect::new(100.0, 50.0, 150.0, 150.0));
        CollisionValidator::new(&geometry)
    }

    #[test]
    fn test_out_of_bounds_invalid() {
        let v = validator();
        assert!(!v.is_free(Vec2::new(-1.0, 10.0)));
        assert!(!v.is_free(Vec2::new(10.0, 801.0)));
        assert!(v.is_free(Vec2::new(1000.0, 800.0)));
    }

    #[test]
    fn test_obstacle_interior_is_half_open() {
        let v = validator();
        assert!(!v.is_free(Vec2::new(120.0, 100.0)));
        // Edges are not interior
        assert!(v.is_free(Vec2::new(100.0, 100.0)));
        assert!(v.is_free(Vec2::new(120.0, 150.0)));
    }

    #[test]
    fn test_drag_overrides_everything() {
        let v = validator();
        assert!(v.is_valid(Vec2::new(120.0, 100.0), true, None));
        assert!(v.is_valid(Vec2::new(-500.0, -500.0), true, None));
    }

    #[test]
    fn test_room_for_first_match_wins() {
        let v = validator();
        assert_eq!(v.room_for(Vec2::new(250.0, 10.0)), RoomId::from("cafe"));
        assert_eq!(v.room_for(Vec2::new(350.0, 10.0)), RoomId::from("cafe_annex"));
        // Closed test: the boundary belongs to the zone
        assert_eq!(v.room_for(Vec2::new(300.0, 300.0)), RoomId::from("cafe"));
        assert!(v.room_for(Vec2::new(900.0, 700.0)).is_outside());
    }
}
