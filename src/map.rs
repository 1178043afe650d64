//! Distance-map interface.
//!
//! The occupancy/distance service is an external collaborator; the core
//! only issues point queries. `BoxWorld` is a small in-process
//! implementation backed by axis-aligned boxes, enough for co-simulation
//! and tests.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::types::Vec3;
use crate::MAX_STATIC_BOXES;

/// Read-only distance-map queries consumed by the core.
///
/// Implementations must stay immutable for the duration of one replanning
/// tick; swap-in atomicity is the map service's responsibility.
pub trait DistanceMap {
    /// Euclidean distance from the point to the nearest static obstacle
    fn distance_at(&self, point: Vec3) -> f64;

    /// Grid resolution of the underlying field (m)
    fn resolution(&self) -> f64;
}

/// Axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from its corners
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box centered at a point with the given side lengths
    pub fn centered(center: Vec3, side: Vec3) -> Self {
        let half = side * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Distance from a point to this box, zero inside
    pub fn distance_to_point(&self, point: Vec3) -> f64 {
        let cx = point.x.clamp(self.min.x, self.max.x);
        let cy = point.y.clamp(self.min.y, self.max.y);
        let cz = point.z.clamp(self.min.z, self.max.z);
        point.distance(&Vec3::new(cx, cy, cz))
    }

    /// True when the point lies inside (inclusive)
    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

/// Distance field over a set of static boxes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxWorld {
    boxes: Vec<Aabb, MAX_STATIC_BOXES>,
    resolution: f64,
}

impl BoxWorld {
    /// Empty world with the given grid resolution
    pub fn new(resolution: f64) -> Self {
        Self {
            boxes: Vec::new(),
            resolution,
        }
    }

    /// Register a static box; returns false when the world is full
    pub fn add_box(&mut self, aabb: Aabb) -> bool {
        self.boxes.push(aabb).is_ok()
    }

    /// Number of registered boxes
    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }
}

impl DistanceMap for BoxWorld {
    fn distance_at(&self, point: Vec3) -> f64 {
        let mut min_dist = f64::INFINITY;
        for aabb in &self.boxes {
            let dist = aabb.distance_to_point(point);
            if dist < min_dist {
                min_dist = dist;
            }
        }
        min_dist
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_distance() {
        let b = Aabb::centered(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        assert_eq!(b.distance_to_point(Vec3::new(0.5, 0.0, 0.0)), 0.0);
        assert!((b.distance_to_point(Vec3::new(3.0, 0.0, 0.0)) - 2.0).abs() < 1e-12);
        assert!((b.distance_to_point(Vec3::new(2.0, 2.0, 0.0)) - libm::sqrt(2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_box_world_distance() {
        let mut world = BoxWorld::new(0.1);
        assert!(world.distance_at(Vec3::ZERO).is_infinite());

        world.add_box(Aabb::centered(Vec3::new(2.5, 0.0, 1.0), Vec3::new(1.0, 1.0, 1.0)));
        assert!((world.distance_at(Vec3::new(0.0, 0.0, 1.0)) - 2.0).abs() < 1e-12);
        assert_eq!(world.distance_at(Vec3::new(2.5, 0.0, 1.0)), 0.0);
    }
}
