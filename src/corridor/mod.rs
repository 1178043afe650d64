//! Safe corridor construction.
//!
//! Two families of per-segment constraints bound the next trajectory:
//! Linear Safe Corridors (half-spaces against every neighbor and dynamic
//! obstacle) and Safe Flight Corridors (axis-aligned boxes against the
//! static environment). Both constrain control points directly; the
//! convex-hull property of the Bernstein basis extends the guarantee to
//! the whole curve.

pub mod lsc;
pub mod sfc;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Vec3};
use crate::{MAX_LSC, MAX_SEGMENTS};

/// Oriented half-space constraint on one segment's control points:
/// coeffs . (x - point) >= margin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lsc {
    /// Segment the constraint applies to
    pub segment_idx: usize,
    /// Neighbor the constraint separates from
    pub neighbor: AgentId,
    /// Constraint coefficients in world coordinates (downwash-scaled
    /// normal, not necessarily unit length)
    pub coeffs: Vec3,
    /// Point on the separating plane
    pub point: Vec3,
    /// Required signed distance
    pub margin: f64,
}

impl Lsc {
    /// Signed slack of a point under this constraint (negative = violated)
    pub fn slack(&self, x: Vec3) -> f64 {
        self.coeffs.dot(&(x - self.point)) - self.margin
    }
}

/// Axis-aligned box constraint on one segment's control points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sfc {
    /// Segment the box applies to
    pub segment_idx: usize,
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Sfc {
    /// True when the point lies inside the box (inclusive)
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// All corridor constraints for one replanning tick
#[derive(Debug, Clone, Default)]
pub struct CorridorSet {
    /// Inter-agent and dynamic-obstacle half-spaces
    pub lscs: Vec<Lsc, MAX_LSC>,
    /// Static-environment boxes, one per segment
    pub sfcs: Vec<Sfc, MAX_SEGMENTS>,
    /// A pair was already below the collision threshold at the start of
    /// the horizon
    pub collision_alert: bool,
    /// Pairs or segments whose constraint could not be built
    pub failures: usize,
}
