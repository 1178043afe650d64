//! Per-tick obstacle and neighbor snapshot.
//!
//! At the start of a replanning tick the planner copies whatever obstacle
//! reports have arrived into a value snapshot; nothing is shared with
//! other agents afterwards. Neighbors with no known trajectory are modeled
//! by constant-velocity extrapolation of their reported state.

use crate::geometry::Line;
use crate::types::{AgentId, Obstacle, ObstacleList, ObstacleType, Vec3};

/// Snapshot of the neighbors relevant to one replanning tick
#[derive(Debug, Clone, Default)]
pub struct NeighborSnapshot {
    /// Non-static obstacles within communication range, self excluded
    pub obstacles: ObstacleList,
}

impl NeighborSnapshot {
    /// Build the snapshot for this tick.
    ///
    /// Static obstacles are dropped (they are covered by the distance
    /// map), as are reports from this agent itself and anything outside
    /// communication range.
    pub fn build(
        self_id: AgentId,
        self_position: Vec3,
        communication_range: f64,
        reports: &ObstacleList,
    ) -> Self {
        let mut obstacles = ObstacleList::new();
        for report in reports {
            if report.id == self_id {
                continue;
            }
            if report.obstacle_type == ObstacleType::Static {
                continue;
            }
            if report.position.distance(&self_position) > communication_range {
                continue;
            }
            if obstacles.push(report.clone()).is_err() {
                log::warn!("snapshot: obstacle list full, dropping {}", report.id);
                break;
            }
        }
        Self { obstacles }
    }

    /// Number of neighbors in the snapshot
    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    /// True when no neighbors are visible
    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }
}

/// Predicted chord of a neighbor over a time window.
///
/// Uses the published trajectory when one is known (missed messages reuse
/// the last known one, evaluation clamps past its horizon), otherwise a
/// constant-velocity prediction from the reported state.
pub fn predicted_chord(obstacle: &Obstacle, now: f64, window_start: f64, window_end: f64) -> Line {
    match &obstacle.prev_traj {
        Some(traj) if !traj.is_empty() => Line::new(
            traj.position_at(window_start),
            traj.position_at(window_end),
        ),
        _ => Line::new(
            obstacle.position + obstacle.velocity * (window_start - now),
            obstacle.position + obstacle.velocity * (window_end - now),
        ),
    }
}

/// Replace an obstacle's pose/velocity with a fresher external observation
pub fn apply_observed_odometry(
    obstacles: &mut ObstacleList,
    id: AgentId,
    position: Vec3,
    velocity: Vec3,
) {
    for obstacle in obstacles.iter_mut() {
        if obstacle.id == id && obstacle.obstacle_type == ObstacleType::Dynamic {
            obstacle.position = position;
            obstacle.velocity = velocity;
        }
    }
}
