//! Planner configuration.
//!
//! All tunables consumed by the trajectory planning core live here. The
//! configuration is validated once at construction; a planner is never
//! built from an invalid configuration (invalid input is the only fatal
//! error class in the core).

use serde::{Deserialize, Serialize};

use crate::types::{PlanError, Result, Vec3};
use crate::{MAX_DEGREE, MAX_SEGMENTS};

/// Current-goal selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalMode {
    /// Keep the desired goal, clamp by the safe distance toward it
    PriorBased,
    /// Like prior-based, but bias to the right around oncoming traffic
    RightHandRule,
    /// Follow the next waypoint provided by an upstream global planner
    GridBasedPlanner,
}

/// How the pairwise collision distance is derived from two radii
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionRadiusPolicy {
    /// r_i + r_j
    SumOfRadii,
    /// 2 * max(r_i, r_j)
    TwiceMaxRadius,
}

impl CollisionRadiusPolicy {
    /// Combined collision distance for a pair of radii
    pub fn combine(&self, r_a: f64, r_b: f64) -> f64 {
        match self {
            CollisionRadiusPolicy::SumOfRadii => r_a + r_b,
            CollisionRadiusPolicy::TwiceMaxRadius => 2.0 * r_a.max(r_b),
        }
    }
}

/// Objective weights for the quadratic program
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    /// Weight on integrated squared jerk
    pub jerk: f64,
    /// Weight on integrated squared snap (ignored when degree < 4)
    pub snap: f64,
    /// Weight on squared deviation from the warm start. The warm start
    /// carries the goal progress, so this term is what pulls the smoothed
    /// solution along it.
    pub warm_start: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            jerk: 1.0,
            snap: 0.01,
            warm_start: 100.0,
        }
    }
}

/// Solver iteration budget and tolerances
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Active-set iteration budget; exceeding it is a numerical failure
    pub max_iterations: usize,
    /// Constraint violation tolerance
    pub tolerance: f64,
    /// Hessian regularization added on the numerical-failure retry
    pub regularization: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-8,
            regularization: 1e-7,
        }
    }
}

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Workspace dimension, 2 or 3
    pub world_dimension: usize,
    /// Plane height used when the workspace is 2D
    pub world_z_2d: f64,
    /// Current-goal selection policy
    pub goal_mode: GoalMode,
    /// Distance at which a goal counts as reached (m)
    pub goal_threshold: f64,
    /// Max tolerated drift between observed and integrated positions (m)
    pub reset_threshold: f64,
    /// Number of trajectory segments M
    pub segment_count: usize,
    /// Duration of one segment (s)
    pub segment_duration: f64,
    /// Bernstein basis degree n
    pub degree: usize,
    /// Per-axis maximum velocity (m/s)
    pub max_vel: Vec3,
    /// Per-axis maximum acceleration (m/s^2)
    pub max_acc: Vec3,
    /// Pairwise collision distance policy
    pub collision_radius_policy: CollisionRadiusPolicy,
    /// Neighbors beyond this range are ignored (m)
    pub communication_range: f64,
    /// Extra separating margin yielded by the lower-priority agent (m)
    pub yield_margin: f64,
    /// Consecutive infeasible ticks before entering yielding mode
    pub infeasible_window: usize,
    /// Consecutive disturbed ticks before surfacing to the operator
    pub disturbance_window: usize,
    /// Outward growth step of one SFC face (m); 0 uses the map resolution
    pub sfc_expansion_step: f64,
    /// Maximum SFC growth steps per face
    pub sfc_max_steps: usize,
    /// Objective weights
    pub weights: ObjectiveWeights,
    /// Solver budget and tolerances
    pub solver: SolverConfig,
    /// Couple to an external command executor (landing, disturbance)
    pub multisim_experiment: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            world_dimension: 3,
            world_z_2d: 1.0,
            goal_mode: GoalMode::PriorBased,
            goal_threshold: 0.1,
            reset_threshold: 0.3,
            segment_count: 5,
            segment_duration: 0.2,
            degree: 5,
            max_vel: Vec3::new(1.0, 1.0, 1.0),
            max_acc: Vec3::new(5.0, 5.0, 5.0),
            collision_radius_policy: CollisionRadiusPolicy::SumOfRadii,
            communication_range: 10.0,
            yield_margin: 0.01,
            infeasible_window: 3,
            disturbance_window: 10,
            sfc_expansion_step: 0.0,
            sfc_max_steps: 10,
            weights: ObjectiveWeights::default(),
            solver: SolverConfig::default(),
            multisim_experiment: false,
        }
    }
}

impl PlannerConfig {
    /// Planning horizon T = M * segment_duration
    pub fn horizon(&self) -> f64 {
        self.segment_count as f64 * self.segment_duration
    }

    /// Check all construction-time invariants
    pub fn validate(&self) -> Result<()> {
        if self.world_dimension != 2 && self.world_dimension != 3 {
            return Err(PlanError::Config);
        }
        if self.segment_count < 2 || self.segment_count > MAX_SEGMENTS {
            return Err(PlanError::Config);
        }
        if self.degree < 3 || self.degree > MAX_DEGREE {
            return Err(PlanError::Config);
        }
        if !(self.segment_duration > 0.0) || !self.segment_duration.is_finite() {
            return Err(PlanError::Config);
        }
        if !(self.goal_threshold > 0.0) || !(self.reset_threshold > 0.0) {
            return Err(PlanError::Config);
        }
        if self.max_vel.x <= 0.0 || self.max_vel.y <= 0.0 || self.max_vel.z <= 0.0 {
            return Err(PlanError::Config);
        }
        if self.max_acc.x <= 0.0 || self.max_acc.y <= 0.0 || self.max_acc.z <= 0.0 {
            return Err(PlanError::Config);
        }
        if self.weights.jerk < 0.0 || self.weights.snap < 0.0 || self.weights.warm_start < 0.0 {
            return Err(PlanError::Config);
        }
        if self.weights.jerk == 0.0 && self.weights.snap == 0.0 {
            return Err(PlanError::Config);
        }
        if self.communication_range <= 0.0 || self.yield_margin < 0.0 {
            return Err(PlanError::Config);
        }
        if self.infeasible_window == 0 || self.solver.max_iterations == 0 {
            return Err(PlanError::Config);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PlannerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_dimension_rejected() {
        let cfg = PlannerConfig {
            world_dimension: 4,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(PlanError::Config));
    }

    #[test]
    fn test_degree_bounds() {
        let cfg = PlannerConfig {
            degree: 2,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = PlannerConfig {
            degree: MAX_DEGREE + 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_objective_rejected() {
        let cfg = PlannerConfig {
            weights: ObjectiveWeights {
                jerk: 0.0,
                snap: 0.0,
                warm_start: 1.0,
            },
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_horizon() {
        let cfg = PlannerConfig::default();
        assert!((cfg.horizon() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_collision_radius_policies() {
        assert_eq!(CollisionRadiusPolicy::SumOfRadii.combine(0.15, 0.25), 0.4);
        assert_eq!(CollisionRadiusPolicy::TwiceMaxRadius.combine(0.15, 0.25), 0.5);
    }
}
