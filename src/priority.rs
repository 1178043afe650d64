//! Priority ordering and deadlock avoidance.
//!
//! Each agent carries a totally ordered key (remaining goal distance
//! ascending, then id ascending) used to break ties when a pair of agents
//! would carve antipodal corridors out of the same gap. The deadlock guard
//! tracks consecutive infeasible ticks and switches the agent into a
//! yielding mode that parks its goal near the current position.

use serde::{Deserialize, Serialize};

use crate::types::{Agent, AgentId, Obstacle, ObstacleType, Vec3};

/// Totally ordered priority key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityKey {
    /// Remaining distance to the desired goal
    pub goal_distance: f64,
    /// Stable identity, the final tie-break
    pub id: AgentId,
}

impl PriorityKey {
    /// Key of this planner's own agent
    pub fn of_agent(agent: &Agent) -> Self {
        Self {
            goal_distance: agent.distance_to_goal(),
            id: agent.id,
        }
    }

    /// Key of a neighbor as reconstructed from its broadcast.
    ///
    /// Non-cooperative dynamic obstacles cannot yield, so they outrank
    /// every agent.
    pub fn of_obstacle(obstacle: &Obstacle) -> Self {
        let goal_distance = match obstacle.obstacle_type {
            ObstacleType::Dynamic => f64::NEG_INFINITY,
            _ => obstacle.position.distance(&obstacle.goal),
        };
        Self {
            goal_distance,
            id: obstacle.id,
        }
    }

    /// Strict total order: closer to goal wins, ids break exact ties
    pub fn outranks(&self, other: &PriorityKey) -> bool {
        if self.goal_distance != other.goal_distance {
            self.goal_distance < other.goal_distance
        } else {
            self.id < other.id
        }
    }
}

/// Consecutive-infeasibility tracker driving the yielding mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockGuard {
    streak: usize,
    window: usize,
    yielding: bool,
}

impl DeadlockGuard {
    /// Guard entering yielding mode after `window` consecutive infeasible
    /// ticks
    pub fn new(window: usize) -> Self {
        Self {
            streak: 0,
            window,
            yielding: false,
        }
    }

    /// Record an infeasible tick
    pub fn record_infeasible(&mut self) {
        self.streak += 1;
        if self.streak >= self.window {
            self.yielding = true;
        }
    }

    /// Record a feasible tick; leaves yielding mode
    pub fn record_feasible(&mut self) {
        self.streak = 0;
        self.yielding = false;
    }

    /// True while the agent should yield
    pub fn is_yielding(&self) -> bool {
        self.yielding
    }

    /// Current streak length
    pub fn streak(&self) -> usize {
        self.streak
    }

    /// Goal override while yielding: the closest point to the desired goal
    /// inside a safety box around the current position
    pub fn yield_goal(position: Vec3, desired_goal: Vec3, half_extent: Vec3) -> Vec3 {
        Vec3::new(
            desired_goal
                .x
                .clamp(position.x - half_extent.x, position.x + half_extent.x),
            desired_goal
                .y
                .clamp(position.y - half_extent.y, position.y + half_extent.y),
            desired_goal
                .z
                .clamp(position.z - half_extent.z, position.z + half_extent.z),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_by_goal_distance() {
        let a = PriorityKey {
            goal_distance: 1.0,
            id: AgentId::new(5),
        };
        let b = PriorityKey {
            goal_distance: 2.0,
            id: AgentId::new(1),
        };
        assert!(a.outranks(&b));
        assert!(!b.outranks(&a));
    }

    #[test]
    fn test_priority_id_tiebreak() {
        let a = PriorityKey {
            goal_distance: 1.0,
            id: AgentId::new(2),
        };
        let b = PriorityKey {
            goal_distance: 1.0,
            id: AgentId::new(3),
        };
        assert!(a.outranks(&b));
        assert!(!b.outranks(&a));
    }

    #[test]
    fn test_dynamic_obstacle_outranks_everything() {
        let obs = Obstacle::dynamic(AgentId::new(9), Vec3::ZERO, Vec3::ZERO, 0.3);
        let key = PriorityKey::of_obstacle(&obs);
        let agent_key = PriorityKey {
            goal_distance: 0.0,
            id: AgentId::new(1),
        };
        assert!(key.outranks(&agent_key));
    }

    #[test]
    fn test_deadlock_guard_window() {
        let mut guard = DeadlockGuard::new(3);
        guard.record_infeasible();
        guard.record_infeasible();
        assert!(!guard.is_yielding());
        guard.record_infeasible();
        assert!(guard.is_yielding());
        guard.record_feasible();
        assert!(!guard.is_yielding());
        assert_eq!(guard.streak(), 0);
    }

    #[test]
    fn test_yield_goal_clamps_into_box() {
        let goal = DeadlockGuard::yield_goal(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(10.0, 0.5, 1.0),
            Vec3::new(0.2, 0.2, 0.2),
        );
        assert!(goal.distance(&Vec3::new(0.2, 0.2, 1.0)) < 1e-12);
    }
}
