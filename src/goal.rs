//! Current-goal selection.
//!
//! The mission gives each agent a desired goal; the planner steers toward
//! an intermediate current goal chosen per tick. Three policies exist:
//! prior-based keeps the desired direction clamped by the safe distance,
//! the right-hand rule additionally biases around oncoming traffic, and
//! the grid-based mode follows an upstream waypoint planner.

use crate::config::{GoalMode, PlannerConfig};
use crate::geometry::{compute_collision_time, safe_dist_in_direction, Line};
use crate::priority::DeadlockGuard;
use crate::snapshot::NeighborSnapshot;
use crate::types::{Agent, ObstacleType, Vec3};

/// Ahead-cone half-angle cosine for conflict detection
const CONFLICT_CONE_COS: f64 = 0.7;

/// Clockwise bias applied by the right-hand rule (radians)
const RIGHT_HAND_BIAS: f64 = 0.5;

/// Pick the current goal for this tick and store it on the agent.
///
/// While `yielding` is set (deadlock avoidance), the desired goal is
/// replaced by its closest point inside a one-segment-reach safety box
/// around the current position.
pub fn select_current_goal(
    agent: &mut Agent,
    snapshot: &NeighborSnapshot,
    config: &PlannerConfig,
    yielding: bool,
) -> Vec3 {
    let position = agent.current_state.position;

    let mut goal = if yielding {
        let half_extent = agent.max_vel * config.segment_duration;
        DeadlockGuard::yield_goal(position, agent.desired_goal_point, half_extent)
    } else {
        match config.goal_mode {
            GoalMode::GridBasedPlanner => agent.next_waypoint,
            GoalMode::PriorBased => prior_based(agent, snapshot, config, None),
            GoalMode::RightHandRule => {
                let bias = oncoming_conflict(agent, snapshot, config);
                prior_based(agent, snapshot, config, bias)
            }
        }
    };

    if config.world_dimension == 2 {
        goal.z = config.world_z_2d;
    }
    agent.current_goal_point = goal;
    goal
}

/// Prior-based goal: march toward the desired goal, clamped by the safe
/// distance along the (optionally biased) direction
fn prior_based(
    agent: &Agent,
    snapshot: &NeighborSnapshot,
    config: &PlannerConfig,
    bias_angle: Option<f64>,
) -> Vec3 {
    let position = agent.current_state.position;
    let to_goal = agent.desired_goal_point - position;
    let dist = to_goal.norm();
    if dist < config.goal_threshold {
        return agent.desired_goal_point;
    }

    let mut direction = to_goal * (1.0 / dist);
    if let Some(angle) = bias_angle {
        direction = rotate_z(direction, angle);
    }

    let safe = safe_dist_in_direction(position, direction, &snapshot.obstacles, agent.radius);
    let travel = dist.min(safe.max(0.0));
    position + direction * travel
}

/// Detect the nearest oncoming agent ahead of us; a hit yields the
/// clockwise right-hand bias
fn oncoming_conflict(
    agent: &Agent,
    snapshot: &NeighborSnapshot,
    config: &PlannerConfig,
) -> Option<f64> {
    let position = agent.current_state.position;
    let direction = (agent.desired_goal_point - position).normalized();
    if direction == Vec3::ZERO {
        return None;
    }
    let horizon = config.horizon();
    let conflict_range = 2.0 * horizon * agent.max_vel.max_abs();
    let reach = horizon * agent.max_vel.max_abs();
    let self_path = Line::new(position, position + direction * reach);

    let mut best_dist = conflict_range;
    let mut found = false;
    for neighbor in &snapshot.obstacles {
        if neighbor.obstacle_type != ObstacleType::Agent {
            continue;
        }
        let rel = neighbor.position - position;
        let dist = rel.norm();
        if dist >= best_dist || dist < 1e-9 {
            continue;
        }
        if direction.dot(&(rel * (1.0 / dist))) < CONFLICT_CONE_COS {
            continue;
        }
        // Oncoming by intent, or actually on collision course within the
        // horizon under constant-velocity prediction
        let their_dir = (neighbor.goal - neighbor.position).normalized();
        let neighbor_path = Line::new(
            neighbor.position,
            neighbor.position + neighbor.velocity * horizon,
        );
        let time_to_contact = compute_collision_time(
            &neighbor_path,
            &self_path,
            agent.radius + neighbor.radius,
            horizon,
        );
        if their_dir.dot(&direction) < -0.5 || time_to_contact <= horizon {
            best_dist = dist;
            found = true;
        }
    }
    if found {
        Some(-RIGHT_HAND_BIAS)
    } else {
        None
    }
}

/// Rotate a direction about the world z axis
fn rotate_z(v: Vec3, angle: f64) -> Vec3 {
    let (s, c) = (libm::sin(angle), libm::cos(angle));
    Vec3::new(c * v.x - s * v.y, s * v.x + c * v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentId, Obstacle, ObstacleList};

    fn agent_toward(goal: Vec3) -> Agent {
        Agent::new(AgentId::new(1), 0.15, Vec3::new(0.0, 0.0, 1.0), goal)
    }

    fn snapshot_with(obstacles: &[Obstacle]) -> NeighborSnapshot {
        let mut list = ObstacleList::new();
        for o in obstacles {
            let _ = list.push(o.clone());
        }
        NeighborSnapshot { obstacles: list }
    }

    #[test]
    fn test_prior_based_unobstructed_reaches_goal() {
        let config = PlannerConfig::default();
        let mut agent = agent_toward(Vec3::new(5.0, 0.0, 1.0));
        let goal = select_current_goal(&mut agent, &NeighborSnapshot::default(), &config, false);
        assert!(goal.distance(&Vec3::new(5.0, 0.0, 1.0)) < 1e-9);
        assert_eq!(agent.current_goal_point, goal);
    }

    #[test]
    fn test_prior_based_clamped_by_obstacle() {
        let config = PlannerConfig::default();
        let mut agent = agent_toward(Vec3::new(5.0, 0.0, 1.0));
        let snapshot = snapshot_with(&[Obstacle::dynamic(
            AgentId::new(2),
            Vec3::new(2.0, 0.0, 1.0),
            Vec3::ZERO,
            0.5,
        )]);
        let goal = select_current_goal(&mut agent, &snapshot, &config, false);
        // Stops short of the inflated obstacle at x = 2 - (0.5 + 0.15)
        assert!(goal.x < 2.0 - 0.6);
        assert!(goal.x > 0.0);
    }

    #[test]
    fn test_grid_based_follows_waypoint() {
        let config = PlannerConfig {
            goal_mode: GoalMode::GridBasedPlanner,
            ..Default::default()
        };
        let mut agent = agent_toward(Vec3::new(5.0, 0.0, 1.0));
        agent.next_waypoint = Vec3::new(1.0, 1.0, 1.0);
        let goal = select_current_goal(&mut agent, &NeighborSnapshot::default(), &config, false);
        assert_eq!(goal, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_right_hand_rule_biases_around_oncoming() {
        let config = PlannerConfig {
            goal_mode: GoalMode::RightHandRule,
            ..Default::default()
        };
        let mut agent = agent_toward(Vec3::new(5.0, 0.0, 1.0));
        let mut oncoming = Obstacle::dynamic(
            AgentId::new(2),
            Vec3::new(1.5, 0.0, 1.0),
            Vec3::new(-1.0, 0.0, 0.0),
            0.15,
        );
        oncoming.obstacle_type = ObstacleType::Agent;
        oncoming.goal = Vec3::new(-5.0, 0.0, 1.0);
        let snapshot = snapshot_with(&[oncoming]);

        let goal = select_current_goal(&mut agent, &snapshot, &config, false);
        // Clockwise bias pushes the goal to negative y
        assert!(goal.y < -1e-6);
    }

    #[test]
    fn test_yielding_parks_goal_near_position() {
        let config = PlannerConfig::default();
        let mut agent = agent_toward(Vec3::new(5.0, 0.0, 1.0));
        let goal = select_current_goal(&mut agent, &NeighborSnapshot::default(), &config, true);
        // One-segment reach: max_vel.x * segment_duration
        assert!((goal.x - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_2d_mode_pins_goal_plane() {
        let config = PlannerConfig {
            world_dimension: 2,
            world_z_2d: 1.5,
            ..Default::default()
        };
        let mut agent = agent_toward(Vec3::new(5.0, 0.0, 3.0));
        let goal = select_current_goal(&mut agent, &NeighborSnapshot::default(), &config, false);
        assert_eq!(goal.z, 1.5);
    }
}
