//! Warm-start trajectory generation.
//!
//! Every replanning tick needs a feasible-ish polynomial to seed corridor
//! construction and the QP. The previous plan shifted by one segment is
//! preferred; otherwise a goal-directed chain of straight segments is
//! built from the current state, each segment displacing at most
//! max_vel * segment_duration per axis.

use crate::config::PlannerConfig;
use crate::trajectory::{Segment, Trajectory};
use crate::types::{Agent, PlanError, Result};

/// Generate the warm start for this tick.
///
/// `disturbed` forces a fresh generation from the (externally corrected)
/// current state instead of reusing the shifted previous plan.
pub fn generate(
    agent: &Agent,
    prev: Option<&Trajectory>,
    config: &PlannerConfig,
    start_time: f64,
    disturbed: bool,
) -> Result<Trajectory> {
    let state = agent.current_state;
    if !state.position.is_finite() || !state.velocity.is_finite() || !state.acceleration.is_finite() {
        return Err(PlanError::InvalidParameter);
    }

    if !disturbed {
        if let Some(prev) = prev {
            if prev.segment_count() == config.segment_count && prev.degree() == config.degree {
                let mut shifted = prev.shifted_by_one_segment();
                shifted.start_time = start_time;
                // Reuse only while the integrated plan still tracks the state
                if shifted.position_at(start_time).distance(&state.position) < config.reset_threshold
                {
                    return Ok(shifted);
                }
            }
        }
    }

    fresh(agent, config, start_time)
}

/// Goal-directed warm start from scratch.
///
/// Marches waypoints toward the current goal with per-axis displacement
/// clamped to max_vel * segment_duration, then fixes the first segment's
/// leading control points so the curve starts on the current state.
fn fresh(agent: &Agent, config: &PlannerConfig, start_time: f64) -> Result<Trajectory> {
    let n = config.degree;
    let dt = config.segment_duration;
    let state = agent.current_state;

    let mut goal = agent.current_goal_point;
    if config.world_dimension == 2 {
        goal.z = config.world_z_2d;
    }

    let mut trajectory = Trajectory::new(start_time);
    let mut waypoint = state.position;
    for _ in 0..config.segment_count {
        let mut step = goal - waypoint;
        step.x = step.x.clamp(-config.max_vel.x * dt, config.max_vel.x * dt);
        step.y = step.y.clamp(-config.max_vel.y * dt, config.max_vel.y * dt);
        step.z = step.z.clamp(-config.max_vel.z * dt, config.max_vel.z * dt);
        let next = waypoint + step;
        trajectory
            .segments
            .push(Segment::line(waypoint, next, dt, n))
            .map_err(|_| PlanError::CapacityExceeded)?;
        waypoint = next;
    }

    // Bake the initial state into the leading control points
    let first = &mut trajectory.segments[0];
    let c0 = state.position;
    let c1 = c0 + state.velocity * (dt / n as f64);
    let c2 = state.acceleration * (dt * dt / (n as f64 * (n - 1) as f64)) + c1 * 2.0 - c0;
    first.points[0] = c0;
    first.points[1] = c1;
    first.points[2] = c2;

    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentId, State, Vec3};

    fn agent_at(position: Vec3, goal: Vec3) -> Agent {
        let mut agent = Agent::new(AgentId::new(1), 0.15, position, goal);
        agent.current_goal_point = goal;
        agent
    }

    #[test]
    fn test_stay_in_place_when_at_goal() {
        let p = Vec3::new(1.0, 2.0, 1.0);
        let agent = agent_at(p, p);
        let traj = generate(&agent, None, &PlannerConfig::default(), 0.0, false).unwrap();
        assert_eq!(traj.segment_count(), 5);
        assert!(traj.position_at(0.0).distance(&p) < 1e-12);
        assert!(traj.terminal_position().distance(&p) < 1e-12);
    }

    #[test]
    fn test_marches_toward_goal_with_clamp() {
        let cfg = PlannerConfig::default(); // max_vel 1, dt 0.2
        let agent = agent_at(Vec3::new(0.0, 0.0, 1.0), Vec3::new(10.0, 0.0, 1.0));
        let traj = generate(&agent, None, &cfg, 0.0, false).unwrap();
        // 5 segments of at most 0.2 m each
        assert!((traj.terminal_position().x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_initial_state_baked_in() {
        let cfg = PlannerConfig::default();
        let mut agent = agent_at(Vec3::new(0.0, 0.0, 1.0), Vec3::new(10.0, 0.0, 1.0));
        agent.current_state = State {
            position: Vec3::new(0.0, 0.0, 1.0),
            velocity: Vec3::new(0.5, 0.0, 0.0),
            acceleration: Vec3::new(0.0, 0.2, 0.0),
        };
        let traj = generate(&agent, None, &cfg, 0.0, false).unwrap();
        let s = traj.state_at(0.0);
        assert!(s.position.distance(&agent.current_state.position) < 1e-9);
        assert!(s.velocity.distance(&agent.current_state.velocity) < 1e-9);
        assert!(s.acceleration.distance(&agent.current_state.acceleration) < 1e-6);
    }

    #[test]
    fn test_prefers_shifted_previous() {
        let cfg = PlannerConfig::default();
        let agent = agent_at(Vec3::new(0.2, 0.0, 1.0), Vec3::new(10.0, 0.0, 1.0));
        // Previous plan: straight march, one segment already flown
        let prev = generate(&agent_at(Vec3::new(0.0, 0.0, 1.0), Vec3::new(10.0, 0.0, 1.0)), None, &cfg, 0.0, false).unwrap();
        let warm = generate(&agent, Some(&prev), &cfg, 0.2, false).unwrap();
        assert!((warm.start_time - 0.2).abs() < 1e-12);
        assert!(warm.position_at(0.2).distance(&Vec3::new(0.2, 0.0, 1.0)) < 1e-9);
    }

    #[test]
    fn test_disturbed_regenerates() {
        let cfg = PlannerConfig::default();
        let mut agent = agent_at(Vec3::new(5.0, 5.0, 1.0), Vec3::new(10.0, 0.0, 1.0));
        agent.current_state = State::at_rest(Vec3::new(5.0, 5.0, 1.0));
        let prev = generate(&agent_at(Vec3::new(0.0, 0.0, 1.0), Vec3::new(10.0, 0.0, 1.0)), None, &cfg, 0.0, false).unwrap();
        let warm = generate(&agent, Some(&prev), &cfg, 0.2, true).unwrap();
        assert!(warm.position_at(0.2).distance(&Vec3::new(5.0, 5.0, 1.0)) < 1e-9);
    }

    #[test]
    fn test_non_finite_state_rejected() {
        let cfg = PlannerConfig::default();
        let mut agent = agent_at(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0));
        agent.current_state.velocity.x = f64::NAN;
        assert!(generate(&agent, None, &cfg, 0.0, false).is_err());
    }
}
