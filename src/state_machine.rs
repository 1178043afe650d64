//! Planner state machine.
//!
//! A tagged variant with one pure transition function; transitions are
//! driven by external commands except the patrol swap, which fires when
//! the agent reaches its goal.

use serde::{Deserialize, Serialize};

use crate::types::{Agent, Vec3};

/// Mission-level planner state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlannerState {
    /// Hold the previous goal, do not advance the mission
    #[default]
    Wait,
    /// Fly to the mission goal
    Goto,
    /// Shuttle between start and goal
    Patrol,
    /// Return to the mission start
    GoBack,
    /// Hand control to the command executor for landing
    Land,
}

/// Mission entry owned by the agent manager
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissionEntry {
    /// Takeoff / patrol home position
    pub start_point: Vec3,
    /// Mission goal position
    pub desired_goal_point: Vec3,
}

/// Update the agent's desired goal for this tick.
///
/// Goto re-asserts the mission goal, GoBack targets the mission start,
/// and Patrol swaps the agent's start and goal once the current goal is
/// within the threshold. Wait and Land leave the goal untouched.
pub fn planning_state_transition(
    state: PlannerState,
    agent: &mut Agent,
    mission: &MissionEntry,
    goal_threshold: f64,
) {
    match state {
        PlannerState::Goto => {
            agent.desired_goal_point = mission.desired_goal_point;
        }
        PlannerState::Patrol
            if agent
                .desired_goal_point
                .distance(&agent.current_state.position)
                < goal_threshold =>
        {
            core::mem::swap(&mut agent.desired_goal_point, &mut agent.start_point);
        }
        PlannerState::GoBack => {
            agent.desired_goal_point = mission.start_point;
        }
        _ => {}
    }
}
