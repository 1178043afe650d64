//! Agent lifecycle: step, plan, broadcast.
//!
//! `AgentManager` owns one agent, its planner, and the planner-state
//! machine. Between ticks it advances the agent along its own plan (the
//! ideal state) unless an external observation disagrees by more than the
//! reset threshold, in which case the observed position overrides the
//! integrated one and the replan continues from rest. Landing hands
//! control to the command executor entirely.

use crate::config::{GoalMode, PlannerConfig};
use crate::map::DistanceMap;
use crate::planner::TrajPlanner;
use crate::snapshot::apply_observed_odometry;
use crate::state_machine::{planning_state_transition, MissionEntry, PlannerState};
use crate::stats::PlanningStatistics;
use crate::trajectory::Trajectory;
use crate::types::{
    Agent, AgentBroadcast, AgentId, ObstacleList, PlanningReport, Result, State, Vec3,
};

/// External command executor: actuator-side collaborator that reports
/// observations, executes landings, and consumes fresh trajectories.
pub trait CommandExecutor {
    /// The executor detected a disturbance on this agent
    fn is_disturbed(&self) -> bool {
        false
    }

    /// Externally observed agent position, when one is available
    fn observed_agent_position(&self) -> Option<Vec3> {
        None
    }

    /// Externally observed pose/velocity of a dynamic obstacle
    fn observed_obstacle_odometry(&self, _id: AgentId) -> Option<(Vec3, Vec3)> {
        None
    }

    /// Start the landing sequence
    fn begin_landing(&mut self) {}

    /// The landing sequence has completed
    fn landing_finished(&self) -> bool {
        true
    }

    /// Consume the trajectory computed this tick
    fn update_trajectory(&mut self, _trajectory: &Trajectory, _time: f64) {}
}

/// Executor used when no external coupling is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl CommandExecutor for NoopExecutor {}

/// Owns one agent and its planning pipeline
pub struct AgentManager<E: CommandExecutor = NoopExecutor> {
    config: PlannerConfig,
    mission: MissionEntry,
    agent: Agent,
    planner_state: PlannerState,
    planner: TrajPlanner,
    desired_traj: Trajectory,
    obstacles: ObstacleList,
    executor: E,
    current_time: f64,
    has_obstacles: bool,
    has_current_state: bool,
    is_disturbed: bool,
    collision_alert: bool,
    landing_in_progress: bool,
    disturbed_streak: usize,
}

impl AgentManager<NoopExecutor> {
    /// Manager without external executor coupling
    pub fn new(config: PlannerConfig, agent: Agent) -> Result<Self> {
        Self::with_executor(config, agent, NoopExecutor)
    }
}

impl<E: CommandExecutor> AgentManager<E> {
    /// Manager coupled to a command executor
    pub fn with_executor(config: PlannerConfig, mut agent: Agent, executor: E) -> Result<Self> {
        let planner = TrajPlanner::new(config.clone())?;

        agent.current_state = State::at_rest(agent.start_point);
        if config.world_dimension == 2 {
            agent.current_state.position.z = config.world_z_2d;
        }
        agent.current_goal_point = agent.current_state.position;
        agent.next_waypoint = agent.current_state.position;

        let mission = MissionEntry {
            start_point: agent.start_point,
            desired_goal_point: agent.desired_goal_point,
        };

        Ok(Self {
            config,
            mission,
            agent,
            planner_state: PlannerState::Wait,
            planner,
            desired_traj: Trajectory::default(),
            obstacles: ObstacleList::new(),
            executor,
            current_time: 0.0,
            has_obstacles: false,
            has_current_state: false,
            is_disturbed: false,
            collision_alert: false,
            landing_in_progress: false,
            disturbed_streak: 0,
        })
    }

    /// Advance the agent by one time step.
    ///
    /// Follows the previously planned trajectory (ideal state) unless the
    /// executor reports a disturbance or the observed position drifts past
    /// the reset threshold, in which case the observation wins and the
    /// derivatives are zeroed for this tick.
    pub fn do_step(&mut self, time_step: f64) {
        self.current_time += time_step;

        let mut step_ideal = true;
        if self.config.multisim_experiment {
            let observed = self.executor.observed_agent_position();
            let flagged = self.executor.is_disturbed();
            let drifted = match observed {
                Some(observed) if !self.desired_traj.is_empty() => {
                    observed.distance(&self.desired_traj.position_at(self.current_time))
                        > self.config.reset_threshold
                }
                _ => false,
            };
            if flagged || drifted {
                self.is_disturbed = true;
                self.disturbed_streak += 1;
                if let Some(observed) = observed {
                    self.agent.current_state = State::at_rest(observed);
                }
                self.agent.current_state.velocity = Vec3::ZERO;
                self.agent.current_state.acceleration = Vec3::ZERO;
                step_ideal = false;
            }
        }

        if step_ideal {
            self.is_disturbed = false;
            self.disturbed_streak = 0;
            if !self.desired_traj.is_empty() {
                self.agent.current_state = self.desired_traj.state_at(self.current_time);
            }
        }

        if self.config.world_dimension == 2 {
            self.agent.current_state.position.z = self.config.world_z_2d;
        }
        self.has_current_state = true;
    }

    /// Inject an externally measured state (mutually exclusive with the
    /// integrated ideal state)
    pub fn set_current_state(&mut self, state: State) {
        self.agent.current_state = state;
        if self.config.world_dimension == 2 {
            self.agent.current_state.position.z = self.config.world_z_2d;
        }
        self.has_current_state = true;
    }

    /// Store this tick's obstacle reports, merging fresher executor
    /// observations for dynamic obstacles
    pub fn set_obstacles(&mut self, reports: &ObstacleList) {
        self.obstacles = reports.clone();
        if self.config.multisim_experiment {
            let mut ids: heapless::Vec<AgentId, { crate::MAX_OBSTACLES }> = heapless::Vec::new();
            for obstacle in &self.obstacles {
                let _ = ids.push(obstacle.id);
            }
            for id in ids {
                if let Some((position, velocity)) = self.executor.observed_obstacle_odometry(id) {
                    apply_observed_odometry(&mut self.obstacles, id, position, velocity);
                }
            }
        }
        self.has_obstacles = true;
    }

    /// Run one replanning tick against the distance map.
    pub fn plan(&mut self, map: &impl DistanceMap, now: f64) -> PlanningReport {
        if !self.has_obstacles || !self.has_current_state {
            return PlanningReport::WaitForInput;
        }

        if self.planner_state == PlannerState::Land {
            if !self.landing_in_progress {
                self.executor.begin_landing();
                self.landing_in_progress = true;
            }
            // Control belongs to the executor until landing finishes; the
            // trajectory is left untouched.
            self.has_obstacles = false;
            self.has_current_state = false;
            return PlanningReport::Success;
        }

        planning_state_transition(
            self.planner_state,
            &mut self.agent,
            &self.mission,
            self.config.goal_threshold,
        );

        if self.is_disturbed {
            log::warn!("{}: disturbance detected, replanning from rest", self.agent.id);
        }

        let (report, trajectory) = self.planner.plan(
            &mut self.agent,
            &self.obstacles,
            map,
            now,
            self.is_disturbed,
        );
        self.desired_traj = trajectory;
        self.collision_alert = self.planner.collision_alert();

        if self.config.multisim_experiment {
            self.executor.update_trajectory(&self.desired_traj, now);
        }

        self.has_obstacles = false;
        self.has_current_state = false;
        report
    }

    /// Change the planner state; ignored while a landing is in progress
    pub fn set_planner_state(&mut self, new_state: PlannerState) {
        if self.planner_state == PlannerState::Land
            && self.landing_in_progress
            && !self.executor.landing_finished()
        {
            return;
        }
        if self.planner_state == PlannerState::Land && new_state != PlannerState::Land {
            self.landing_in_progress = false;
        }
        self.planner_state = new_state;
    }

    /// Current planner state
    pub fn planner_state(&self) -> PlannerState {
        self.planner_state
    }

    /// Observed-vs-integrated drift is within the reset threshold
    pub fn is_initial_state_valid(&self) -> bool {
        match self.executor.observed_agent_position() {
            Some(observed) if self.config.multisim_experiment => {
                let drift = observed.distance(&self.agent.current_state.position);
                if drift >= self.config.reset_threshold {
                    log::warn!(
                        "{}: observed {} vs ideal {}, drift {:.3}",
                        self.agent.id,
                        observed,
                        self.agent.current_state.position,
                        drift
                    );
                    return false;
                }
                true
            }
            _ => true,
        }
    }

    /// Disturbances persisted longer than the configured window
    pub fn needs_operator_attention(&self) -> bool {
        self.disturbed_streak > self.config.disturbance_window
    }

    /// Broadcast message describing this agent as an obstacle.
    ///
    /// Grid-based coordination shares the intermediate goal; the other
    /// modes share the mission goal.
    pub fn broadcast(&self) -> AgentBroadcast {
        let goal = if self.config.goal_mode == GoalMode::GridBasedPlanner {
            self.agent.current_goal_point
        } else {
            self.agent.desired_goal_point
        };
        AgentBroadcast {
            id: self.agent.id,
            position: self.agent.current_state.position,
            velocity: self.agent.current_state.velocity,
            goal,
            radius: self.agent.radius,
            downwash: self.agent.downwash,
            max_acc: self.agent.max_acc.max_abs(),
            collision_alert: self.collision_alert,
            trajectory: if self.desired_traj.is_empty() {
                None
            } else {
                Some(self.desired_traj.clone())
            },
        }
    }

    /// Replace the mission start position
    pub fn set_start_position(&mut self, start: Vec3) {
        self.mission.start_point = start;
        self.agent.start_point = start;
    }

    /// Replace the mission goal
    pub fn set_desired_goal(&mut self, goal: Vec3) {
        self.mission.desired_goal_point = goal;
        self.agent.desired_goal_point = goal;
    }

    /// Waypoint handed down by an upstream global planner
    pub fn set_next_waypoint(&mut self, waypoint: Vec3) {
        self.agent.next_waypoint = waypoint;
    }

    /// The agent as currently known to this manager
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Current position
    pub fn current_position(&self) -> Vec3 {
        self.agent.current_state.position
    }

    /// Trajectory being flown
    pub fn trajectory(&self) -> &Trajectory {
        &self.desired_traj
    }

    /// Collision alert from the last plan
    pub fn collision_alert(&self) -> bool {
        self.collision_alert
    }

    /// Statistics of the last plan call
    pub fn statistics(&self) -> &PlanningStatistics {
        self.planner.statistics()
    }

    /// Replanning tick counter
    pub fn planner_seq(&self) -> u64 {
        self.planner.planner_seq()
    }

    /// Access the executor
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::BoxWorld;

    fn manager(start: Vec3, goal: Vec3) -> AgentManager {
        let agent = Agent::new(AgentId::new(1), 0.15, start, goal);
        AgentManager::new(PlannerConfig::default(), agent).unwrap()
    }

    #[test]
    fn test_plan_waits_for_inputs() {
        let mut mgr = manager(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0));
        let map = BoxWorld::new(0.1);
        assert_eq!(mgr.plan(&map, 0.0), PlanningReport::WaitForInput);
    }

    #[test]
    fn test_step_plan_cycle() {
        let mut mgr = manager(Vec3::new(0.0, 0.0, 1.0), Vec3::new(2.0, 0.0, 1.0));
        mgr.set_planner_state(PlannerState::Goto);
        let map = BoxWorld::new(0.1);

        mgr.do_step(0.0);
        mgr.set_obstacles(&ObstacleList::new());
        assert_eq!(mgr.plan(&map, 0.0), PlanningReport::Success);
        assert!(!mgr.trajectory().is_empty());

        // Inputs are consumed; a second plan without new inputs waits
        assert_eq!(mgr.plan(&map, 0.2), PlanningReport::WaitForInput);
    }

    #[test]
    fn test_ideal_state_follows_plan() {
        let mut mgr = manager(Vec3::new(0.0, 0.0, 1.0), Vec3::new(2.0, 0.0, 1.0));
        mgr.set_planner_state(PlannerState::Goto);
        let map = BoxWorld::new(0.1);

        mgr.do_step(0.0);
        mgr.set_obstacles(&ObstacleList::new());
        mgr.plan(&map, 0.0);

        mgr.do_step(0.2);
        let expected = mgr.trajectory().position_at(0.2);
        assert!(mgr.current_position().distance(&expected) < 1e-9);
        assert!(mgr.current_position().x > 0.0);
    }

    #[test]
    fn test_broadcast_carries_trajectory() {
        let mut mgr = manager(Vec3::new(0.0, 0.0, 1.0), Vec3::new(2.0, 0.0, 1.0));
        mgr.set_planner_state(PlannerState::Goto);
        let map = BoxWorld::new(0.1);

        mgr.do_step(0.0);
        mgr.set_obstacles(&ObstacleList::new());
        mgr.plan(&map, 0.0);

        let broadcast = mgr.broadcast();
        assert_eq!(broadcast.id, AgentId::new(1));
        assert!(broadcast.trajectory.is_some());
        assert_eq!(broadcast.goal, Vec3::new(2.0, 0.0, 1.0));
    }

    #[test]
    fn test_set_desired_goal_updates_mission() {
        let mut mgr = manager(Vec3::new(0.0, 0.0, 1.0), Vec3::new(2.0, 0.0, 1.0));
        mgr.set_desired_goal(Vec3::new(9.0, 0.0, 1.0));
        assert_eq!(mgr.agent().desired_goal_point, Vec3::new(9.0, 0.0, 1.0));
    }
}
