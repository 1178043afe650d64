//! Per-tick trajectory planning pipeline.
//!
//! One `plan` call runs: neighbor snapshot, goal selection, warm start,
//! LSC/SFC construction, QP assembly and solve, fallback handling. The
//! call is blocking and deterministic; statistics capture wall time per
//! phase and the constraint counts.

use crate::config::PlannerConfig;
use crate::corridor::lsc::build_lscs;
use crate::corridor::sfc::build_sfcs;
use crate::corridor::CorridorSet;
use crate::goal::select_current_goal;
use crate::initial_traj;
use crate::map::DistanceMap;
use crate::priority::DeadlockGuard;
use crate::qp;
use crate::snapshot::NeighborSnapshot;
use crate::solver::{ActiveSetSolver, QpSolver, SolverStatus};
use crate::stats::{PhaseTimer, PlanningStatistics};
use crate::trajectory::{Segment, Trajectory};
use crate::types::{Agent, ObstacleList, PlanningReport, Result, Vec3};

/// Trajectory planner for one agent
pub struct TrajPlanner {
    config: PlannerConfig,
    solver: ActiveSetSolver,
    prev_traj: Option<Trajectory>,
    deadlock: DeadlockGuard,
    collision_alert: bool,
    planner_seq: u64,
    statistics: PlanningStatistics,
}

impl core::fmt::Debug for TrajPlanner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrajPlanner")
            .field("planner_seq", &self.planner_seq)
            .field("collision_alert", &self.collision_alert)
            .finish()
    }
}

impl TrajPlanner {
    /// Create a planner; fails on an invalid configuration
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        let solver = ActiveSetSolver::from_config(&config.solver);
        let deadlock = DeadlockGuard::new(config.infeasible_window);
        Ok(Self {
            config,
            solver,
            prev_traj: None,
            deadlock,
            collision_alert: false,
            planner_seq: 0,
            statistics: PlanningStatistics::default(),
        })
    }

    /// Run one replanning tick.
    ///
    /// Returns the exit report and the trajectory to fly: the fresh QP
    /// solution on success, the warm start unchanged when the program was
    /// infeasible or the solver failed twice.
    pub fn plan(
        &mut self,
        agent: &mut Agent,
        obstacles: &ObstacleList,
        map: &impl DistanceMap,
        now: f64,
        disturbed: bool,
    ) -> (PlanningReport, Trajectory) {
        let total_timer = PhaseTimer::start();
        self.planner_seq += 1;
        self.statistics = PlanningStatistics {
            planner_seq: self.planner_seq,
            ..Default::default()
        };
        self.collision_alert = false;

        let snapshot = NeighborSnapshot::build(
            agent.id,
            agent.current_state.position,
            self.config.communication_range,
            obstacles,
        );

        let timer = PhaseTimer::start();
        select_current_goal(agent, &snapshot, &self.config, self.deadlock.is_yielding());
        self.statistics.durations.goal = timer.elapsed();

        let timer = PhaseTimer::start();
        let warm = match initial_traj::generate(
            agent,
            self.prev_traj.as_ref(),
            &self.config,
            now,
            disturbed,
        ) {
            Ok(warm) => warm,
            Err(_) => {
                log::warn!("{}: warm start generation failed", agent.id);
                return self.finish(
                    PlanningReport::InitTrajGenerationFail,
                    self.prev_traj.clone().unwrap_or_default(),
                    total_timer,
                );
            }
        };
        self.statistics.durations.initial_traj = timer.elapsed();

        let timer = PhaseTimer::start();
        let lsc_outcome = build_lscs(agent, &warm, &snapshot, &self.config, now);
        self.statistics.durations.lsc = timer.elapsed();

        let timer = PhaseTimer::start();
        let sfc_outcome = build_sfcs(&warm, map, agent.radius, &self.config);
        self.statistics.durations.sfc = timer.elapsed();

        self.collision_alert = lsc_outcome.collision_alert;
        if map.distance_at(agent.current_state.position) < agent.radius {
            self.collision_alert = true;
        }

        self.statistics.lsc_count = lsc_outcome.constraints.len();
        self.statistics.sfc_count = sfc_outcome.constraints.len();
        self.statistics.constraint_failures = lsc_outcome.failures + sfc_outcome.failures;

        let corridor_collapse = (!snapshot.is_empty()
            && lsc_outcome.constraints.is_empty()
            && lsc_outcome.failures > 0)
            || sfc_outcome.constraints.len() != warm.segment_count();
        if corridor_collapse {
            log::warn!("{}: corridor construction collapsed", agent.id);
            self.prev_traj = Some(warm.clone());
            return self.finish(PlanningReport::ConstraintGenerationFail, warm, total_timer);
        }

        let corridors = CorridorSet {
            lscs: lsc_outcome.constraints,
            sfcs: sfc_outcome.constraints,
            collision_alert: lsc_outcome.collision_alert,
            failures: lsc_outcome.failures + sfc_outcome.failures,
        };

        let timer = PhaseTimer::start();
        let problem = match qp::assemble(&agent.current_state, &warm, &corridors, &self.config) {
            Ok(problem) => problem,
            Err(_) => {
                self.prev_traj = Some(warm.clone());
                return self.finish(PlanningReport::ConstraintGenerationFail, warm, total_timer);
            }
        };
        self.statistics.eq_count = problem.eq.len();
        self.statistics.ineq_count = problem.ineq.len();

        let mut solution = self.solver.solve(&problem, 0.0);
        self.statistics.solver_iterations = solution.iterations;
        if solution.status == SolverStatus::NumericalFail {
            // One regularized retry before falling back
            solution = self.solver.solve(&problem, self.config.solver.regularization);
            self.statistics.solver_iterations += solution.iterations;
        }
        self.statistics.qp_status = Some(solution.status);
        self.statistics.durations.qp = timer.elapsed();

        let trajectory = match solution.status {
            SolverStatus::Success => {
                self.deadlock.record_feasible();
                match self.trajectory_from_solution(&solution.x, now) {
                    Some(trajectory) => trajectory,
                    None => {
                        return self.finish(
                            PlanningReport::QpFail,
                            self.prev_traj.clone().unwrap_or_default(),
                            total_timer,
                        )
                    }
                }
            }
            SolverStatus::Infeasible => {
                log::warn!("{}: QP infeasible, flying warm start", agent.id);
                self.deadlock.record_infeasible();
                self.collision_alert = true;
                warm.clone()
            }
            SolverStatus::NumericalFail => {
                log::warn!("{}: QP numerical failure, flying warm start", agent.id);
                self.collision_alert = true;
                warm.clone()
            }
        };

        self.prev_traj = Some(trajectory.clone());
        self.finish(PlanningReport::Success, trajectory, total_timer)
    }

    /// Rebuild a trajectory from the flattened solution vector
    fn trajectory_from_solution(&self, x: &[f64], now: f64) -> Option<Trajectory> {
        let dim = self.config.world_dimension;
        let n = self.config.degree;
        let coefs = n + 1;

        let mut trajectory = Trajectory::new(now);
        for m in 0..self.config.segment_count {
            let mut segment = Segment {
                duration: self.config.segment_duration,
                points: heapless::Vec::new(),
            };
            for i in 0..coefs {
                let base = (m * coefs + i) * dim;
                let point = Vec3::new(
                    x[base],
                    x[base + 1],
                    if dim == 3 {
                        x[base + 2]
                    } else {
                        self.config.world_z_2d
                    },
                );
                if !point.is_finite() {
                    return None;
                }
                segment.points.push(point).ok()?;
            }
            trajectory.segments.push(segment).ok()?;
        }
        Some(trajectory)
    }

    fn finish(
        &mut self,
        report: PlanningReport,
        trajectory: Trajectory,
        total_timer: PhaseTimer,
    ) -> (PlanningReport, Trajectory) {
        self.statistics.report = Some(report);
        self.statistics.durations.total = total_timer.elapsed();
        (report, trajectory)
    }

    /// Statistics of the last plan call
    pub fn statistics(&self) -> &PlanningStatistics {
        &self.statistics
    }

    /// Collision alert raised by the last plan call
    pub fn collision_alert(&self) -> bool {
        self.collision_alert
    }

    /// Replanning tick counter
    pub fn planner_seq(&self) -> u64 {
        self.planner_seq
    }

    /// True while deadlock avoidance holds the goal near the position
    pub fn is_yielding(&self) -> bool {
        self.deadlock.is_yielding()
    }

    /// The most recently produced trajectory
    pub fn previous_trajectory(&self) -> Option<&Trajectory> {
        self.prev_traj.as_ref()
    }

    /// Planner configuration
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::BoxWorld;
    use crate::types::AgentId;

    fn planner() -> TrajPlanner {
        TrajPlanner::new(PlannerConfig::default()).unwrap()
    }

    fn agent(start: Vec3, goal: Vec3) -> Agent {
        let mut a = Agent::new(AgentId::new(1), 0.15, start, goal);
        a.current_goal_point = goal;
        a
    }

    #[test]
    fn test_plan_empty_world_succeeds() {
        let mut planner = planner();
        let mut agent = agent(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0));
        let map = BoxWorld::new(0.1);

        let (report, traj) = planner.plan(&mut agent, &ObstacleList::new(), &map, 0.0, false);
        assert_eq!(report, PlanningReport::Success);
        assert_eq!(traj.segment_count(), 5);
        assert!(!planner.collision_alert());

        // Starts on the current state
        assert!(traj.position_at(0.0).distance(&agent.current_state.position) < 1e-6);
        // Terminal rest
        assert!(traj.velocity_at(traj.end_time()).norm() < 1e-6);
        assert!(traj.acceleration_at(traj.end_time()).norm() < 1e-5);
    }

    #[test]
    fn test_plan_makes_progress_toward_goal() {
        let mut planner = planner();
        let mut agent = agent(Vec3::new(0.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 1.0));
        let map = BoxWorld::new(0.1);

        let (report, traj) = planner.plan(&mut agent, &ObstacleList::new(), &map, 0.0, false);
        assert_eq!(report, PlanningReport::Success);
        assert!(traj.terminal_position().x > 0.3);
    }

    #[test]
    fn test_planner_seq_increments() {
        let mut planner = planner();
        let mut agent = agent(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0));
        let map = BoxWorld::new(0.1);

        planner.plan(&mut agent, &ObstacleList::new(), &map, 0.0, false);
        planner.plan(&mut agent, &ObstacleList::new(), &map, 0.2, false);
        assert_eq!(planner.planner_seq(), 2);
        assert_eq!(planner.statistics().planner_seq, 2);
    }

    #[test]
    fn test_statistics_populated() {
        let mut planner = planner();
        let mut agent = agent(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0));
        let map = BoxWorld::new(0.1);

        planner.plan(&mut agent, &ObstacleList::new(), &map, 0.0, false);
        let stats = planner.statistics();
        assert_eq!(stats.report, Some(PlanningReport::Success));
        assert_eq!(stats.qp_status, Some(SolverStatus::Success));
        assert_eq!(stats.sfc_count, 5);
        assert_eq!(stats.eq_count, 51);
        assert!(stats.ineq_count > 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PlannerConfig {
            segment_count: 0,
            ..Default::default()
        };
        assert!(TrajPlanner::new(config).is_err());
    }
}
