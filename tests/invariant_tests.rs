//! Trajectory invariants on planner output.
//!
//! Every SUCCESS trajectory must be C2 across segment boundaries,
//! reproduce the input state at its start, end at rest, and respect the
//! per-axis dynamic limits over the whole horizon.

use corridor_planner::{
    Agent, AgentId, AgentManager, BoxWorld, ObstacleList, PlannerConfig, PlannerState,
    PlanningReport, State, Trajectory, Vec3,
};

fn planned_trajectory(start: Vec3, goal: Vec3, ticks: usize) -> (Box<AgentManager>, Trajectory) {
    let config = PlannerConfig::default();
    let agent = Agent::new(AgentId::new(1), 0.15, start, goal);
    let mut mgr = Box::new(AgentManager::new(config, agent).unwrap());
    mgr.set_planner_state(PlannerState::Goto);
    let map = BoxWorld::new(0.1);

    let mut time = 0.0;
    for _ in 0..ticks {
        time += 0.2;
        mgr.do_step(0.2);
        mgr.set_obstacles(&ObstacleList::new());
        let report = mgr.plan(&map, time);
        assert_eq!(report, PlanningReport::Success);
    }
    let traj = mgr.trajectory().clone();
    (mgr, traj)
}

#[test]
fn test_c2_continuity_across_boundaries() {
    let (_, traj) = planned_trajectory(Vec3::new(0.0, 0.0, 1.0), Vec3::new(3.0, 1.0, 2.0), 3);

    for k in 1..traj.segment_count() {
        let pos_before = traj.segments[k - 1].position_at(1.0);
        let pos_after = traj.segments[k].position_at(0.0);
        assert!(pos_before.distance(&pos_after) < 1e-6);

        let vel_before = traj.segments[k - 1].velocity_at(1.0);
        let vel_after = traj.segments[k].velocity_at(0.0);
        assert!(vel_before.distance(&vel_after) < 1e-6);

        let acc_before = traj.segments[k - 1].acceleration_at(1.0);
        let acc_after = traj.segments[k].acceleration_at(0.0);
        assert!(acc_before.distance(&acc_after) < 1e-6);
    }
}

#[test]
fn test_boundary_reproduces_input_state() {
    let config = PlannerConfig::default();
    let agent = Agent::new(
        AgentId::new(1),
        0.15,
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(2.0, 0.0, 1.0),
    );
    let mut mgr = Box::new(AgentManager::new(config, agent).unwrap());
    mgr.set_planner_state(PlannerState::Goto);
    let map = BoxWorld::new(0.1);

    // Inject a measured state with non-trivial derivatives
    let injected = State {
        position: Vec3::new(0.1, -0.05, 1.2),
        velocity: Vec3::new(0.3, 0.1, 0.0),
        acceleration: Vec3::new(0.0, -0.4, 0.2),
    };
    mgr.set_current_state(injected);
    mgr.set_obstacles(&ObstacleList::new());
    assert_eq!(mgr.plan(&map, 0.0), PlanningReport::Success);

    let traj = mgr.trajectory();
    let at_start = traj.state_at(0.0);
    assert!(at_start.position.distance(&injected.position) < 1e-9);
    assert!(at_start.velocity.distance(&injected.velocity) < 1e-7);
    assert!(at_start.acceleration.distance(&injected.acceleration) < 1e-6);

    // Terminal rest
    let end = traj.end_time();
    assert!(traj.velocity_at(end).norm() < 1e-6);
    assert!(traj.acceleration_at(end).norm() < 1e-5);
}

#[test]
fn test_dynamic_limits_hold_over_horizon() {
    let (mgr, traj) = planned_trajectory(Vec3::new(0.0, 0.0, 1.0), Vec3::new(5.0, 2.0, 1.5), 4);
    let max_vel = mgr.agent().max_vel;
    let max_acc = mgr.agent().max_acc;

    for s in 0..=200 {
        let t = traj.start_time + traj.horizon() * s as f64 / 200.0;
        let v = traj.velocity_at(t);
        let a = traj.acceleration_at(t);
        assert!(v.x.abs() <= max_vel.x + 1e-6, "vx {} at {}", v.x, t);
        assert!(v.y.abs() <= max_vel.y + 1e-6, "vy {} at {}", v.y, t);
        assert!(v.z.abs() <= max_vel.z + 1e-6, "vz {} at {}", v.z, t);
        assert!(a.x.abs() <= max_acc.x + 1e-5, "ax {} at {}", a.x, t);
        assert!(a.y.abs() <= max_acc.y + 1e-5, "ay {} at {}", a.y, t);
        assert!(a.z.abs() <= max_acc.z + 1e-5, "az {} at {}", a.z, t);
    }
}

#[test]
fn test_2d_trajectories_stay_on_plane() {
    let config = PlannerConfig {
        world_dimension: 2,
        world_z_2d: 1.25,
        ..Default::default()
    };
    let agent = Agent::new(
        AgentId::new(1),
        0.15,
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 1.0, 0.0),
    );
    let mut mgr = Box::new(AgentManager::new(config, agent).unwrap());
    mgr.set_planner_state(PlannerState::Goto);
    let map = BoxWorld::new(0.1);

    mgr.do_step(0.2);
    mgr.set_obstacles(&ObstacleList::new());
    assert_eq!(mgr.plan(&map, 0.2), PlanningReport::Success);

    for segment in &mgr.trajectory().segments {
        for p in &segment.points {
            assert_eq!(p.z, 1.25);
        }
    }
}

#[test]
fn test_statistics_report_constraint_counts() {
    let (mgr, _) = planned_trajectory(Vec3::new(0.0, 0.0, 1.0), Vec3::new(2.0, 0.0, 1.0), 2);
    let stats = mgr.statistics();
    assert_eq!(stats.report, Some(PlanningReport::Success));
    assert_eq!(stats.sfc_count, 5);
    assert_eq!(stats.eq_count, 51);
    assert!(stats.ineq_count >= stats.sfc_count);
    assert!(stats.durations.total >= 0.0);
}
