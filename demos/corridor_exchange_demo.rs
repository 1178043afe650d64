//! Corridor Planner Exchange Demo
//!
//! Two agents swap positions head-on on a shared plane while a third
//! crosses their path. Each agent runs its own planner; coordination
//! happens only through the broadcast trajectories, exactly as it would
//! over a pub/sub bus.
//!
//! # Running
//! ```bash
//! cargo run --example corridor_exchange_demo
//! ```

use std::time::Instant;

use corridor_planner::{
    Agent, AgentId, AgentManager, BoxWorld, GoalMode, ObstacleList, PlannerConfig, PlannerState,
    Vec3,
};

/// Simulation tick (seconds), equal to the planner segment duration
const DT: f64 = 0.2;

/// Total simulated time (seconds)
const SIMULATION_TIME: f64 = 30.0;

fn make_manager(id: u32, start: Vec3, goal: Vec3) -> Box<AgentManager> {
    let config = PlannerConfig {
        world_dimension: 2,
        world_z_2d: 1.0,
        goal_mode: GoalMode::RightHandRule,
        ..Default::default()
    };
    let mut mgr = Box::new(
        AgentManager::new(config, Agent::new(AgentId::new(id), 0.15, start, goal)).unwrap(),
    );
    mgr.set_planner_state(PlannerState::Goto);
    mgr
}

fn main() {
    env_logger::init();

    let mut fleet = vec![
        make_manager(1, Vec3::new(0.0, 0.0, 1.0), Vec3::new(8.0, 0.0, 1.0)),
        make_manager(2, Vec3::new(8.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0)),
        make_manager(3, Vec3::new(4.0, -4.0, 1.0), Vec3::new(4.0, 4.0, 1.0)),
    ];
    let map = BoxWorld::new(0.1);

    println!("tick  | positions (x, y) per agent            | min pair dist | alerts");
    println!("------+----------------------------------------+---------------+-------");

    let started = Instant::now();
    let ticks = (SIMULATION_TIME / DT) as usize;
    let mut min_separation = f64::INFINITY;

    let mut time = 0.0;
    for tick in 0..ticks {
        time += DT;

        let broadcasts: Vec<_> = fleet.iter().map(|m| m.broadcast()).collect();
        for (i, mgr) in fleet.iter_mut().enumerate() {
            mgr.do_step(DT);
            let mut reports = ObstacleList::new();
            for (j, b) in broadcasts.iter().enumerate() {
                if i != j {
                    let _ = reports.push(b.to_obstacle());
                }
            }
            mgr.set_obstacles(&reports);
            mgr.plan(&map, time);
        }

        let mut tick_min = f64::INFINITY;
        for i in 0..fleet.len() {
            for j in (i + 1)..fleet.len() {
                let d = fleet[i]
                    .current_position()
                    .distance(&fleet[j].current_position());
                tick_min = tick_min.min(d);
            }
        }
        min_separation = min_separation.min(tick_min);

        if tick % 10 == 0 {
            let alerts = fleet.iter().filter(|m| m.collision_alert()).count();
            print!("{:5} |", tick);
            for mgr in &fleet {
                let p = mgr.current_position();
                print!(" ({:6.2}, {:6.2})", p.x, p.y);
            }
            println!(" | {:13.3} | {}", tick_min, alerts);
        }
    }

    println!();
    println!("simulated {:.0} s in {:.2?}", SIMULATION_TIME, started.elapsed());
    println!("minimum pairwise separation: {:.3} m", min_separation);
    for mgr in &fleet {
        let remaining = mgr
            .current_position()
            .distance(&mgr.agent().desired_goal_point);
        println!(
            "{}: {:.2} m from goal, {} replans",
            mgr.agent().id,
            remaining,
            mgr.planner_seq()
        );
    }
}
