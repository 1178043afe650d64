//! # Decentralized Multi-Agent Trajectory Planner
//!
//! Corridor-based trajectory planning for aerial vehicles sharing a
//! workspace with other agents and obstacles. Each agent runs its own
//! planner instance; every replanning tick produces a piecewise Bernstein
//! polynomial that advances toward the goal, respects per-axis dynamic
//! limits, and is collision-free against every neighbor's most recently
//! broadcast trajectory.
//!
//! ## Features
//! - Linear Safe Corridors (LSC) against agents and dynamic obstacles
//! - Safe Flight Corridors (SFC) against the static distance map
//! - Bernstein-basis QP with an in-process active-set solver
//! - Priority-based tie-breaking and deadlock yielding
//! - WAIT / GOTO / PATROL / GOBACK / LAND planner state machine
//!
//! ## Safety Guarantees
//! - No heap allocation in the core (bounded `heapless` collections)
//! - Deterministic: identical inputs produce bit-identical control points
//! - Coordination by value snapshots only, no shared mutable state

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod agent_manager;
pub mod bernstein;
pub mod config;
pub mod corridor;
pub mod geometry;
pub mod goal;
pub mod initial_traj;
pub mod map;
pub mod planner;
pub mod priority;
pub mod qp;
pub mod snapshot;
pub mod solver;
pub mod state_machine;
pub mod stats;
pub mod trajectory;
pub mod types;

pub use agent_manager::{AgentManager, CommandExecutor, NoopExecutor};
pub use config::*;
pub use map::{Aabb, BoxWorld, DistanceMap};
pub use planner::TrajPlanner;
pub use solver::{QpSolver, SolverStatus};
pub use state_machine::{MissionEntry, PlannerState};
pub use stats::{PhaseDurations, PlanningStatistics};
pub use trajectory::{Segment, Trajectory};
pub use types::*;

/// Maximum trajectory segments M
pub const MAX_SEGMENTS: usize = 6;

/// Maximum Bernstein basis degree n
pub const MAX_DEGREE: usize = 5;

/// Control points per segment at the maximum degree
pub const MAX_COEFS: usize = MAX_DEGREE + 1;

/// Maximum obstacle reports per tick
pub const MAX_OBSTACLES: usize = 32;

/// Maximum static boxes in the in-process distance field
pub const MAX_STATIC_BOXES: usize = 16;

/// Maximum LSC half-spaces per tick
pub const MAX_LSC: usize = MAX_SEGMENTS * MAX_OBSTACLES;

/// Maximum QP decision variables (segments x control points x axes)
pub const NVAR_CAP: usize = MAX_SEGMENTS * MAX_COEFS * 3;

/// Maximum QP equality rows ((3M + 2) per axis)
pub const NEQ_CAP: usize = (3 * MAX_SEGMENTS + 2) * 3;

/// Maximum QP inequality rows
pub const INEQ_CAP: usize = 1024;
