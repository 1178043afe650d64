//! Planning statistics.
//!
//! Per-tick wall time per phase, solver status, and constraint counts.
//! Timing never feeds back into planning, so the clock seam cannot break
//! determinism; without the `std` feature the timers read as zero.

use serde::{Deserialize, Serialize};

use crate::solver::SolverStatus;
use crate::types::PlanningReport;

/// Wall time spent in each planning phase (seconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseDurations {
    /// Goal selection
    pub goal: f64,
    /// Warm-start generation
    pub initial_traj: f64,
    /// LSC construction
    pub lsc: f64,
    /// SFC construction
    pub sfc: f64,
    /// QP assembly and solve
    pub qp: f64,
    /// Whole plan call
    pub total: f64,
}

/// Statistics for one plan call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningStatistics {
    /// Replanning tick counter
    pub planner_seq: u64,
    /// Exit status of the plan call
    pub report: Option<PlanningReport>,
    /// Terminal solver status, if the solver ran
    pub qp_status: Option<SolverStatus>,
    /// Solver iterations consumed (including the retry)
    pub solver_iterations: usize,
    /// LSC half-spaces built
    pub lsc_count: usize,
    /// SFC boxes built
    pub sfc_count: usize,
    /// Equality rows in the QP
    pub eq_count: usize,
    /// Inequality rows in the QP
    pub ineq_count: usize,
    /// Corridor pairs or segments that failed to build
    pub constraint_failures: usize,
    /// Phase wall times
    pub durations: PhaseDurations,
}

/// Monotonic phase timer; a no-op without `std`
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimer {
    #[cfg(feature = "std")]
    start: std::time::Instant,
}

impl PhaseTimer {
    /// Start timing
    pub fn start() -> Self {
        Self {
            #[cfg(feature = "std")]
            start: std::time::Instant::now(),
        }
    }

    /// Seconds since start
    pub fn elapsed(&self) -> f64 {
        #[cfg(feature = "std")]
        {
            self.start.elapsed().as_secs_f64()
        }
        #[cfg(not(feature = "std"))]
        {
            0.0
        }
    }
}
