//! Quadratic-program assembly over trajectory control points.
//!
//! Decision variables are the control points of all segments, flattened
//! per axis (two axes in 2D mode, z is removed entirely). The objective is
//! a weighted sum of integrated squared jerk and snap plus a small
//! warm-start deviation term that keeps the Hessian strictly positive
//! definite. Equalities pin the initial state, C2 continuity, and the
//! terminal rest condition; inequalities carry the corridor half-spaces,
//! the SFC boxes, and the per-axis derivative bounds.

use heapless::Vec;

use crate::bernstein::{derivative_cost_matrix, CoefMatrix};
use crate::config::PlannerConfig;
use crate::corridor::CorridorSet;
use crate::trajectory::Trajectory;
use crate::types::{PlanError, Result, State};
use crate::{INEQ_CAP, NEQ_CAP, NVAR_CAP};

/// One linear constraint row in sparse form: sum coeff * x <= rhs for
/// inequalities, = rhs for equalities. Rows touch at most six variables.
#[derive(Debug, Clone, Default)]
pub struct SparseRow {
    /// (variable index, coefficient) pairs
    pub terms: Vec<(u16, f64), 6>,
    /// Right-hand side
    pub rhs: f64,
}

impl SparseRow {
    fn new() -> Self {
        Self::default()
    }

    fn push_term(&mut self, var: usize, coeff: f64) {
        if coeff != 0.0 {
            let _ = self.terms.push((var as u16, coeff));
        }
    }

    /// Row dot x
    pub fn dot(&self, x: &[f64]) -> f64 {
        let mut sum = 0.0;
        for &(var, coeff) in &self.terms {
            sum += coeff * x[var as usize];
        }
        sum
    }

    /// Violation of the row as an inequality (positive = violated)
    pub fn violation(&self, x: &[f64]) -> f64 {
        self.dot(x) - self.rhs
    }
}

/// Assembled quadratic program for one replanning tick
#[derive(Debug, Clone)]
pub struct QpProblem {
    /// Spatial dimension of the decision variables (2 or 3)
    pub dim: usize,
    /// Number of segments M
    pub seg_count: usize,
    /// Basis degree n
    pub degree: usize,
    /// Total number of decision variables
    pub nvar: usize,
    /// Per-segment, per-axis Hessian block (identical across segments)
    pub seg_cost: CoefMatrix,
    /// Warm-start deviation weight, also the strict-convexity floor
    pub ws_weight: f64,
    /// Flattened warm-start control points
    pub warm: Vec<f64, NVAR_CAP>,
    /// Equality rows
    pub eq: Vec<SparseRow, NEQ_CAP>,
    /// Inequality rows
    pub ineq: Vec<SparseRow, INEQ_CAP>,
    /// Rows dropped because the buffers were full
    pub dropped_rows: usize,
}

impl QpProblem {
    /// Flat index of control point i of segment m on the given axis
    pub fn vidx(&self, m: usize, i: usize, axis: usize) -> usize {
        (m * (self.degree + 1) + i) * self.dim + axis
    }

    /// out = H x, where H is the block-diagonal objective Hessian plus the
    /// warm-start diagonal
    pub fn hessian_mul(&self, x: &[f64], out: &mut [f64]) {
        let coefs = self.degree + 1;
        for v in out.iter_mut().take(self.nvar) {
            *v = 0.0;
        }
        for m in 0..self.seg_count {
            for axis in 0..self.dim {
                for i in 0..coefs {
                    let mut sum = 0.0;
                    for j in 0..coefs {
                        sum += self.seg_cost[i][j] * x[self.vidx(m, j, axis)];
                    }
                    out[self.vidx(m, i, axis)] = sum;
                }
            }
        }
        for v in 0..self.nvar {
            out[v] += self.ws_weight * x[v];
        }
    }

    /// Linear objective term: the warm-start deviation contributes
    /// -ws_weight * warm
    pub fn linear(&self, var: usize) -> f64 {
        -self.ws_weight * self.warm[var]
    }
}

/// Build the QP for this tick from the warm start, the corridor set, and
/// the dynamic limits.
pub fn assemble(
    state: &State,
    warm_start: &Trajectory,
    corridors: &CorridorSet,
    config: &PlannerConfig,
) -> Result<QpProblem> {
    let dim = config.world_dimension;
    let n = config.degree;
    let m_count = config.segment_count;
    let dt = config.segment_duration;
    let coefs = n + 1;
    let nvar = m_count * coefs * dim;
    if nvar > NVAR_CAP || warm_start.segment_count() != m_count {
        return Err(PlanError::InvalidParameter);
    }

    let mut seg_cost = derivative_cost_matrix(n, dt, 3);
    for row in seg_cost.iter_mut() {
        for v in row.iter_mut() {
            *v *= config.weights.jerk;
        }
    }
    if n >= 4 && config.weights.snap > 0.0 {
        let snap = derivative_cost_matrix(n, dt, 4);
        for i in 0..coefs {
            for j in 0..coefs {
                seg_cost[i][j] += config.weights.snap * snap[i][j];
            }
        }
    }

    let mut problem = QpProblem {
        dim,
        seg_count: m_count,
        degree: n,
        nvar,
        seg_cost,
        ws_weight: config.weights.warm_start.max(1e-9),
        warm: Vec::new(),
        eq: Vec::new(),
        ineq: Vec::new(),
        dropped_rows: 0,
    };

    for point in warm_start.control_points() {
        for axis in 0..dim {
            problem
                .warm
                .push(point.axis(axis))
                .map_err(|_| PlanError::CapacityExceeded)?;
        }
    }

    build_equalities(&mut problem, state, config)?;
    build_limit_rows(&mut problem, config);
    build_corridor_rows(&mut problem, corridors, config);

    Ok(problem)
}

fn push_eq(problem: &mut QpProblem, row: SparseRow) -> Result<()> {
    problem.eq.push(row).map_err(|_| PlanError::CapacityExceeded)
}

fn build_equalities(problem: &mut QpProblem, state: &State, config: &PlannerConfig) -> Result<()> {
    let n = problem.degree;
    let dt = config.segment_duration;
    let m_last = problem.seg_count - 1;
    let d1 = n as f64 / dt;
    let d2 = (n * (n - 1)) as f64 / (dt * dt);

    for axis in 0..problem.dim {
        // Initial position, velocity, acceleration
        let mut row = SparseRow::new();
        row.push_term(problem.vidx(0, 0, axis), 1.0);
        row.rhs = state.position.axis(axis);
        push_eq(problem, row)?;

        let mut row = SparseRow::new();
        row.push_term(problem.vidx(0, 1, axis), d1);
        row.push_term(problem.vidx(0, 0, axis), -d1);
        row.rhs = state.velocity.axis(axis);
        push_eq(problem, row)?;

        let mut row = SparseRow::new();
        row.push_term(problem.vidx(0, 2, axis), d2);
        row.push_term(problem.vidx(0, 1, axis), -2.0 * d2);
        row.push_term(problem.vidx(0, 0, axis), d2);
        row.rhs = state.acceleration.axis(axis);
        push_eq(problem, row)?;

        // C2 continuity across segment boundaries
        for m in 0..m_last {
            let mut row = SparseRow::new();
            row.push_term(problem.vidx(m, n, axis), 1.0);
            row.push_term(problem.vidx(m + 1, 0, axis), -1.0);
            push_eq(problem, row)?;

            let mut row = SparseRow::new();
            row.push_term(problem.vidx(m, n, axis), 1.0);
            row.push_term(problem.vidx(m, n - 1, axis), -1.0);
            row.push_term(problem.vidx(m + 1, 1, axis), -1.0);
            row.push_term(problem.vidx(m + 1, 0, axis), 1.0);
            push_eq(problem, row)?;

            let mut row = SparseRow::new();
            row.push_term(problem.vidx(m, n, axis), 1.0);
            row.push_term(problem.vidx(m, n - 1, axis), -2.0);
            row.push_term(problem.vidx(m, n - 2, axis), 1.0);
            row.push_term(problem.vidx(m + 1, 2, axis), -1.0);
            row.push_term(problem.vidx(m + 1, 1, axis), 2.0);
            row.push_term(problem.vidx(m + 1, 0, axis), -1.0);
            push_eq(problem, row)?;
        }

        // Terminal rest: zero velocity and acceleration
        let mut row = SparseRow::new();
        row.push_term(problem.vidx(m_last, n, axis), 1.0);
        row.push_term(problem.vidx(m_last, n - 1, axis), -1.0);
        push_eq(problem, row)?;

        let mut row = SparseRow::new();
        row.push_term(problem.vidx(m_last, n, axis), 1.0);
        row.push_term(problem.vidx(m_last, n - 1, axis), -2.0);
        row.push_term(problem.vidx(m_last, n - 2, axis), 1.0);
        push_eq(problem, row)?;
    }
    Ok(())
}

fn push_ineq(problem: &mut QpProblem, row: SparseRow) {
    if problem.ineq.push(row).is_err() {
        problem.dropped_rows += 1;
    }
}

/// Per-axis derivative bounds from the Bernstein derivative formulas
fn build_limit_rows(problem: &mut QpProblem, config: &PlannerConfig) {
    let n = problem.degree;
    let dt = config.segment_duration;
    let d1 = n as f64 / dt;
    let d2 = (n * (n - 1)) as f64 / (dt * dt);

    for m in 0..problem.seg_count {
        for axis in 0..problem.dim {
            let v_max = config.max_vel.axis(axis);
            let a_max = config.max_acc.axis(axis);

            for i in 0..n {
                for sign in [1.0, -1.0] {
                    let mut row = SparseRow::new();
                    row.push_term(problem.vidx(m, i + 1, axis), sign * d1);
                    row.push_term(problem.vidx(m, i, axis), -sign * d1);
                    row.rhs = v_max;
                    push_ineq(problem, row);
                }
            }

            for i in 0..(n - 1) {
                for sign in [1.0, -1.0] {
                    let mut row = SparseRow::new();
                    row.push_term(problem.vidx(m, i + 2, axis), sign * d2);
                    row.push_term(problem.vidx(m, i + 1, axis), -2.0 * sign * d2);
                    row.push_term(problem.vidx(m, i, axis), sign * d2);
                    row.rhs = a_max;
                    push_ineq(problem, row);
                }
            }
        }
    }
}

fn build_corridor_rows(problem: &mut QpProblem, corridors: &CorridorSet, config: &PlannerConfig) {
    let coefs = problem.degree + 1;

    // LSC half-spaces: coeffs . x >= margin + coeffs . point becomes
    // -coeffs . x <= -(margin + coeffs . point). In 2D the z coordinate is
    // pinned to the plane height, so its contribution moves into the
    // constant.
    for lsc in &corridors.lscs {
        if lsc.segment_idx >= problem.seg_count {
            continue;
        }
        let mut rhs = -(lsc.margin + lsc.coeffs.dot(&lsc.point));
        if problem.dim == 2 {
            rhs += lsc.coeffs.z * config.world_z_2d;
        }
        for i in 0..coefs {
            let mut row = SparseRow::new();
            for axis in 0..problem.dim {
                row.push_term(problem.vidx(lsc.segment_idx, i, axis), -lsc.coeffs.axis(axis));
            }
            row.rhs = rhs;
            push_ineq(problem, row);
        }
    }

    // SFC boxes: per control point, per axis bounds
    for sfc in &corridors.sfcs {
        if sfc.segment_idx >= problem.seg_count {
            continue;
        }
        for i in 0..coefs {
            for axis in 0..problem.dim {
                let mut row = SparseRow::new();
                row.push_term(problem.vidx(sfc.segment_idx, i, axis), 1.0);
                row.rhs = sfc.max.axis(axis);
                push_ineq(problem, row);

                let mut row = SparseRow::new();
                row.push_term(problem.vidx(sfc.segment_idx, i, axis), -1.0);
                row.rhs = -sfc.min.axis(axis);
                push_ineq(problem, row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initial_traj;
    use crate::types::{Agent, AgentId, Vec3};

    fn setup(config: &PlannerConfig) -> (State, Trajectory) {
        let mut agent = Agent::new(
            AgentId::new(1),
            0.15,
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(2.0, 0.0, 1.0),
        );
        agent.current_goal_point = agent.desired_goal_point;
        let warm = initial_traj::generate(&agent, None, config, 0.0, false).unwrap();
        (agent.current_state, warm)
    }

    #[test]
    fn test_variable_count() {
        let config = PlannerConfig::default();
        let (state, warm) = setup(&config);
        let problem = assemble(&state, &warm, &CorridorSet::default(), &config).unwrap();
        // 5 segments * 6 points * 3 axes
        assert_eq!(problem.nvar, 90);
        assert_eq!(problem.warm.len(), 90);
    }

    #[test]
    fn test_equality_count() {
        let config = PlannerConfig::default();
        let (state, warm) = setup(&config);
        let problem = assemble(&state, &warm, &CorridorSet::default(), &config).unwrap();
        // (3 initial + 3*(M-1) continuity + 2 terminal) per axis
        assert_eq!(problem.eq.len(), (3 + 3 * 4 + 2) * 3);
    }

    #[test]
    fn test_2d_mode_drops_z() {
        let config = PlannerConfig {
            world_dimension: 2,
            ..Default::default()
        };
        let (state, warm) = setup(&config);
        let problem = assemble(&state, &warm, &CorridorSet::default(), &config).unwrap();
        assert_eq!(problem.nvar, 60);
        assert_eq!(problem.eq.len(), (3 + 3 * 4 + 2) * 2);
    }

    #[test]
    fn test_warm_start_satisfies_initial_equalities() {
        let config = PlannerConfig::default();
        let (state, warm) = setup(&config);
        let problem = assemble(&state, &warm, &CorridorSet::default(), &config).unwrap();
        // The first rows pin the initial position; the warm start was built
        // from the same state
        for row in problem.eq.iter().take(3) {
            assert!((row.dot(&problem.warm) - row.rhs).abs() < 1e-9);
        }
    }

    #[test]
    fn test_hessian_mul_is_symmetric_psd_quadratic() {
        let config = PlannerConfig::default();
        let (state, warm) = setup(&config);
        let problem = assemble(&state, &warm, &CorridorSet::default(), &config).unwrap();

        let mut x = [0.0f64; NVAR_CAP];
        for (i, v) in x.iter_mut().enumerate().take(problem.nvar) {
            *v = libm::sin(i as f64);
        }
        let mut hx = [0.0f64; NVAR_CAP];
        problem.hessian_mul(&x, &mut hx);
        let mut quad = 0.0;
        for i in 0..problem.nvar {
            quad += x[i] * hx[i];
        }
        assert!(quad > 0.0);
    }

    #[test]
    fn test_limit_rows_flag_violations() {
        let config = PlannerConfig::default();
        let mut agent = Agent::new(
            AgentId::new(1),
            0.15,
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 1.0),
        );
        agent.current_goal_point = agent.desired_goal_point;
        let warm = initial_traj::generate(&agent, None, &config, 0.0, false).unwrap();
        let problem = assemble(&agent.current_state, &warm, &CorridorSet::default(), &config).unwrap();

        // A hover warm start respects every derivative bound
        let worst = problem
            .ineq
            .iter()
            .map(|row| row.violation(&problem.warm))
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(worst <= 1e-9, "hover warm start should respect limits, worst {worst}");

        // A point set sweeping 1 m per control step breaks the velocity rows
        let mut fast = problem.warm.clone();
        for (i, v) in fast.iter_mut().enumerate() {
            *v += i as f64;
        }
        let worst = problem
            .ineq
            .iter()
            .map(|row| row.violation(&fast))
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(worst > 0.0);
    }
}
