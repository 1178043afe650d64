//! Quadratic-program solver.
//!
//! The solver sits behind the narrow `QpSolver` trait so the planning core
//! can be exercised against any implementation. `ActiveSetSolver` is the
//! in-process default: equality constraints are eliminated through a
//! null-space basis obtained by Gauss-Jordan reduction, then a primal
//! active-set loop adds the most violated inequality and drops constraints
//! with negative multipliers until the KKT conditions hold. All pivoting
//! and tie-breaking is index-ordered, so identical inputs produce
//! identical outputs. The iteration budget doubles as the deadline; an
//! exhausted budget is a numerical failure, never a hang.

use core::fmt;

use heapless::Vec;

use crate::config::SolverConfig;
use crate::qp::QpProblem;
use crate::{NEQ_CAP, NVAR_CAP};

/// Reduced-space capacity: decision variables left after equality
/// elimination at the largest legal configuration
pub const NRED_CAP: usize = 48;

/// Maximum simultaneously active inequality rows
pub const NACT_CAP: usize = NRED_CAP;

const KKT_CAP: usize = NRED_CAP + NACT_CAP;

/// Terminal status of one solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SolverStatus {
    /// KKT point found, all constraints satisfied
    Success,
    /// The constraint set admits no solution
    Infeasible,
    /// Budget exhausted or a linear solve broke down
    NumericalFail,
}

/// Solver output
#[derive(Debug, Clone)]
pub struct QpSolution {
    /// Decision variables (the warm start when status is not Success)
    pub x: Vec<f64, NVAR_CAP>,
    /// Terminal status
    pub status: SolverStatus,
    /// Active-set iterations consumed
    pub iterations: usize,
    /// Inequality rows active at the solution
    pub active_count: usize,
}

/// Narrow solver interface; the core is testable against any
/// implementation with deterministic output
pub trait QpSolver {
    /// Solve the assembled problem; `regularization` is added to the
    /// reduced Hessian diagonal (used on the numerical-failure retry)
    fn solve(&mut self, problem: &QpProblem, regularization: f64) -> QpSolution;
}

/// Dense null-space active-set solver
pub struct ActiveSetSolver {
    max_iterations: usize,
    tolerance: f64,
    aeq: [f64; NEQ_CAP * NVAR_CAP],
    beq: [f64; NEQ_CAP],
    pivot_cols: [usize; NEQ_CAP],
    free_cols: [usize; NRED_CAP],
    is_pivot: [bool; NVAR_CAP],
    z: [f64; NVAR_CAP * NRED_CAP],
    xp: [f64; NVAR_CAP],
    hred: [f64; NRED_CAP * NRED_CAP],
    qred: [f64; NRED_CAP],
    gact: [f64; NACT_CAP * NRED_CAP],
    ract: [f64; NACT_CAP],
    active: [usize; NACT_CAP],
    kkt: [f64; KKT_CAP * KKT_CAP],
    rhs: [f64; KKT_CAP],
    scratch_a: [f64; NVAR_CAP],
    scratch_b: [f64; NVAR_CAP],
}

impl fmt::Debug for ActiveSetSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSetSolver")
            .field("max_iterations", &self.max_iterations)
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl ActiveSetSolver {
    /// Build a solver from the planner's solver configuration
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            aeq: [0.0; NEQ_CAP * NVAR_CAP],
            beq: [0.0; NEQ_CAP],
            pivot_cols: [0; NEQ_CAP],
            free_cols: [0; NRED_CAP],
            is_pivot: [false; NVAR_CAP],
            z: [0.0; NVAR_CAP * NRED_CAP],
            xp: [0.0; NVAR_CAP],
            hred: [0.0; NRED_CAP * NRED_CAP],
            qred: [0.0; NRED_CAP],
            gact: [0.0; NACT_CAP * NRED_CAP],
            ract: [0.0; NACT_CAP],
            active: [0; NACT_CAP],
            kkt: [0.0; KKT_CAP * KKT_CAP],
            rhs: [0.0; KKT_CAP],
            scratch_a: [0.0; NVAR_CAP],
            scratch_b: [0.0; NVAR_CAP],
        }
    }

    fn failed(problem: &QpProblem, status: SolverStatus, iterations: usize) -> QpSolution {
        QpSolution {
            x: problem.warm.clone(),
            status,
            iterations,
            active_count: 0,
        }
    }

    /// Gauss-Jordan reduction of the equality system; returns the rank or
    /// None when the system is inconsistent
    fn reduce_equalities(&mut self, problem: &QpProblem) -> Option<usize> {
        let nvar = problem.nvar;
        let neq = problem.eq.len();

        for r in 0..neq {
            for c in 0..nvar {
                self.aeq[r * NVAR_CAP + c] = 0.0;
            }
            self.beq[r] = 0.0;
        }
        for (r, row) in problem.eq.iter().enumerate() {
            for &(var, coeff) in &row.terms {
                self.aeq[r * NVAR_CAP + var as usize] = coeff;
            }
            self.beq[r] = row.rhs;
        }

        let mut rank = 0;
        for col in 0..nvar {
            if rank == neq {
                break;
            }
            let mut pivot_row = rank;
            let mut pivot_val = libm::fabs(self.aeq[rank * NVAR_CAP + col]);
            for r in (rank + 1)..neq {
                let v = libm::fabs(self.aeq[r * NVAR_CAP + col]);
                if v > pivot_val {
                    pivot_val = v;
                    pivot_row = r;
                }
            }
            if pivot_val < 1e-10 {
                continue;
            }
            if pivot_row != rank {
                for c in 0..nvar {
                    self.aeq.swap(pivot_row * NVAR_CAP + c, rank * NVAR_CAP + c);
                }
                self.beq.swap(pivot_row, rank);
            }
            let inv = 1.0 / self.aeq[rank * NVAR_CAP + col];
            for c in 0..nvar {
                self.aeq[rank * NVAR_CAP + c] *= inv;
            }
            self.beq[rank] *= inv;
            for r in 0..neq {
                if r == rank {
                    continue;
                }
                let factor = self.aeq[r * NVAR_CAP + col];
                if factor != 0.0 {
                    for c in 0..nvar {
                        self.aeq[r * NVAR_CAP + c] -= factor * self.aeq[rank * NVAR_CAP + c];
                    }
                    self.beq[r] -= factor * self.beq[rank];
                }
            }
            self.pivot_cols[rank] = col;
            rank += 1;
        }

        for r in rank..neq {
            if libm::fabs(self.beq[r]) > 1e-8 {
                return None;
            }
        }
        Some(rank)
    }

    /// Particular solution and null-space basis from the reduced system
    fn build_null_space(&mut self, problem: &QpProblem, rank: usize, nred: usize) {
        let nvar = problem.nvar;

        for v in 0..nvar {
            self.is_pivot[v] = false;
        }
        for r in 0..rank {
            self.is_pivot[self.pivot_cols[r]] = true;
        }
        let mut j = 0;
        for v in 0..nvar {
            if !self.is_pivot[v] {
                self.free_cols[j] = v;
                j += 1;
            }
        }

        // Free variables keep their warm-start values; pivots follow
        for v in 0..nvar {
            self.xp[v] = 0.0;
        }
        for j in 0..nred {
            let f = self.free_cols[j];
            self.xp[f] = problem.warm[f];
        }
        for r in 0..rank {
            let mut value = self.beq[r];
            for j in 0..nred {
                let f = self.free_cols[j];
                value -= self.aeq[r * NVAR_CAP + f] * problem.warm[f];
            }
            self.xp[self.pivot_cols[r]] = value;
        }

        for v in 0..nvar {
            for j in 0..nred {
                self.z[v * NRED_CAP + j] = 0.0;
            }
        }
        for j in 0..nred {
            self.z[self.free_cols[j] * NRED_CAP + j] = 1.0;
        }
        for r in 0..rank {
            let p = self.pivot_cols[r];
            for j in 0..nred {
                let f = self.free_cols[j];
                self.z[p * NRED_CAP + j] = -self.aeq[r * NVAR_CAP + f];
            }
        }
    }

    /// Reduced Hessian and gradient
    fn build_reduced_objective(&mut self, problem: &QpProblem, nred: usize, regularization: f64) {
        let nvar = problem.nvar;

        // scratch_a = H xp + q
        problem.hessian_mul(&self.xp[..nvar], &mut self.scratch_a[..nvar]);
        for v in 0..nvar {
            self.scratch_a[v] += problem.linear(v);
        }
        for j in 0..nred {
            let mut sum = 0.0;
            for v in 0..nvar {
                sum += self.z[v * NRED_CAP + j] * self.scratch_a[v];
            }
            self.qred[j] = sum;
        }

        for j in 0..nred {
            for v in 0..nvar {
                self.scratch_b[v] = self.z[v * NRED_CAP + j];
            }
            problem.hessian_mul(&self.scratch_b[..nvar], &mut self.scratch_a[..nvar]);
            for i in 0..nred {
                let mut sum = 0.0;
                for v in 0..nvar {
                    sum += self.z[v * NRED_CAP + i] * self.scratch_a[v];
                }
                self.hred[i * NRED_CAP + j] = sum;
            }
        }
        for j in 0..nred {
            self.hred[j * NRED_CAP + j] += regularization;
        }
    }

    /// Solve the KKT system for the current active set; false on breakdown
    fn solve_kkt(&mut self, nred: usize, nact: usize) -> bool {
        let dim = nred + nact;
        for i in 0..dim {
            for j in 0..dim {
                self.kkt[i * KKT_CAP + j] = 0.0;
            }
        }
        for i in 0..nred {
            for j in 0..nred {
                self.kkt[i * KKT_CAP + j] = self.hred[i * NRED_CAP + j];
            }
            self.rhs[i] = -self.qred[i];
        }
        for a in 0..nact {
            for j in 0..nred {
                let g = self.gact[a * NRED_CAP + j];
                self.kkt[(nred + a) * KKT_CAP + j] = g;
                self.kkt[j * KKT_CAP + nred + a] = g;
            }
            self.rhs[nred + a] = self.ract[a];
        }

        // Gaussian elimination with partial pivoting
        for col in 0..dim {
            let mut pivot_row = col;
            let mut pivot_val = libm::fabs(self.kkt[col * KKT_CAP + col]);
            for r in (col + 1)..dim {
                let v = libm::fabs(self.kkt[r * KKT_CAP + col]);
                if v > pivot_val {
                    pivot_val = v;
                    pivot_row = r;
                }
            }
            if pivot_val < 1e-12 {
                return false;
            }
            if pivot_row != col {
                for c in 0..dim {
                    self.kkt.swap(pivot_row * KKT_CAP + c, col * KKT_CAP + c);
                }
                self.rhs.swap(pivot_row, col);
            }
            let diag = self.kkt[col * KKT_CAP + col];
            for r in (col + 1)..dim {
                let factor = self.kkt[r * KKT_CAP + col] / diag;
                if factor != 0.0 {
                    for c in col..dim {
                        self.kkt[r * KKT_CAP + c] -= factor * self.kkt[col * KKT_CAP + c];
                    }
                    self.rhs[r] -= factor * self.rhs[col];
                }
            }
        }
        for col in (0..dim).rev() {
            let mut sum = self.rhs[col];
            for c in (col + 1)..dim {
                sum -= self.kkt[col * KKT_CAP + c] * self.rhs[c];
            }
            self.rhs[col] = sum / self.kkt[col * KKT_CAP + col];
        }
        true
    }

    /// x = xp + Z y into scratch_a
    fn expand_solution(&mut self, nvar: usize, nred: usize) {
        for v in 0..nvar {
            let mut value = self.xp[v];
            for j in 0..nred {
                value += self.z[v * NRED_CAP + j] * self.rhs[j];
            }
            self.scratch_a[v] = value;
        }
    }
}

impl QpSolver for ActiveSetSolver {
    fn solve(&mut self, problem: &QpProblem, regularization: f64) -> QpSolution {
        let nvar = problem.nvar;
        let neq = problem.eq.len();
        if nvar > NVAR_CAP || neq > NEQ_CAP {
            return Self::failed(problem, SolverStatus::NumericalFail, 0);
        }

        let rank = match self.reduce_equalities(problem) {
            Some(rank) => rank,
            None => return Self::failed(problem, SolverStatus::Infeasible, 0),
        };
        let nred = nvar - rank;
        if nred > NRED_CAP {
            return Self::failed(problem, SolverStatus::NumericalFail, 0);
        }

        self.build_null_space(problem, rank, nred);

        // Fully determined by the equalities: only feasibility is left
        if nred == 0 {
            let mut x = Vec::new();
            for v in 0..nvar {
                let _ = x.push(self.xp[v]);
            }
            let feasible = problem
                .ineq
                .iter()
                .all(|row| row.violation(&x) <= self.tolerance);
            return QpSolution {
                status: if feasible {
                    SolverStatus::Success
                } else {
                    SolverStatus::Infeasible
                },
                x,
                iterations: 0,
                active_count: 0,
            };
        }

        self.build_reduced_objective(problem, nred, regularization);

        let mut nact = 0usize;
        let mut added_last = false;
        for iteration in 1..=self.max_iterations {
            if !self.solve_kkt(nred, nact) {
                // A violated row dependent on the active set means the
                // feasible region is empty in the equality subspace
                let status = if added_last {
                    SolverStatus::Infeasible
                } else {
                    SolverStatus::NumericalFail
                };
                return Self::failed(problem, status, iteration);
            }

            // Drop the most negative multiplier first
            let mut drop_idx = None;
            let mut most_negative = -self.tolerance;
            for a in 0..nact {
                let lambda = self.rhs[nred + a];
                if lambda < most_negative {
                    most_negative = lambda;
                    drop_idx = Some(a);
                }
            }
            if let Some(a) = drop_idx {
                for b in a..(nact - 1) {
                    self.active[b] = self.active[b + 1];
                    self.ract[b] = self.ract[b + 1];
                    for j in 0..nred {
                        self.gact[b * NRED_CAP + j] = self.gact[(b + 1) * NRED_CAP + j];
                    }
                }
                nact -= 1;
                added_last = false;
                continue;
            }

            self.expand_solution(nvar, nred);

            // Most violated inactive row
            let mut worst = self.tolerance;
            let mut worst_row = None;
            for (ri, row) in problem.ineq.iter().enumerate() {
                if self.active[..nact].contains(&ri) {
                    continue;
                }
                let violation = row.violation(&self.scratch_a[..nvar]);
                if violation > worst {
                    worst = violation;
                    worst_row = Some(ri);
                }
            }

            let ri = match worst_row {
                None => {
                    let mut x = Vec::new();
                    for v in 0..nvar {
                        let _ = x.push(self.scratch_a[v]);
                    }
                    return QpSolution {
                        x,
                        status: SolverStatus::Success,
                        iterations: iteration,
                        active_count: nact,
                    };
                }
                Some(ri) => ri,
            };

            if nact == NACT_CAP {
                return Self::failed(problem, SolverStatus::NumericalFail, iteration);
            }

            let row = &problem.ineq[ri];
            for j in 0..nred {
                let mut sum = 0.0;
                for &(var, coeff) in &row.terms {
                    sum += coeff * self.z[var as usize * NRED_CAP + j];
                }
                self.gact[nact * NRED_CAP + j] = sum;
            }
            let mut gxp = 0.0;
            for &(var, coeff) in &row.terms {
                gxp += coeff * self.xp[var as usize];
            }
            self.ract[nact] = row.rhs - gxp;
            self.active[nact] = ri;
            nact += 1;
            added_last = true;
        }

        Self::failed(problem, SolverStatus::NumericalFail, self.max_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::corridor::CorridorSet;
    use crate::initial_traj;
    use crate::qp::{assemble, SparseRow};
    use crate::types::{Agent, AgentId, State, Vec3};

    fn problem_for(start: Vec3, goal: Vec3, config: &PlannerConfig) -> (State, QpProblem) {
        let mut agent = Agent::new(AgentId::new(1), 0.15, start, goal);
        agent.current_goal_point = goal;
        let warm = initial_traj::generate(&agent, None, config, 0.0, false).unwrap();
        let problem = assemble(&agent.current_state, &warm, &CorridorSet::default(), config).unwrap();
        (agent.current_state, problem)
    }

    fn check_equalities(problem: &QpProblem, x: &[f64]) {
        for row in &problem.eq {
            assert!(
                (row.dot(x) - row.rhs).abs() < 1e-6,
                "equality residual too large"
            );
        }
    }

    #[test]
    fn test_unconstrained_solve_satisfies_equalities() {
        let config = PlannerConfig::default();
        let (_, problem) = problem_for(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            &config,
        );
        let mut solver = ActiveSetSolver::from_config(&config.solver);
        let solution = solver.solve(&problem, 0.0);
        assert_eq!(solution.status, SolverStatus::Success);
        check_equalities(&problem, &solution.x);
    }

    #[test]
    fn test_active_bound_is_respected() {
        let config = PlannerConfig::default();
        let (_, mut problem) = problem_for(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            &config,
        );
        // Cap a mid-horizon x control point below its warm-start value
        let var = problem.vidx(2, 3, 0);
        let bound = problem.warm[var] - 0.05;
        let mut row = SparseRow::default();
        let _ = row.terms.push((var as u16, 1.0));
        row.rhs = bound;
        let _ = problem.ineq.push(row);

        let mut solver = ActiveSetSolver::from_config(&config.solver);
        let solution = solver.solve(&problem, 0.0);
        assert_eq!(solution.status, SolverStatus::Success);
        assert!(solution.x[var] <= bound + 1e-6);
        check_equalities(&problem, &solution.x);
    }

    #[test]
    fn test_contradictory_rows_are_infeasible() {
        let config = PlannerConfig::default();
        let (_, mut problem) = problem_for(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            &config,
        );
        let var = problem.vidx(2, 3, 0);
        // x <= -1 and -x <= -2 (x >= 2) cannot both hold
        let mut row = SparseRow::default();
        let _ = row.terms.push((var as u16, 1.0));
        row.rhs = -1.0;
        let _ = problem.ineq.push(row);
        let mut row = SparseRow::default();
        let _ = row.terms.push((var as u16, -1.0));
        row.rhs = -2.0;
        let _ = problem.ineq.push(row);

        let mut solver = ActiveSetSolver::from_config(&config.solver);
        let solution = solver.solve(&problem, 0.0);
        assert_eq!(solution.status, SolverStatus::Infeasible);
    }

    #[test]
    fn test_deterministic_output() {
        let config = PlannerConfig::default();
        let (_, problem) = problem_for(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(2.0, 1.0, 1.0),
            &config,
        );
        let mut solver = ActiveSetSolver::from_config(&config.solver);
        let first = solver.solve(&problem, 0.0);
        let second = solver.solve(&problem, 0.0);
        assert_eq!(first.status, SolverStatus::Success);
        assert_eq!(first.x, second.x);
        assert_eq!(first.iterations, second.iterations);
    }

    #[test]
    fn test_inconsistent_equalities_are_infeasible() {
        let config = PlannerConfig::default();
        let (_, mut problem) = problem_for(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            &config,
        );
        // Duplicate the first equality with a different right-hand side
        let mut row = problem.eq[0].clone();
        row.rhs += 1.0;
        let _ = problem.eq.push(row);

        let mut solver = ActiveSetSolver::from_config(&config.solver);
        let solution = solver.solve(&problem, 0.0);
        assert_eq!(solution.status, SolverStatus::Infeasible);
    }
}
