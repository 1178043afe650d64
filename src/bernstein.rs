//! Bernstein-basis polynomial math.
//!
//! Evaluation, derivative control-point maps, and the Gram matrices that
//! turn integrated squared derivatives (jerk, snap) into quadratic forms
//! on control points. Everything is specialized to `degree <= MAX_DEGREE`
//! and works on plain fixed-size arrays.

use heapless::Vec;

use crate::types::Vec3;
use crate::MAX_COEFS;

/// Square matrix over control-point coefficients of one segment
pub type CoefMatrix = [[f64; MAX_COEFS]; MAX_COEFS];

/// Binomial coefficient C(n, k) as f64, exact for the degrees in use
pub fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

/// Value of the i-th Bernstein basis polynomial of the given degree at u
pub fn basis_value(degree: usize, i: usize, u: f64) -> f64 {
    let mut pow_u = 1.0;
    for _ in 0..i {
        pow_u *= u;
    }
    let mut pow_1mu = 1.0;
    for _ in 0..(degree - i) {
        pow_1mu *= 1.0 - u;
    }
    binomial(degree, i) * pow_u * pow_1mu
}

/// Evaluate a Bernstein curve at u in [0, 1] by de Casteljau reduction
pub fn eval(points: &[Vec3], u: f64) -> Vec3 {
    let mut work: Vec<Vec3, MAX_COEFS> = Vec::new();
    for p in points {
        let _ = work.push(*p);
    }
    let n = work.len();
    if n == 0 {
        return Vec3::ZERO;
    }
    for level in 1..n {
        for i in 0..(n - level) {
            work[i] = work[i] * (1.0 - u) + work[i + 1] * u;
        }
    }
    work[0]
}

/// Control points of the derivative curve: degree drops by one, each point
/// is (c[i+1] - c[i]) * degree / duration
pub fn derivative_points(points: &[Vec3], duration: f64) -> Vec<Vec3, MAX_COEFS> {
    let mut out: Vec<Vec3, MAX_COEFS> = Vec::new();
    let degree = points.len().saturating_sub(1);
    if degree == 0 {
        return out;
    }
    let factor = degree as f64 / duration;
    for i in 0..degree {
        let _ = out.push((points[i + 1] - points[i]) * factor);
    }
    out
}

/// Control points of the r-th derivative curve
pub fn derivative_points_order(points: &[Vec3], duration: f64, order: usize) -> Vec<Vec3, MAX_COEFS> {
    let mut current: Vec<Vec3, MAX_COEFS> = Vec::new();
    for p in points {
        let _ = current.push(*p);
    }
    for _ in 0..order {
        let next = derivative_points(&current, duration);
        current = next;
    }
    current
}

/// Gram matrix of the Bernstein basis of the given degree over [0, 1]:
/// G[i][j] = integral of B_i B_j = C(n,i) C(n,j) / (C(2n, i+j) (2n+1))
pub fn gram_matrix(degree: usize) -> CoefMatrix {
    let mut g = [[0.0; MAX_COEFS]; MAX_COEFS];
    for i in 0..=degree {
        for j in 0..=degree {
            g[i][j] = binomial(degree, i) * binomial(degree, j)
                / (binomial(2 * degree, i + j) * (2 * degree + 1) as f64);
        }
    }
    g
}

/// Linear map from segment control points to the control points of the
/// r-th derivative, including the duration scaling.
///
/// Row k of the result holds the coefficients of derivative point k in
/// terms of the original n+1 control points.
pub fn derivative_map(degree: usize, duration: f64, order: usize) -> CoefMatrix {
    let mut map = [[0.0; MAX_COEFS]; MAX_COEFS];
    for i in 0..=degree {
        map[i][i] = 1.0;
    }

    let mut current_degree = degree;
    for _ in 0..order {
        if current_degree == 0 {
            return [[0.0; MAX_COEFS]; MAX_COEFS];
        }
        let factor = current_degree as f64 / duration;
        let mut next = [[0.0; MAX_COEFS]; MAX_COEFS];
        for row in 0..current_degree {
            for col in 0..=degree {
                next[row][col] = (map[row + 1][col] - map[row][col]) * factor;
            }
        }
        map = next;
        current_degree -= 1;
    }
    map
}

/// Quadratic form Q with x^T Q x = integral over the segment of the squared
/// r-th derivative of the curve with control points x.
///
/// Q = D_r^T G_(n-r) D_r * duration, positive semi-definite; positive
/// definite on the subspace the equality constraints leave free.
pub fn derivative_cost_matrix(degree: usize, duration: f64, order: usize) -> CoefMatrix {
    let mut q = [[0.0; MAX_COEFS]; MAX_COEFS];
    if order > degree {
        return q;
    }

    let d = derivative_map(degree, duration, order);
    let g = gram_matrix(degree - order);
    let rows = degree - order + 1;

    for i in 0..=degree {
        for j in 0..=degree {
            let mut sum = 0.0;
            for a in 0..rows {
                for b in 0..rows {
                    sum += d[a][i] * g[a][b] * d[b][j];
                }
            }
            q[i][j] = sum * duration;
        }
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(5, 0), 1.0);
        assert_eq!(binomial(5, 2), 10.0);
        assert_eq!(binomial(10, 5), 252.0);
        assert_eq!(binomial(3, 4), 0.0);
    }

    #[test]
    fn test_basis_partition_of_unity() {
        for &u in &[0.0, 0.25, 0.5, 0.75, 1.0] {
            let sum: f64 = (0..=5).map(|i| basis_value(5, i, u)).sum();
            assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_eval_endpoints() {
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
            Vec3::new(3.0, 1.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
        ];
        assert_eq!(eval(&points, 0.0), points[0]);
        assert_eq!(eval(&points, 1.0), points[3]);
    }

    #[test]
    fn test_eval_matches_basis_sum() {
        let points = [
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(2.0, -1.0, 0.5),
            Vec3::new(1.0, 3.0, 1.0),
            Vec3::new(4.0, 0.0, 2.0),
            Vec3::new(5.0, 1.0, 0.0),
            Vec3::new(6.0, 2.0, 1.0),
        ];
        let u = 0.37;
        let casteljau = eval(&points, u);
        let mut direct = Vec3::ZERO;
        for (i, p) in points.iter().enumerate() {
            direct += *p * basis_value(5, i, u);
        }
        assert!(casteljau.distance(&direct) < 1e-12);
    }

    #[test]
    fn test_derivative_of_line_is_constant() {
        // Straight-line curve traversed in 2 s has constant velocity
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
        ];
        let d = derivative_points(&points, 2.0);
        assert_eq!(d.len(), 3);
        for p in &d {
            assert!((p.x - 1.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_gram_matrix_symmetry_and_total_mass() {
        let g = gram_matrix(5);
        let mut total = 0.0;
        for i in 0..=5 {
            for j in 0..=5 {
                assert!((g[i][j] - g[j][i]).abs() < 1e-15);
                total += g[i][j];
            }
        }
        // Integral of (sum B_i)^2 = integral of 1
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_derivative_map_against_direct_differences() {
        let duration = 0.2;
        let map = derivative_map(5, duration, 1);
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.1, 0.0, 0.0),
            Vec3::new(0.3, 0.0, 0.0),
            Vec3::new(0.6, 0.0, 0.0),
            Vec3::new(0.8, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        let direct = derivative_points(&points, duration);
        for row in 0..5 {
            let mut x = 0.0;
            for col in 0..=5 {
                x += map[row][col] * points[col].x;
            }
            assert!((x - direct[row].x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cubic_jerk_cost() {
        // Cubic u^3 over [0,1]: jerk = 6, integral of jerk^2 = 36
        let points = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ];
        let q = derivative_cost_matrix(3, 1.0, 3);
        let mut cost = 0.0;
        for i in 0..=3 {
            for j in 0..=3 {
                cost += points[i].x * q[i][j] * points[j].x;
            }
        }
        assert!((cost - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_matrix_positive_semidefinite_diagonal() {
        let q = derivative_cost_matrix(5, 0.2, 3);
        for i in 0..=5 {
            assert!(q[i][i] >= 0.0);
        }
    }
}
