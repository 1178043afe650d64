//! Geometry kernel: exact closest-point and distance routines.
//!
//! Pure functions over points, rays, line segments, and convex hulls:
//! - closest points between point/line, point/ray, point/segment
//! - closest points between two segments (parallel and skew branches)
//! - closest points between two time-synchronized line paths
//! - point vs convex hull via GJK
//! - collision time between two moving points with linear paths
//!
//! Every routine returns the witness pair where the minimum is attained,
//! not merely a pair achieving the right distance; corridor construction
//! uses the witness direction. Epsilons are dimensionless and applied to
//! normalized quantities.

use heapless::Vec;

use crate::types::{Obstacle, ObstacleType, Vec3};

/// Epsilon for comparisons on normalized quantities (unit sphere)
pub const EPS_UNIT: f64 = 1e-5;

/// Maximum vertices accepted for a convex hull query
pub const MAX_HULL_VERTICES: usize = 16;

/// Closest-point pair between two bodies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoints {
    /// Witness on the first body
    pub point_a: Vec3,
    /// Witness on the second body
    pub point_b: Vec3,
    /// Distance between the witnesses
    pub dist: f64,
}

impl ClosestPoints {
    fn between(point_a: Vec3, point_b: Vec3) -> Self {
        Self {
            point_a,
            point_b,
            dist: point_a.distance(&point_b),
        }
    }

    /// The same pair viewed from the other body
    pub fn swapped(&self) -> Self {
        Self {
            point_a: self.point_b,
            point_b: self.point_a,
            dist: self.dist,
        }
    }
}

/// Directed line segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    /// Segment start
    pub start: Vec3,
    /// Segment end
    pub end: Vec3,
}

impl Line {
    /// Create a segment from start to end
    pub const fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    /// Unit direction, zero for a degenerate segment
    pub fn direction(&self) -> Vec3 {
        (self.end - self.start).normalized()
    }

    /// Segment length
    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }

    /// Point at interpolation parameter alpha in [0, 1]
    pub fn at(&self, alpha: f64) -> Vec3 {
        self.start + (self.end - self.start) * alpha
    }

    fn relative_to(&self, other: &Line) -> Line {
        Line::new(self.start - other.start, self.end - other.end)
    }
}

/// Closest points between a point and an infinite line
pub fn closest_points_point_and_line(point: Vec3, line_point: Vec3, line_direction: Vec3) -> ClosestPoints {
    let a = line_point - point;
    let c = a - line_direction * a.dot(&line_direction);
    ClosestPoints {
        point_a: point,
        point_b: point + c,
        dist: c.norm(),
    }
}

/// Closest points between a point and a ray
pub fn closest_points_point_and_ray(point: Vec3, ray_start: Vec3, ray_direction: Vec3) -> ClosestPoints {
    let delta_to_start = point - ray_start;
    if delta_to_start.dot(&ray_direction) < 0.0 {
        // Behind the ray origin, the origin itself is the witness
        ClosestPoints::between(point, ray_start)
    } else {
        closest_points_point_and_line(point, ray_start, ray_direction)
    }
}

/// Closest points between a point and a line segment
pub fn closest_points_point_and_segment(point: Vec3, line: &Line) -> ClosestPoints {
    let a = line.start - point;
    let b = line.end - point;

    let mut dist_min = a.norm();
    let mut rel_closest = a;

    if a != b {
        let dist = b.norm();
        if dist < dist_min {
            dist_min = dist;
            rel_closest = b;
        }

        let n_line = (b - a).normalized();
        let c = a - n_line * a.dot(&n_line);
        let dist = c.norm();
        if (c - a).dot(&(c - b)) < 0.0 && dist < dist_min {
            dist_min = dist;
            rel_closest = c;
        }
    }

    ClosestPoints {
        point_a: point,
        point_b: rel_closest + point,
        dist: dist_min,
    }
}

/// Closest points between two line paths traversed over the same interval.
///
/// Finds alpha in [0, 1] minimizing |line1(alpha) - line2(alpha)| and
/// returns the witness on each path at that alpha.
pub fn closest_points_between_line_paths(line1: &Line, line2: &Line) -> ClosestPoints {
    let rel_path = line2.relative_to(line1);

    let rel_closest = closest_points_point_and_segment(Vec3::ZERO, &rel_path);
    let line_length = rel_path.length();
    let alpha = if line_length > 0.0 {
        (rel_closest.point_b - rel_path.start).norm() / line_length
    } else {
        0.0
    };

    ClosestPoints {
        point_a: line1.at(alpha),
        point_b: line2.at(alpha),
        dist: rel_closest.dist,
    }
}

/// Closest points between two infinite lines given as non-degenerate segments.
///
/// Zero-length input violates the kernel contract: debug builds assert,
/// release builds log and return a conservative witness at the inputs.
pub fn closest_points_between_lines(line1: &Line, line2: &Line) -> ClosestPoints {
    debug_assert!(line1.length() > 0.0, "line1 start and end are equal");
    debug_assert!(line2.length() > 0.0, "line2 start and end are equal");
    if line1.length() == 0.0 || line2.length() == 0.0 {
        log::warn!("geometry: zero-length line where a proper line is required");
        return ClosestPoints::between(line1.start, line2.start);
    }

    let n1 = line1.direction();
    let n2 = line2.direction();

    if n1.distance(&n2) < EPS_UNIT || n1.distance(&(-n2)) < EPS_UNIT {
        // Parallel lines: project the offset out of the shared direction
        let mut delta = line2.start - line1.start;
        delta = delta - n1 * delta.dot(&n1);
        ClosestPoints {
            point_a: line1.start,
            point_b: line1.start + delta,
            dist: delta.norm(),
        }
    } else {
        // Solve line1.start + a1*n1 + a3*n3 = line2.start + a2*n2
        let delta = line2.start - line1.start;
        let n3 = n2.cross(&n1).normalized();
        let alphas = solve3(
            [
                [n1.x, -n2.x, n3.x],
                [n1.y, -n2.y, n3.y],
                [n1.z, -n2.z, n3.z],
            ],
            [delta.x, delta.y, delta.z],
        );
        ClosestPoints {
            point_a: line1.start + n1 * alphas[0],
            point_b: line2.start + n2 * alphas[1],
            dist: libm::fabs(alphas[2]),
        }
    }
}

/// Closest points between two line segments.
///
/// Degenerate segments degrade to the point-vs-segment routine; exact
/// colinearity takes the parallel branch under `EPS_UNIT`.
pub fn closest_points_between_segments(line1: &Line, line2: &Line) -> ClosestPoints {
    if line1.length() < EPS_UNIT {
        return closest_points_point_and_segment(line1.start, line2);
    }
    if line2.length() < EPS_UNIT {
        return closest_points_point_and_segment(line2.start, line1).swapped();
    }

    let v1 = line1.end - line1.start;
    let v2 = line2.end - line2.start;
    let l1 = v1.norm();
    let l2 = v2.norm();
    let n1 = v1 * (1.0 / l1);
    let n2 = v2 * (1.0 / l2);

    if n1.cross(&n2).norm() < EPS_UNIT {
        // Parallel segments: order the projections of line2 onto line1
        let mut bound_min = (line2.start - line1.start).dot(&n1);
        let mut bound_max = (line2.end - line1.start).dot(&n1);
        let mut p2_min = line2.start;
        let mut p2_max = line2.end;
        if bound_max < bound_min {
            core::mem::swap(&mut bound_min, &mut bound_max);
            core::mem::swap(&mut p2_min, &mut p2_max);
        }

        let mut delta = line2.start - line1.start;
        delta = delta - n1 * delta.dot(&n1);

        let (point_a, point_b) = if l1 < bound_min {
            (line1.end, p2_min)
        } else if bound_max < 0.0 {
            (line1.start, p2_max)
        } else if bound_min < 0.0 {
            (line1.start, line1.start + delta)
        } else {
            (p2_min - delta, p2_min)
        };
        ClosestPoints::between(point_a, point_b)
    } else {
        let mut closest = closest_points_between_lines(line1, line2);

        let alpha1 = (closest.point_a - line1.start).dot(&n1) / l1;
        let alpha2 = (closest.point_b - line2.start).dot(&n2) / l2;

        if alpha1 < 0.0 {
            closest.point_a = line1.start;
        } else if alpha1 > 1.0 {
            closest.point_a = line1.end;
        }

        if alpha2 < 0.0 {
            closest.point_b = line2.start;
        } else if alpha2 > 1.0 {
            closest.point_b = line2.end;
        }

        if alpha1 < 0.0 || alpha1 > 1.0 {
            let mut dot = n2.dot(&(closest.point_a - line2.start));
            dot = dot.clamp(0.0, l2);
            closest.point_b = line2.start + n2 * dot;
        }

        if alpha2 < 0.0 || alpha2 > 1.0 {
            let mut dot = n1.dot(&(closest.point_b - line1.start));
            dot = dot.clamp(0.0, l1);
            closest.point_a = line1.start + n1 * dot;
        }

        closest.dist = closest.point_a.distance(&closest.point_b);
        closest
    }
}

/// Closest points between a point and the convex hull of a vertex set (GJK).
///
/// The hull is given by its vertices; the second body of the GJK pair is
/// the single-point body at `point`. The returned witness on the hull is
/// reconstructed from the terminal simplex.
pub fn closest_points_point_and_convex_hull(
    point: Vec3,
    hull: &[Vec3],
) -> ClosestPoints {
    debug_assert!(!hull.is_empty(), "convex hull needs at least one vertex");
    if hull.is_empty() {
        log::warn!("geometry: empty convex hull query");
        return ClosestPoints::between(point, point);
    }

    // Work on the translated body {v - point}; the query becomes the
    // distance from the origin to that hull.
    let mut simplex: Vec<Vec3, 4> = Vec::new();
    let mut simplex_orig: Vec<Vec3, 4> = Vec::new();
    let _ = simplex.push(hull[0] - point);
    let _ = simplex_orig.push(hull[0]);

    let mut best = simplex[0];
    for _ in 0..64 {
        let (closest, lambdas) = closest_on_simplex(&simplex);
        best = closest;

        // Drop vertices that do not contribute to the closest point
        let mut i = 0;
        while i < simplex.len() {
            if lambdas[i] <= 0.0 && simplex.len() > 1 {
                simplex.swap_remove(i);
                simplex_orig.swap_remove(i);
                // swap_remove reorders, restart the scan
                break;
            }
            i += 1;
        }
        if i < simplex.len() {
            continue;
        }

        if best.norm() < 1e-12 {
            break; // Point inside the hull
        }

        // Support in direction -closest
        let mut support_idx = 0;
        let mut support_val = f64::INFINITY;
        for (idx, v) in hull.iter().enumerate() {
            let val = (*v - point).dot(&best);
            if val < support_val - 1e-15 {
                support_val = val;
                support_idx = idx;
            }
        }

        // No further progress possible
        if best.norm_sq() - support_val <= EPS_UNIT * EPS_UNIT * best.norm_sq().max(1.0) {
            break;
        }
        let candidate = hull[support_idx] - point;
        if simplex.iter().any(|v| v.distance(&candidate) < 1e-12) {
            break;
        }
        if simplex.push(candidate).is_err() {
            break;
        }
        let _ = simplex_orig.push(hull[support_idx]);
    }

    // Witness on the hull from the terminal simplex combination
    let (closest, lambdas) = closest_on_simplex(&simplex);
    let mut witness = Vec3::ZERO;
    for (i, p) in simplex_orig.iter().enumerate() {
        witness += *p * lambdas[i];
    }
    ClosestPoints {
        point_a: point,
        point_b: witness,
        dist: closest.norm(),
    }
}

/// Collision entry time between two moving points with linear paths of the
/// same duration and a combined collision radius.
///
/// Returns infinity when the minimum relative distance stays above the
/// radius; 0 when the paths start in collision; otherwise the time at
/// which the relative distance first reaches the radius.
pub fn compute_collision_time(
    obs_path: &Line,
    agent_path: &Line,
    collision_radius: f64,
    time_horizon: f64,
) -> f64 {
    let closest = closest_points_between_line_paths(obs_path, agent_path);
    if closest.dist > collision_radius {
        return f64::INFINITY;
    }

    let a = agent_path.start - obs_path.start;
    let b = agent_path.end - obs_path.end;
    let delta = closest.point_b - closest.point_a;

    if a.norm() <= collision_radius {
        return 0.0;
    }
    let rel_len = (b - a).norm();
    if rel_len < 1e-12 {
        // Constant relative offset above was not in collision at t=0
        return f64::INFINITY;
    }

    if delta.distance(&b) < 1e-9 {
        // Minimum attained at the final endpoint
        let dist_to_b = b.norm();
        let n_line = (b - a).normalized();
        let c = a - n_line * a.dot(&n_line);
        let dist_to_c = c.norm();
        let in_sphere1 = libm::sqrt((collision_radius * collision_radius - dist_to_c * dist_to_c).max(0.0));
        let in_sphere2 = libm::sqrt((dist_to_b * dist_to_b - dist_to_c * dist_to_c).max(0.0));
        (1.0 - (in_sphere1 - in_sphere2) / rel_len) * time_horizon
    } else {
        let dist_to_b = b.norm();
        let in_sphere1 = libm::sqrt((collision_radius * collision_radius - closest.dist * closest.dist).max(0.0));
        let in_sphere2 = libm::sqrt((dist_to_b * dist_to_b - closest.dist * closest.dist).max(0.0));
        (1.0 - (in_sphere1 + in_sphere2) / rel_len) * time_horizon
    }
}

/// Distance one can travel from `position` along `direction` before
/// entering any obstacle's inflated sphere.
///
/// Static obstacles are excluded; they are covered by the distance map.
pub fn safe_dist_in_direction(
    position: Vec3,
    direction: Vec3,
    obstacles: &[Obstacle],
    radius: f64,
) -> f64 {
    let mut safe_dist = f64::INFINITY;

    for obstacle in obstacles {
        if obstacle.obstacle_type == ObstacleType::Static {
            continue;
        }

        let radius_sum = obstacle.radius + radius;
        let closest = closest_points_point_and_ray(obstacle.position, position, direction);
        if closest.dist < radius_sum {
            let dist_to_closest = (closest.point_b - position).norm();
            let cut = libm::sqrt(radius_sum * radius_sum - closest.dist * closest.dist);
            let candidate = (dist_to_closest - cut).max(0.0);
            if candidate < safe_dist {
                safe_dist = candidate;
            }
        }
    }

    safe_dist
}

// ============================================================================
// Internals
// ============================================================================

/// Solve a 3x3 linear system by Gaussian elimination with partial pivoting
fn solve3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> [f64; 3] {
    for col in 0..3 {
        let mut pivot = col;
        for row in (col + 1)..3 {
            if libm::fabs(a[row][col]) > libm::fabs(a[pivot][col]) {
                pivot = row;
            }
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        let diag = a[col][col];
        if libm::fabs(diag) < 1e-14 {
            continue;
        }
        for row in (col + 1)..3 {
            let factor = a[row][col] / diag;
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; 3];
    for col in (0..3).rev() {
        let mut sum = b[col];
        for k in (col + 1)..3 {
            sum -= a[col][k] * x[k];
        }
        x[col] = if libm::fabs(a[col][col]) < 1e-14 {
            0.0
        } else {
            sum / a[col][col]
        };
    }
    x
}

/// Closest point to the origin on the convex hull of up to 4 points,
/// with its barycentric coordinates.
///
/// Enumerates sub-simplices and keeps the best valid combination; for the
/// simplex sizes GJK produces this is exact and branch-order deterministic.
fn closest_on_simplex(points: &[Vec3]) -> (Vec3, [f64; 4]) {
    let n = points.len().min(4);
    let mut best_point = points[0];
    let mut best_dist = f64::INFINITY;
    let mut best_lambdas = [0.0; 4];

    // Subsets are encoded as bitmasks over the simplex vertices
    for mask in 1u32..(1 << n) {
        let mut idx: Vec<usize, 4> = Vec::new();
        for i in 0..n {
            if mask & (1 << i) != 0 {
                let _ = idx.push(i);
            }
        }

        if let Some(lams) = simplex_barycentric(points, &idx) {
            let mut candidate = Vec3::ZERO;
            let mut valid = true;
            for (k, &i) in idx.iter().enumerate() {
                if lams[k] < -1e-12 {
                    valid = false;
                    break;
                }
                candidate += points[i] * lams[k];
            }
            if !valid {
                continue;
            }
            let dist = candidate.norm();
            if dist < best_dist - 1e-15 {
                best_dist = dist;
                best_point = candidate;
                best_lambdas = [0.0; 4];
                for (k, &i) in idx.iter().enumerate() {
                    best_lambdas[i] = lams[k];
                }
            }
        }
    }

    (best_point, best_lambdas)
}

/// Barycentric coordinates of the point of the affine hull of the selected
/// vertices closest to the origin, or None for a degenerate subset.
fn simplex_barycentric(points: &[Vec3], idx: &[usize]) -> Option<[f64; 4]> {
    let m = idx.len();
    if m == 1 {
        return Some([1.0, 0.0, 0.0, 0.0]);
    }

    // Minimize |sum l_i p_i| with sum l_i = 1: eliminate l_0 and solve the
    // normal equations over the edge vectors d_i = p_i - p_0.
    let p0 = points[idx[0]];
    let mut g = [[0.0f64; 3]; 3];
    let mut rhs = [0.0f64; 3];
    for i in 1..m {
        let di = points[idx[i]] - p0;
        for j in 1..m {
            let dj = points[idx[j]] - p0;
            g[i - 1][j - 1] = di.dot(&dj);
        }
        rhs[i - 1] = -p0.dot(&di);
    }

    // Solve the (m-1)x(m-1) system
    let dim = m - 1;
    let mut a = [[0.0f64; 3]; 3];
    let mut b = [0.0f64; 3];
    for i in 0..dim {
        for j in 0..dim {
            a[i][j] = g[i][j];
        }
        b[i] = rhs[i];
    }
    // Degeneracy check via the pivoted elimination
    for col in 0..dim {
        let mut pivot = col;
        for row in (col + 1)..dim {
            if libm::fabs(a[row][col]) > libm::fabs(a[pivot][col]) {
                pivot = row;
            }
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        if libm::fabs(a[col][col]) < 1e-14 {
            return None;
        }
        for row in (col + 1)..dim {
            let factor = a[row][col] / a[col][col];
            for k in col..dim {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0f64; 3];
    for col in (0..dim).rev() {
        let mut sum = b[col];
        for k in (col + 1)..dim {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }

    let mut lams = [0.0f64; 4];
    let mut l0 = 1.0;
    for i in 0..dim {
        lams[i + 1] = x[i];
        l0 -= x[i];
    }
    lams[0] = l0;
    Some(lams)
}
