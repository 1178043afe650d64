//! Linear Safe Corridor construction.
//!
//! For every (segment, neighbor) pair, a separating half-space is derived
//! from the closest-point pair between the two previous trajectories over
//! that segment's time window, each treated as a line path between its
//! endpoint positions. Inter-agent distances are measured in a
//! downwash-scaled metric; when a pair is already tighter than the
//! combined collision radius, priorities decide who yields the extra
//! margin and the constraint is relaxed so the fixed initial position
//! stays feasible.

use heapless::Vec as HVec;

use super::Lsc;
use crate::config::PlannerConfig;
use crate::geometry::{
    closest_points_between_line_paths, closest_points_point_and_convex_hull, Line,
};
use crate::priority::PriorityKey;
use crate::snapshot::{predicted_chord, NeighborSnapshot};
use crate::trajectory::Trajectory;
use crate::types::{Agent, Obstacle, ObstacleType, Vec3};
use crate::{MAX_COEFS, MAX_LSC};

/// Slack kept between a relaxed plane and the fixed initial position
const RELAX_SLACK: f64 = 1e-6;

/// Result of LSC construction for one tick
#[derive(Debug, Clone, Default)]
pub struct LscOutcome {
    /// Constraints, at most one per (segment, neighbor) pair
    pub constraints: HVec<Lsc, MAX_LSC>,
    /// Some pair was below the collision threshold at the start of the
    /// horizon
    pub collision_alert: bool,
    /// Pairs skipped because no valid separating direction existed
    pub failures: usize,
}

/// Build the Linear Safe Corridors for this tick.
///
/// `warm_start` is this agent's shifted previous trajectory; neighbors use
/// their published trajectories from the snapshot, or constant-velocity
/// prediction when none is known.
pub fn build_lscs(
    agent: &Agent,
    warm_start: &Trajectory,
    snapshot: &NeighborSnapshot,
    config: &PlannerConfig,
    now: f64,
) -> LscOutcome {
    let mut outcome = LscOutcome::default();
    let self_key = PriorityKey::of_agent(agent);
    let dt = config.segment_duration;

    for neighbor in &snapshot.obstacles {
        let pair = PairMetric::for_pair(agent, neighbor, config);
        let neighbor_key = PriorityKey::of_obstacle(neighbor);
        let self_yields = neighbor_key.outranks(&self_key);

        // Collision alert is judged at the start of the horizon
        let dist_now = pair
            .scale(agent.current_state.position)
            .distance(&pair.scale(neighbor.position));
        if dist_now < pair.collision_distance {
            outcome.collision_alert = true;
            log::warn!(
                "lsc: {} and {} already within collision threshold ({:.3} < {:.3})",
                agent.id,
                neighbor.id,
                dist_now,
                pair.collision_distance
            );
        }

        for segment_idx in 0..warm_start.segment_count() {
            let window_start = now + segment_idx as f64 * dt;
            let window_end = window_start + dt;

            let self_chord = warm_start.segments[segment_idx].chord();
            let neighbor_chord = predicted_chord(neighbor, now, window_start, window_end);

            match build_pair_constraint(
                agent,
                neighbor,
                &pair,
                &self_chord,
                &neighbor_chord,
                segment_idx,
                warm_start,
                self_yields,
                config,
            ) {
                Some(lsc) => {
                    if outcome.constraints.push(lsc).is_err() {
                        log::warn!("lsc: constraint buffer full, dropping remainder");
                        return outcome;
                    }
                }
                None => outcome.failures += 1,
            }
        }
    }

    outcome
}

/// Downwash-scaled metric for one agent/neighbor pair
struct PairMetric {
    /// Combined collision distance in the scaled metric
    collision_distance: f64,
    /// Vertical scale divisor (1 in 2D)
    downwash: f64,
}

impl PairMetric {
    fn for_pair(agent: &Agent, neighbor: &Obstacle, config: &PlannerConfig) -> Self {
        let collision_distance = config
            .collision_radius_policy
            .combine(agent.radius, neighbor.radius);
        let downwash = if config.world_dimension == 2 || neighbor.obstacle_type != ObstacleType::Agent
        {
            1.0
        } else {
            (agent.radius * agent.downwash + neighbor.radius * neighbor.downwash)
                / (agent.radius + neighbor.radius)
        };
        Self {
            collision_distance,
            downwash: downwash.max(1.0),
        }
    }

    /// Map a world point into the scaled metric
    fn scale(&self, p: Vec3) -> Vec3 {
        p.scaled(1.0, 1.0, 1.0 / self.downwash)
    }

    /// Constraint coefficients in world coordinates for a scaled-space
    /// normal
    fn unscale_normal(&self, n: Vec3) -> Vec3 {
        n.scaled(1.0, 1.0, 1.0 / self.downwash)
    }

    /// Map a scaled point back into world coordinates
    fn unscale_point(&self, p: Vec3) -> Vec3 {
        p.scaled(1.0, 1.0, self.downwash)
    }
}

#[allow(clippy::too_many_arguments)]
fn build_pair_constraint(
    agent: &Agent,
    neighbor: &Obstacle,
    pair: &PairMetric,
    self_chord: &Line,
    neighbor_chord: &Line,
    segment_idx: usize,
    warm_start: &Trajectory,
    self_yields: bool,
    config: &PlannerConfig,
) -> Option<Lsc> {
    let self_scaled = Line::new(pair.scale(self_chord.start), pair.scale(self_chord.end));
    let neighbor_scaled = Line::new(
        pair.scale(neighbor_chord.start),
        pair.scale(neighbor_chord.end),
    );

    let witness = closest_points_between_line_paths(&self_scaled, &neighbor_scaled);
    let mut normal = (witness.point_a - witness.point_b).normalized();
    if normal == Vec3::ZERO {
        // Coincident witnesses: fall back to the current relative position
        normal = (pair.scale(agent.current_state.position) - pair.scale(neighbor.position))
            .normalized();
    }
    if normal == Vec3::ZERO {
        return None;
    }

    let r = pair.collision_distance;
    let (plane_point_scaled, mut margin) = match neighbor.obstacle_type {
        ObstacleType::Agent => {
            let midpoint = (witness.point_a + witness.point_b) * 0.5;
            let margin = if witness.dist >= r {
                r * 0.5
            } else {
                // Tight pair: the lower-priority agent yields extra margin so
                // both half-spaces stay jointly satisfiable
                let base = witness.dist * 0.5;
                if self_yields {
                    base + config.yield_margin
                } else {
                    (base - config.yield_margin).max(0.0)
                }
            };
            (midpoint, margin)
        }
        _ => {
            // Non-cooperative: the full separation is on this agent's side
            (witness.point_b, r)
        }
    };

    // The first segment carries the fixed initial position; relax the
    // plane so that point stays feasible.
    if segment_idx == 0 {
        let p0_scaled = pair.scale(agent.current_state.position);
        let available = normal.dot(&(p0_scaled - plane_point_scaled));

        let imminent = witness.dist < r || relative_hull_distance(warm_start, neighbor, pair) < r;
        if imminent && margin > available - RELAX_SLACK {
            margin = available - RELAX_SLACK;
        } else if margin > available - RELAX_SLACK {
            margin = (available - RELAX_SLACK).max(0.0);
        }
    }

    Some(Lsc {
        segment_idx,
        neighbor: neighbor.id,
        coeffs: pair.unscale_normal(normal),
        point: pair.unscale_point(plane_point_scaled),
        margin,
    })
}

/// Conservative distance between the pair over the first segment: GJK
/// distance from the origin to the convex hull of the relative control
/// points, valid because the difference of two same-degree Bernstein
/// curves has the difference of their control points as control points.
///
/// Returns infinity when the neighbor has no comparable trajectory.
fn relative_hull_distance(warm_start: &Trajectory, neighbor: &Obstacle, pair: &PairMetric) -> f64 {
    let neighbor_traj = match &neighbor.prev_traj {
        Some(t) if !t.is_empty() => t,
        _ => return f64::INFINITY,
    };

    let self_seg = &warm_start.segments[0];
    let (idx, _) = neighbor_traj.locate(warm_start.start_time);
    let neighbor_seg = &neighbor_traj.segments[idx];
    if neighbor_seg.degree() != self_seg.degree() {
        return f64::INFINITY;
    }

    let mut rel: HVec<Vec3, MAX_COEFS> = HVec::new();
    for i in 0..self_seg.points.len() {
        let _ = rel.push(pair.scale(self_seg.points[i]) - pair.scale(neighbor_seg.points[i]));
    }
    closest_points_point_and_convex_hull(Vec3::ZERO, &rel).dist
}
