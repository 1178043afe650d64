//! Safe Flight Corridor construction.
//!
//! Each segment gets an axis-aligned box seeded from the bounding box of
//! its warm-start control points and grown face by face against the
//! distance map. A face stops growing as soon as the next slab would
//! contain a point closer to static geometry than the agent radius.

use heapless::Vec as HVec;

use super::Sfc;
use crate::config::PlannerConfig;
use crate::map::DistanceMap;
use crate::trajectory::Trajectory;
use crate::types::Vec3;
use crate::MAX_SEGMENTS;

/// Sample cap per axis when probing a slab
const MAX_SLAB_SAMPLES: usize = 12;

/// Result of SFC construction for one tick
#[derive(Debug, Clone, Default)]
pub struct SfcOutcome {
    /// One box per segment
    pub constraints: HVec<Sfc, MAX_SEGMENTS>,
    /// Segments whose seed box already touched geometry closer than the
    /// radius
    pub failures: usize,
}

/// Build the Safe Flight Corridors for this tick.
pub fn build_sfcs(
    warm_start: &Trajectory,
    map: &impl DistanceMap,
    radius: f64,
    config: &PlannerConfig,
) -> SfcOutcome {
    let mut outcome = SfcOutcome::default();

    let mut step = if config.sfc_expansion_step > 0.0 {
        config.sfc_expansion_step
    } else {
        map.resolution()
    };
    if !(step > 0.0) || !step.is_finite() {
        step = 0.1;
    }

    for (segment_idx, segment) in warm_start.segments.iter().enumerate() {
        let (mut lo, mut hi) = segment.control_point_bounds();
        if config.world_dimension == 2 {
            lo.z = config.world_z_2d;
            hi.z = config.world_z_2d;
        }

        if min_distance_in_box(map, lo, hi, step) < radius {
            outcome.failures += 1;
            log::warn!(
                "sfc: segment {} warm start within {:.3} m of static geometry",
                segment_idx,
                radius
            );
        }

        let axes: usize = config.world_dimension;
        let mut blocked = [false; 6];
        for _ in 0..config.sfc_max_steps {
            let mut grew = false;
            for face in 0..(2 * axes) {
                if blocked[face] {
                    continue;
                }
                let axis = face / 2;
                let positive = face % 2 == 1;

                // Slab the expansion would newly cover
                let (slab_lo, slab_hi) = if positive {
                    let mut slo = lo;
                    let mut shi = hi;
                    slo.set_axis(axis, hi.axis(axis));
                    shi.set_axis(axis, hi.axis(axis) + step);
                    (slo, shi)
                } else {
                    let mut slo = lo;
                    let mut shi = hi;
                    slo.set_axis(axis, lo.axis(axis) - step);
                    shi.set_axis(axis, lo.axis(axis));
                    (slo, shi)
                };

                if min_distance_in_box(map, slab_lo, slab_hi, step) >= radius {
                    if positive {
                        hi.set_axis(axis, hi.axis(axis) + step);
                    } else {
                        lo.set_axis(axis, lo.axis(axis) - step);
                    }
                    grew = true;
                } else {
                    blocked[face] = true;
                }
            }
            if !grew {
                break;
            }
        }

        let _ = outcome.constraints.push(Sfc {
            segment_idx,
            min: lo,
            max: hi,
        });
    }

    outcome.failures +=
        enforce_shared_boundaries(&mut outcome.constraints, warm_start, map, radius, step);
    outcome
}

/// Minimum sampled distance-map value over a box, probed on a grid no
/// coarser than the expansion step
fn min_distance_in_box(map: &impl DistanceMap, lo: Vec3, hi: Vec3, step: f64) -> f64 {
    let mut min_dist = f64::INFINITY;
    let counts = [
        sample_count(hi.x - lo.x, step),
        sample_count(hi.y - lo.y, step),
        sample_count(hi.z - lo.z, step),
    ];
    for ix in 0..counts[0] {
        for iy in 0..counts[1] {
            for iz in 0..counts[2] {
                let p = Vec3::new(
                    lerp(lo.x, hi.x, ix, counts[0]),
                    lerp(lo.y, hi.y, iy, counts[1]),
                    lerp(lo.z, hi.z, iz, counts[2]),
                );
                let d = map.distance_at(p);
                if d < min_dist {
                    min_dist = d;
                }
            }
        }
    }
    min_dist
}

fn sample_count(extent: f64, step: f64) -> usize {
    if extent <= 0.0 {
        1
    } else {
        ((libm::ceil(extent / step) as usize) + 1).min(MAX_SLAB_SAMPLES)
    }
}

fn lerp(lo: f64, hi: f64, i: usize, count: usize) -> f64 {
    if count <= 1 {
        lo
    } else {
        lo + (hi - lo) * i as f64 / (count - 1) as f64
    }
}

/// Adjacent boxes must share a region containing the control point at the
/// segment boundary: the QP ties the boundary control point to both boxes,
/// so a pair excluding it is jointly infeasible.
///
/// Warm starts chain their segments end-to-start, which puts the shared
/// point in both seed boxes, and the growth loop only moves faces outward,
/// so boxes built from a warm start keep it. For an input whose segments
/// do not chain the invariant can break after pruning; shrinking cannot
/// restore containment, so the offending face is moved to the shared point
/// and no further, and the slab that move uncovers is probed like a growth
/// step. An unsafe repair counts as a construction failure.
fn enforce_shared_boundaries(
    sfcs: &mut HVec<Sfc, MAX_SEGMENTS>,
    warm_start: &Trajectory,
    map: &impl DistanceMap,
    radius: f64,
    step: f64,
) -> usize {
    let mut failures = 0;
    for k in 1..sfcs.len() {
        let shared = warm_start.segments[k].start_point();
        for idx in [k - 1, k] {
            let sfc = &mut sfcs[idx];
            if sfc.contains(shared) {
                continue;
            }
            log::warn!(
                "sfc: segment {} box lost the shared boundary point, repairing",
                sfc.segment_idx
            );
            for axis in 0..3 {
                let v = shared.axis(axis);
                if v < sfc.min.axis(axis) {
                    let mut slab_lo = sfc.min;
                    let mut slab_hi = sfc.max;
                    slab_lo.set_axis(axis, v);
                    slab_hi.set_axis(axis, sfc.min.axis(axis));
                    sfc.min.set_axis(axis, v);
                    if min_distance_in_box(map, slab_lo, slab_hi, step) < radius {
                        failures += 1;
                    }
                } else if v > sfc.max.axis(axis) {
                    let mut slab_lo = sfc.min;
                    let mut slab_hi = sfc.max;
                    slab_lo.set_axis(axis, sfc.max.axis(axis));
                    slab_hi.set_axis(axis, v);
                    sfc.max.set_axis(axis, v);
                    if min_distance_in_box(map, slab_lo, slab_hi, step) < radius {
                        failures += 1;
                    }
                }
            }
        }
    }
    failures
}
