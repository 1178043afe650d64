//! Piecewise Bernstein trajectory over a fixed horizon.
//!
//! A trajectory is M segments of equal duration, each a Bernstein curve of
//! degree n given by its control points. The convex-hull property of the
//! basis makes the control points the handle for every corridor constraint
//! downstream.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::bernstein;
use crate::types::{State, Vec3};
use crate::{MAX_COEFS, MAX_SEGMENTS};

/// One polynomial segment in Bernstein form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment duration (s)
    pub duration: f64,
    /// Control points, degree + 1 of them
    pub points: Vec<Vec3, MAX_COEFS>,
}

impl Segment {
    /// Segment holding a single position for the whole duration
    pub fn hold(position: Vec3, duration: f64, degree: usize) -> Self {
        let mut points = Vec::new();
        for _ in 0..=degree {
            let _ = points.push(position);
        }
        Self { duration, points }
    }

    /// Segment sweeping a straight line from start to end
    pub fn line(start: Vec3, end: Vec3, duration: f64, degree: usize) -> Self {
        let mut points = Vec::new();
        for i in 0..=degree {
            let alpha = i as f64 / degree as f64;
            let _ = points.push(start + (end - start) * alpha);
        }
        Self { duration, points }
    }

    /// Basis degree of this segment
    pub fn degree(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Position at local parameter u in [0, 1]
    pub fn position_at(&self, u: f64) -> Vec3 {
        bernstein::eval(&self.points, u.clamp(0.0, 1.0))
    }

    /// Velocity at local parameter u
    pub fn velocity_at(&self, u: f64) -> Vec3 {
        let d = bernstein::derivative_points(&self.points, self.duration);
        bernstein::eval(&d, u.clamp(0.0, 1.0))
    }

    /// Acceleration at local parameter u
    pub fn acceleration_at(&self, u: f64) -> Vec3 {
        let d = bernstein::derivative_points_order(&self.points, self.duration, 2);
        bernstein::eval(&d, u.clamp(0.0, 1.0))
    }

    /// Endpoints of this segment as a line (used by corridor construction)
    pub fn chord(&self) -> crate::geometry::Line {
        crate::geometry::Line::new(self.start_point(), self.end_point())
    }

    /// First control point (position at u = 0)
    pub fn start_point(&self) -> Vec3 {
        self.points.first().copied().unwrap_or(Vec3::ZERO)
    }

    /// Last control point (position at u = 1)
    pub fn end_point(&self) -> Vec3 {
        self.points.last().copied().unwrap_or(Vec3::ZERO)
    }

    /// Axis-aligned bounding box of the control points
    pub fn control_point_bounds(&self) -> (Vec3, Vec3) {
        let mut lo = self.start_point();
        let mut hi = lo;
        for p in &self.points {
            lo.x = lo.x.min(p.x);
            lo.y = lo.y.min(p.y);
            lo.z = lo.z.min(p.z);
            hi.x = hi.x.max(p.x);
            hi.y = hi.y.max(p.y);
            hi.z = hi.z.max(p.z);
        }
        (lo, hi)
    }
}

/// Piecewise Bernstein trajectory
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    /// Absolute time at which the trajectory starts (s)
    pub start_time: f64,
    /// Segments in temporal order
    pub segments: Vec<Segment, MAX_SEGMENTS>,
}

impl Trajectory {
    /// Empty trajectory starting at the given time
    pub fn new(start_time: f64) -> Self {
        Self {
            start_time,
            segments: Vec::new(),
        }
    }

    /// True when no segments are present
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments M
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Basis degree n (of the first segment)
    pub fn degree(&self) -> usize {
        self.segments.first().map(|s| s.degree()).unwrap_or(0)
    }

    /// Duration of one segment
    pub fn segment_duration(&self) -> f64 {
        self.segments.first().map(|s| s.duration).unwrap_or(0.0)
    }

    /// Total horizon M * segment duration
    pub fn horizon(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Absolute end time
    pub fn end_time(&self) -> f64 {
        self.start_time + self.horizon()
    }

    /// Segment index and local parameter for an absolute time, with the
    /// index clamped to [0, M-1] and the parameter to [0, 1]
    pub fn locate(&self, time: f64) -> (usize, f64) {
        let dt = self.segment_duration();
        if self.is_empty() || dt <= 0.0 {
            return (0, 0.0);
        }
        let rel = time - self.start_time;
        let raw = libm::floor(rel / dt);
        let idx = if raw < 0.0 {
            0
        } else {
            (raw as usize).min(self.segments.len() - 1)
        };
        let u = ((rel - idx as f64 * dt) / dt).clamp(0.0, 1.0);
        (idx, u)
    }

    /// Position at an absolute time
    pub fn position_at(&self, time: f64) -> Vec3 {
        let (idx, u) = self.locate(time);
        self.segments
            .get(idx)
            .map(|s| s.position_at(u))
            .unwrap_or(Vec3::ZERO)
    }

    /// Velocity at an absolute time
    pub fn velocity_at(&self, time: f64) -> Vec3 {
        let (idx, u) = self.locate(time);
        self.segments
            .get(idx)
            .map(|s| s.velocity_at(u))
            .unwrap_or(Vec3::ZERO)
    }

    /// Acceleration at an absolute time
    pub fn acceleration_at(&self, time: f64) -> Vec3 {
        let (idx, u) = self.locate(time);
        self.segments
            .get(idx)
            .map(|s| s.acceleration_at(u))
            .unwrap_or(Vec3::ZERO)
    }

    /// Full kinematic state at an absolute time
    pub fn state_at(&self, time: f64) -> State {
        State {
            position: self.position_at(time),
            velocity: self.velocity_at(time),
            acceleration: self.acceleration_at(time),
        }
    }

    /// All control points in temporal order, O(M * (n+1))
    pub fn control_points(&self) -> Vec<Vec3, { MAX_SEGMENTS * MAX_COEFS }> {
        let mut points = Vec::new();
        for segment in &self.segments {
            for p in &segment.points {
                let _ = points.push(*p);
            }
        }
        points
    }

    /// Terminal position of the last segment
    pub fn terminal_position(&self) -> Vec3 {
        self.segments
            .last()
            .map(|s| s.end_point())
            .unwrap_or(Vec3::ZERO)
    }

    /// The previous plan advanced by one segment: segment 0 is dropped and
    /// the horizon is refilled by holding the terminal position. Terminal
    /// velocity and acceleration are zero by construction, so the appended
    /// hold segment preserves C2 continuity.
    pub fn shifted_by_one_segment(&self) -> Trajectory {
        let mut shifted = Trajectory::new(self.start_time + self.segment_duration());
        if self.is_empty() {
            return shifted;
        }
        for segment in self.segments.iter().skip(1) {
            let _ = shifted.segments.push(segment.clone());
        }
        let last = &self.segments[self.segments.len() - 1];
        let _ = shifted
            .segments
            .push(Segment::hold(last.end_point(), last.duration, last.degree()));
        shifted
    }
}
