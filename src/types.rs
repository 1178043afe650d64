//! Core type definitions for the corridor planner.

use core::fmt;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::trajectory::Trajectory;

/// Result type for planner operations
pub type Result<T> = core::result::Result<T, PlanError>;

/// Unique identifier for each agent in the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    /// Create a new AgentId from a u32
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner u32 value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Agent-{}", self.0)
    }
}

/// 3D vector (position, velocity, acceleration, direction)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component (meters or derived unit)
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new vector
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Dot product
    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Euclidean norm
    pub fn norm(&self) -> f64 {
        libm::sqrt(self.dot(self))
    }

    /// Squared norm
    pub fn norm_sq(&self) -> f64 {
        self.dot(self)
    }

    /// Euclidean distance to another vector
    pub fn distance(&self, other: &Vec3) -> f64 {
        (*self - *other).norm()
    }

    /// Unit vector in the same direction, or zero for near-zero input
    pub fn normalized(&self) -> Vec3 {
        let n = self.norm();
        if n < 1e-12 {
            Vec3::ZERO
        } else {
            *self * (1.0 / n)
        }
    }

    /// Component-wise scaling
    pub fn scaled(&self, sx: f64, sy: f64, sz: f64) -> Vec3 {
        Vec3::new(self.x * sx, self.y * sy, self.z * sz)
    }

    /// Largest absolute component
    pub fn max_abs(&self) -> f64 {
        libm::fabs(self.x).max(libm::fabs(self.y)).max(libm::fabs(self.z))
    }

    /// Component access by axis index (0 = x, 1 = y, 2 = z)
    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Mutable component access by axis index
    pub fn set_axis(&mut self, axis: usize, value: f64) {
        match axis {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.z = value,
        }
    }

    /// True if every component is finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl core::ops::Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl core::ops::Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl core::ops::Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl core::ops::Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl core::ops::AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// Kinematic state: position, velocity, acceleration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    /// Position (m)
    pub position: Vec3,
    /// Velocity (m/s)
    pub velocity: Vec3,
    /// Acceleration (m/s^2)
    pub acceleration: Vec3,
}

impl State {
    /// State at rest at the given position
    pub fn at_rest(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
        }
    }
}

/// Obstacle classification as seen by one planner instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObstacleType {
    /// Another planner instance with a published trajectory
    Agent,
    /// Non-cooperative mover, only position/velocity known
    Dynamic,
    /// Occupancy voxels, consumed via the distance map only
    Static,
}

/// Obstacle report received over the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obstacle {
    /// Stable identifier
    pub id: AgentId,
    /// Obstacle class
    pub obstacle_type: ObstacleType,
    /// Current position
    pub position: Vec3,
    /// Current velocity
    pub velocity: Vec3,
    /// Goal position broadcast by the obstacle (agents only)
    pub goal: Vec3,
    /// Collision radius (m)
    pub radius: f64,
    /// Vertical collision scaling against other agents
    pub downwash: f64,
    /// Maximum acceleration magnitude reported by the obstacle
    pub max_acc: f64,
    /// The obstacle raised a collision alert on its last plan
    pub collision_alert: bool,
    /// Most recently published trajectory (agents only)
    pub prev_traj: Option<Trajectory>,
}

impl Obstacle {
    /// Dynamic obstacle with only position/velocity known
    pub fn dynamic(id: AgentId, position: Vec3, velocity: Vec3, radius: f64) -> Self {
        Self {
            id,
            obstacle_type: ObstacleType::Dynamic,
            position,
            velocity,
            goal: position,
            radius,
            downwash: 1.0,
            max_acc: 0.0,
            collision_alert: false,
            prev_traj: None,
        }
    }
}

/// Per-agent planner inputs and identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier
    pub id: AgentId,
    /// Collision radius (m)
    pub radius: f64,
    /// Downwash ratio (vertical collision scaling)
    pub downwash: f64,
    /// Per-axis maximum velocity (m/s)
    pub max_vel: Vec3,
    /// Per-axis maximum acceleration (m/s^2)
    pub max_acc: Vec3,
    /// Current kinematic state
    pub current_state: State,
    /// Mission start point
    pub start_point: Vec3,
    /// Mission goal point
    pub desired_goal_point: Vec3,
    /// Current goal, possibly an intermediate waypoint
    pub current_goal_point: Vec3,
    /// Next waypoint from an upstream global planner
    pub next_waypoint: Vec3,
}

impl Agent {
    /// Create an agent at its start point, at rest
    pub fn new(id: AgentId, radius: f64, start_point: Vec3, desired_goal_point: Vec3) -> Self {
        Self {
            id,
            radius,
            downwash: 1.0,
            max_vel: Vec3::new(1.0, 1.0, 1.0),
            max_acc: Vec3::new(2.0, 2.0, 2.0),
            current_state: State::at_rest(start_point),
            start_point,
            desired_goal_point,
            current_goal_point: start_point,
            next_waypoint: start_point,
        }
    }

    /// Remaining straight-line distance to the desired goal
    pub fn distance_to_goal(&self) -> f64 {
        self.current_state.position.distance(&self.desired_goal_point)
    }
}

/// Broadcast message describing this agent as an obstacle for its peers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBroadcast {
    /// Sender identity
    pub id: AgentId,
    /// Current position
    pub position: Vec3,
    /// Current velocity
    pub velocity: Vec3,
    /// Goal carried for coordination (current or desired goal, by goal mode)
    pub goal: Vec3,
    /// Collision radius
    pub radius: f64,
    /// Downwash ratio
    pub downwash: f64,
    /// Maximum acceleration magnitude
    pub max_acc: f64,
    /// Collision alert raised on the last plan
    pub collision_alert: bool,
    /// Trajectory computed this tick
    pub trajectory: Option<Trajectory>,
}

impl AgentBroadcast {
    /// View this broadcast as an obstacle report for a receiving planner
    pub fn to_obstacle(&self) -> Obstacle {
        Obstacle {
            id: self.id,
            obstacle_type: ObstacleType::Agent,
            position: self.position,
            velocity: self.velocity,
            goal: self.goal,
            radius: self.radius,
            downwash: self.downwash,
            max_acc: self.max_acc,
            collision_alert: self.collision_alert,
            prev_traj: self.trajectory.clone(),
        }
    }
}

/// Exit status of one `plan` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanningReport {
    /// Inputs incomplete, retry next tick
    WaitForInput,
    /// Planning finished and a trajectory was produced
    Success,
    /// Warm-start generation failed
    InitTrajGenerationFail,
    /// Corridor construction failed outright
    ConstraintGenerationFail,
    /// The solver failed and no fallback trajectory was available
    QpFail,
}

/// Planner error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    /// Inputs incomplete for this tick
    InputNotReady,
    /// A geometry kernel invariant was violated
    GeometryDegenerate,
    /// LSC/SFC construction failed for a pair
    ConstraintGeneration,
    /// The QP was infeasible
    SolverInfeasible,
    /// The QP solver failed numerically
    SolverNumerical,
    /// Observed drift exceeded the reset threshold
    DisturbanceDetected,
    /// Invalid configuration at construction
    Config,
    /// A bounded buffer overflowed
    CapacityExceeded,
    /// Invalid parameter provided
    InvalidParameter,
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::InputNotReady => write!(f, "planner inputs incomplete"),
            PlanError::GeometryDegenerate => write!(f, "degenerate geometry input"),
            PlanError::ConstraintGeneration => write!(f, "corridor construction failed"),
            PlanError::SolverInfeasible => write!(f, "quadratic program infeasible"),
            PlanError::SolverNumerical => write!(f, "quadratic program solver failure"),
            PlanError::DisturbanceDetected => write!(f, "disturbance exceeded reset threshold"),
            PlanError::Config => write!(f, "invalid configuration"),
            PlanError::CapacityExceeded => write!(f, "bounded buffer overflow"),
            PlanError::InvalidParameter => write!(f, "invalid parameter"),
        }
    }
}

/// Bounded list of obstacle reports for one tick
pub type ObstacleList = Vec<Obstacle, { crate::MAX_OBSTACLES }>;
