use glam::{Quat, Vec3};
use limbsense_config::{ColliderConfig, SegmentConfig};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment#{}", self.0)
    }
}

/// Joint limits in degrees. Twist is about the segment's local Z axis,
/// swing is any rotation away from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub swing: f32,
    pub twist_min: f32,
    pub twist_max: f32,
}

impl Default for JointLimits {
    fn default() -> Self {
        Self {
            swing: 45.0,
            twist_min: -30.0,
            twist_max: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    None,
    Sphere { radius: f32 },
    Capsule { radius: f32, height: f32 },
}

impl From<ColliderConfig> for ColliderShape {
    fn from(config: ColliderConfig) -> Self {
        match config {
            ColliderConfig::None => ColliderShape::None,
            ColliderConfig::Sphere { radius } => ColliderShape::Sphere { radius },
            ColliderConfig::Capsule { radius, height } => ColliderShape::Capsule { radius, height },
        }
    }
}

/// Everything needed to add one segment to a chain.
#[derive(Debug, Clone)]
pub struct SegmentDescriptor {
    pub id: SegmentId,
    pub parent: Option<SegmentId>,
    /// Joint position in the parent's frame.
    pub offset: Vec3,
    pub bind_rotation: Quat,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub joint_limits: JointLimits,
    pub collider: ColliderShape,
}

impl SegmentDescriptor {
    pub fn new(id: u32, parent: Option<u32>, offset: Vec3) -> Self {
        Self {
            id: SegmentId(id),
            parent: parent.map(SegmentId),
            offset,
            bind_rotation: Quat::IDENTITY,
            mass: 0.5,
            linear_damping: 0.5,
            angular_damping: 0.5,
            joint_limits: JointLimits::default(),
            collider: ColliderShape::None,
        }
    }
}

impl From<&SegmentConfig> for SegmentDescriptor {
    fn from(config: &SegmentConfig) -> Self {
        Self {
            id: SegmentId(config.id),
            parent: config.parent.map(SegmentId),
            offset: config.offset,
            bind_rotation: config.rotation,
            mass: config.mass,
            linear_damping: config.linear_damping,
            angular_damping: config.angular_damping,
            joint_limits: JointLimits {
                swing: config.swing_limit_deg,
                twist_min: config.twist_min_deg,
                twist_max: config.twist_max_deg,
            },
            collider: config.collider.into(),
        }
    }
}

/// One link of the chain. Rotations are local to the parent segment
/// (or to the anchor, for the root).
#[derive(Debug, Clone)]
pub struct ChainSegment {
    pub id: SegmentId,
    pub parent: Option<SegmentId>,
    pub(crate) parent_index: Option<usize>,
    pub offset: Vec3,
    bind_local_rotation: Quat,
    pub current_local_rotation: Quat,
    /// World-space angular velocity, rad/s.
    pub angular_velocity: Vec3,
    /// World-space linear velocity of the joint, m/s.
    pub linear_velocity: Vec3,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub joint_limits: JointLimits,
    pub collider: ColliderShape,
    pub resting: bool,
}

impl ChainSegment {
    pub(crate) fn from_descriptor(desc: &SegmentDescriptor, parent_index: Option<usize>) -> Self {
        let bind = desc.bind_rotation.normalize();
        Self {
            id: desc.id,
            parent: desc.parent,
            parent_index,
            offset: desc.offset,
            bind_local_rotation: bind,
            current_local_rotation: bind,
            angular_velocity: Vec3::ZERO,
            linear_velocity: Vec3::ZERO,
            mass: desc.mass,
            linear_damping: desc.linear_damping,
            angular_damping: desc.angular_damping,
            joint_limits: desc.joint_limits,
            collider: desc.collider,
            resting: true,
        }
    }

    /// Local rotation captured when the chain was built.
    pub fn bind_local_rotation(&self) -> Quat {
        self.bind_local_rotation
    }

    /// Index of the resolved parent, `None` for the root or a detached segment.
    pub fn parent_index(&self) -> Option<usize> {
        self.parent_index
    }
}
