use crate::segment::{ChainSegment, SegmentDescriptor, SegmentId};
use glam::{Quat, Vec3};
use limbsense_config::ChainConfig;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("chain has no segments")]
    Empty,
    #[error("duplicate segment id {0}")]
    DuplicateId(SegmentId),
    #[error("root {0} must not have a parent")]
    RootHasParent(SegmentId),
}

/// State the haptics side reads after each step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSnapshot {
    pub root_position: Vec3,
    /// World forward (+Z) of the root.
    pub root_forward: Vec3,
    /// Angular velocity of the first simulated segment, rad/s.
    pub base_angular_velocity: Vec3,
}

/// Ordered segments, root first, each parent strictly earlier.
///
/// World transforms are cached and refreshed with [`Chain::refresh_globals`]
/// after any local rotation changes.
#[derive(Debug, Clone)]
pub struct Chain {
    anchor_position: Vec3,
    anchor_rotation: Quat,
    pub(crate) segments: Vec<ChainSegment>,
    initial_root_global: Quat,
    global_rotations: Vec<Quat>,
    global_positions: Vec<Vec3>,
}

impl Chain {
    pub fn new(
        anchor_position: Vec3,
        anchor_rotation: Quat,
        descriptors: &[SegmentDescriptor],
    ) -> Result<Self, ChainError> {
        let root = descriptors.first().ok_or(ChainError::Empty)?;
        if root.parent.is_some() {
            return Err(ChainError::RootHasParent(root.id));
        }

        let mut segments: Vec<ChainSegment> = Vec::with_capacity(descriptors.len());
        for (i, desc) in descriptors.iter().enumerate() {
            if segments.iter().any(|s| s.id == desc.id) {
                return Err(ChainError::DuplicateId(desc.id));
            }
            let parent_index = match desc.parent {
                None if i == 0 => None,
                None => {
                    warn!(segment = %desc.id, "Segment has no parent, it will not be corrected");
                    None
                }
                Some(parent) => {
                    let found = segments.iter().position(|s| s.id == parent);
                    if found.is_none() {
                        warn!(
                            segment = %desc.id,
                            %parent,
                            "Parent not found earlier in chain, segment will not be corrected"
                        );
                    }
                    found
                }
            };
            segments.push(ChainSegment::from_descriptor(desc, parent_index));
        }

        let anchor_rotation = anchor_rotation.normalize();
        let initial_root_global = anchor_rotation * segments[0].bind_local_rotation();
        let n = segments.len();
        let mut chain = Self {
            anchor_position,
            anchor_rotation,
            segments,
            initial_root_global,
            global_rotations: vec![Quat::IDENTITY; n],
            global_positions: vec![Vec3::ZERO; n],
        };
        chain.refresh_globals();
        debug!(segments = n, "Chain built");
        Ok(chain)
    }

    pub fn from_config(config: &ChainConfig) -> Result<Self, ChainError> {
        let descriptors: Vec<SegmentDescriptor> =
            config.segments.iter().map(SegmentDescriptor::from).collect();
        Self::new(config.anchor_position, config.anchor_rotation, &descriptors)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false: construction rejects empty chains.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[ChainSegment] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&ChainSegment> {
        self.segments.get(index)
    }

    pub fn segment_mut(&mut self, index: usize) -> Option<&mut ChainSegment> {
        self.segments.get_mut(index)
    }

    pub fn index_of(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    pub fn anchor_rotation(&self) -> Quat {
        self.anchor_rotation
    }

    /// Root world rotation at construction, before any drive was applied.
    pub fn initial_root_global_rotation(&self) -> Quat {
        self.initial_root_global
    }

    /// Recompute cached world rotations and positions from local rotations.
    pub fn refresh_globals(&mut self) {
        for i in 0..self.segments.len() {
            let seg = &self.segments[i];
            let (parent_rot, parent_pos) = match seg.parent_index {
                Some(p) => (self.global_rotations[p], self.global_positions[p]),
                None => (self.anchor_rotation, self.anchor_position),
            };
            self.global_rotations[i] = (parent_rot * seg.current_local_rotation).normalize();
            self.global_positions[i] = parent_pos + parent_rot * seg.offset;
        }
    }

    /// Cached world rotation of segment `index`.
    pub fn global_rotation(&self, index: usize) -> Quat {
        self.global_rotations[index]
    }

    /// Cached world position of segment `index`'s joint.
    pub fn global_position(&self, index: usize) -> Vec3 {
        self.global_positions[index]
    }

    /// World rotation the parent frame of `index` contributes.
    pub fn parent_global_rotation(&self, index: usize) -> Quat {
        match self.segments[index].parent_index {
            Some(p) => self.global_rotations[p],
            None => self.anchor_rotation,
        }
    }

    pub fn root_position(&self) -> Vec3 {
        self.global_positions[0]
    }

    /// Set the root's world rotation; the root is kinematic.
    pub fn set_root_global_rotation(&mut self, rotation: Quat) {
        let local = (self.anchor_rotation.inverse() * rotation).normalize();
        self.segments[0].current_local_rotation = local;
    }

    /// Angular velocity of the first simulated segment (the root when the
    /// chain has only one).
    pub fn base_angular_velocity(&self) -> Vec3 {
        self.segments
            .get(1)
            .unwrap_or(&self.segments[0])
            .angular_velocity
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            root_position: self.root_position(),
            root_forward: self.global_rotations[0] * Vec3::Z,
            base_angular_velocity: self.base_angular_velocity(),
        }
    }

    /// Restore the bind pose, zero all velocities, and mark every segment resting.
    pub fn reset_dynamics(&mut self) {
        for seg in &mut self.segments {
            seg.current_local_rotation = seg.bind_local_rotation();
            seg.angular_velocity = Vec3::ZERO;
            seg.linear_velocity = Vec3::ZERO;
            seg.resting = true;
        }
        self.refresh_globals();
        debug!("Chain dynamics reset to bind pose");
    }
}
