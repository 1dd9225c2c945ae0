pub mod chain;
pub mod collision;
pub mod controller;
pub mod math;
pub mod segment;
pub mod solver;
pub mod stiffness;

pub use chain::{Chain, ChainError, ChainSnapshot};
pub use collision::{CollisionBus, CollisionEvent, CollisionReducer, CollisionSubscriber, RawContact};
pub use controller::{ChainController, SegmentTorque, StepCommands};
pub use segment::{ChainSegment, ColliderShape, JointLimits, SegmentDescriptor, SegmentId};
pub use solver::{ConstraintSolver, SegmentContact, SimpleSolver};
pub use stiffness::{StiffnessError, StiffnessProfile};
