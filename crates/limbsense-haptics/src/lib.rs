pub mod directional;
pub mod driver;
pub mod engine;
pub mod grid;
pub mod pattern;
pub mod phone;
pub mod schedule;
pub mod zones;

pub use directional::ContactPhase;
pub use driver::{ActuatorDriver, ConfiguredDriver, DriverCall, LogDriver, RecordingDriver, UdpDriver};
pub use engine::HapticEngine;
pub use grid::ActuatorGrid;
pub use pattern::Pattern;
pub use phone::{PhoneVibrator, VibrateRequest, VibrationFilter, VibrationKind};
pub use schedule::{PatternId, PatternScheduler};
pub use zones::{HapticZoneMap, Side, Zone};
