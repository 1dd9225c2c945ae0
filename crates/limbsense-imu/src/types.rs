use glam::Vec3;

/// One inertial reading, already in the simulation's axis convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialSample {
    /// Linear acceleration (m/s^2).
    pub accel: Vec3,
    /// Angular velocity (rad/s).
    pub gyro: Vec3,
    /// Capture time reported by the sender (ms).
    pub captured_at_ms: u64,
}

impl InertialSample {
    /// The sample returned before anything has been received.
    pub const ZERO: Self = Self {
        accel: Vec3::ZERO,
        gyro: Vec3::ZERO,
        captured_at_ms: 0,
    };

    pub fn new(accel: Vec3, gyro: Vec3, captured_at_ms: u64) -> Self {
        Self {
            accel,
            gyro,
            captured_at_ms,
        }
    }
}

impl Default for InertialSample {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Per-axis sign flips applied once when a packet enters the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisConvention {
    pub flip_x: bool,
    pub flip_y: bool,
    pub flip_z: bool,
}

impl AxisConvention {
    /// Phone frame to simulation frame: X and Z negated.
    pub const PHONE: Self = Self {
        flip_x: true,
        flip_y: false,
        flip_z: true,
    };

    pub const IDENTITY: Self = Self {
        flip_x: false,
        flip_y: false,
        flip_z: false,
    };

    pub fn apply(&self, v: Vec3) -> Vec3 {
        let sign = |flip: bool| if flip { -1.0 } else { 1.0 };
        Vec3::new(
            v.x * sign(self.flip_x),
            v.y * sign(self.flip_y),
            v.z * sign(self.flip_z),
        )
    }
}

impl Default for AxisConvention {
    fn default() -> Self {
        Self::PHONE
    }
}
