use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Inbound sensor feed.
    pub ingest: IngestConfig,
    /// Appendage chain and muscle model.
    pub chain: ChainConfig,
    /// Haptic pattern mapping.
    pub haptics: HapticsConfig,
    /// Where actuator grids are sent.
    pub driver: DriverConfig,
    /// Impact vibrations forwarded to a phone or watch over HTTP.
    pub phone: PhoneConfig,
    /// Fixed-step loop and reference solver.
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Address the HTTP listener binds to. The phone app posts to port 928.
    pub bind_addr: String,
    /// Axis sign convention applied once at ingestion.
    pub flip_x: bool,
    pub flip_y: bool,
    pub flip_z: bool,
    /// Number of samples averaged for gyro bias. 0 disables calibration.
    pub calibration_samples: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:928".into(),
            flip_x: true,
            flip_y: false,
            flip_z: true,
            calibration_samples: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// World position the root segment hangs from (meters).
    #[serde(with = "vec3_serde")]
    pub anchor_position: Vec3,
    /// World orientation of the body the root is attached to.
    #[serde(with = "quat_serde")]
    pub anchor_rotation: Quat,
    /// Degrees of root rotation per unit of acceleration.
    pub force_magnitude: f32,
    /// Added to every acceleration sample before it drives the root.
    #[serde(with = "vec3_serde")]
    pub imu_offset: Vec3,
    /// Base spring strength, scaled per segment by the stiffness curve.
    pub muscle_force: f32,
    /// Gain of the muscle damping torque against segment angular velocity.
    pub angular_damping: f32,
    pub stiffness: StiffnessConfig,
    pub idle_sway: IdleSwayConfig,
    pub convergence: RootConvergence,
    /// Segment list, root first.
    pub segments: Vec<SegmentConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            anchor_position: Vec3::new(0.0, 1.0, 0.0),
            anchor_rotation: Quat::IDENTITY,
            force_magnitude: 100.0,
            imu_offset: Vec3::ZERO,
            muscle_force: 20.0,
            angular_damping: 0.5,
            stiffness: StiffnessConfig::default(),
            idle_sway: IdleSwayConfig::default(),
            convergence: RootConvergence::default(),
            segments: SegmentConfig::straight_chain(6, 0.25),
        }
    }
}

/// Keyframed stiffness multiplier over normalized chain position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StiffnessConfig {
    /// `[position, multiplier]` pairs, position in `[0, 1]`.
    pub keys: Vec<[f32; 2]>,
    pub interpolation: CurveInterpolation,
}

impl Default for StiffnessConfig {
    fn default() -> Self {
        Self {
            // Stiff at the base, loose at the tip.
            keys: vec![[0.0, 1.0], [1.0, 0.1]],
            interpolation: CurveInterpolation::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveInterpolation {
    #[default]
    Linear,
    /// Flat tangents at every key (ease in/out).
    Smooth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleSwayConfig {
    /// Add `amount * sin(t * speed)` to the root yaw target.
    pub enabled: bool,
    /// Sway amplitude in degrees.
    pub amount_deg: f32,
    /// Sway angular frequency (rad/s).
    pub speed: f32,
    /// Also push the root with a small roll torque.
    pub torque_enabled: bool,
    pub torque_gain: f32,
}

impl Default for IdleSwayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            amount_deg: 5.0,
            speed: 1.0,
            torque_enabled: false,
            torque_gain: 0.5,
        }
    }
}

/// How the root approaches its target orientation each fixed step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum RootConvergence {
    /// Slerp factor `rate * dt`, clamped to `[0, 1]`.
    Linear { rate: f32 },
    /// Slerp factor `1 - exp(-rate * dt)`.
    Exponential { rate: f32 },
}

impl Default for RootConvergence {
    fn default() -> Self {
        RootConvergence::Linear { rate: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub id: u32,
    /// Parent segment id. `None` only for the root.
    pub parent: Option<u32>,
    /// Offset from the parent joint in the parent's frame (meters).
    #[serde(with = "vec3_serde")]
    pub offset: Vec3,
    /// Bind local rotation relative to the parent.
    #[serde(with = "quat_serde")]
    pub rotation: Quat,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub swing_limit_deg: f32,
    pub twist_min_deg: f32,
    pub twist_max_deg: f32,
    pub collider: ColliderConfig,
}

impl SegmentConfig {
    /// Generate a straight chain of `count` segments extending along -Z.
    pub fn straight_chain(count: u32, link_length: f32) -> Vec<SegmentConfig> {
        (0..count)
            .map(|i| SegmentConfig {
                id: i,
                parent: i.checked_sub(1),
                offset: if i == 0 {
                    Vec3::ZERO
                } else {
                    Vec3::new(0.0, 0.0, -link_length)
                },
                rotation: Quat::IDENTITY,
                mass: 0.5,
                linear_damping: 0.5,
                angular_damping: 0.5,
                swing_limit_deg: 45.0,
                twist_min_deg: -30.0,
                twist_max_deg: 30.0,
                collider: ColliderConfig::Capsule {
                    radius: 0.08,
                    height: 0.5,
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ColliderConfig {
    None,
    Sphere { radius: f32 },
    /// Capsule aligned with the segment's local Z axis.
    Capsule { radius: f32, height: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticsConfig {
    /// Global enable. Can be toggled at runtime.
    pub enabled: bool,
    pub sway: SwayConfig,
    pub impact: ImpactConfig,
    pub tension: TensionConfig,
    pub idle: IdleConfig,
    pub directional: DirectionalConfig,
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sway: SwayConfig::default(),
            impact: ImpactConfig::default(),
            tension: TensionConfig::default(),
            idle: IdleConfig::default(),
            directional: DirectionalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwayConfig {
    pub enabled: bool,
    /// Yaw angular velocity (deg/s) at or below this emits nothing.
    pub velocity_threshold: f32,
    pub intensity_multiplier: f32,
    /// Minimum time between evaluations.
    pub interval_ms: u64,
    pub duration_ms: u32,
}

impl Default for SwayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            velocity_threshold: 10.0,
            intensity_multiplier: 0.5,
            interval_ms: 100,
            duration_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub enabled: bool,
    pub intensity_multiplier: f32,
    /// Distance from the root that counts as the tip.
    pub max_impact_distance: f32,
    /// Fraction of `max_impact_distance` treated as near the root.
    pub near_root_ratio: f32,
    pub near_duration_ms: u32,
    pub reverberation_delay_ms: u64,
    pub reverberation_duration_ms: u32,
    /// Tip impacts play at this fraction of the computed intensity.
    pub tip_intensity_ratio: f32,
    pub tip_duration_ms: u32,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            intensity_multiplier: 0.7,
            max_impact_distance: 1.0,
            near_root_ratio: 0.3,
            near_duration_ms: 100,
            reverberation_delay_ms: 100,
            reverberation_duration_ms: 100,
            tip_intensity_ratio: 0.8,
            tip_duration_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TensionConfig {
    pub enabled: bool,
    /// Tension at or below this is ignored.
    pub floor: f32,
    /// Tension levels that recruit the lower, middle and upper clusters.
    pub thresholds: [f32; 3],
    pub duration_ms: u32,
}

impl Default for TensionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            floor: 0.01,
            thresholds: [0.3, 0.6, 0.9],
            duration_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    pub enabled: bool,
    /// Resting intensity (0..1).
    pub base_intensity: f32,
    /// Intensity at the top of a breath (0..1).
    pub peak_intensity: f32,
    /// Seconds per breath.
    pub period_s: f32,
    pub interval_ms: u64,
    pub duration_ms: u32,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_intensity: 0.10,
            peak_intensity: 0.15,
            period_s: 4.0,
            interval_ms: 100,
            duration_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalConfig {
    pub enabled: bool,
    /// Intensity at the column facing the contact (0..100).
    pub base_intensity: u8,
    /// Columns further than this from the contact angle stay off.
    pub spread_deg: f32,
    /// Opposite-face columns are only lit within this angle.
    pub side_threshold_deg: f32,
    /// Multiplier for back columns.
    pub back_boost: f32,
    /// Column intensities at or below this are dropped.
    pub min_intensity: u8,
    pub interval_ms: u64,
    pub duration_ms: u32,
}

impl Default for DirectionalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_intensity: 100,
            spread_deg: 70.0,
            side_threshold_deg: 50.0,
            back_boost: 1.3,
            min_intensity: 5,
            interval_ms: 100,
            duration_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverConfig {
    /// Log grids through tracing.
    #[default]
    Log,
    /// Send JSON frames over UDP to a bridge process.
    Udp { target: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneConfig {
    pub enabled: bool,
    /// Endpoint that accepts `{"force", "type"}` JSON posts.
    pub url: String,
    /// Impacts at or below this force are not forwarded.
    pub impact_threshold: f32,
    /// Force sent while a segment rests on something.
    pub contact_force: f32,
    /// Minimum spacing between requests of any kind.
    pub throttle_ms: u64,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://192.168.1.10:8081/vibrate".into(),
            impact_threshold: 0.5,
            contact_force: 0.2,
            throttle_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed simulation step in seconds.
    pub fixed_step_s: f32,
    /// Height of the floor plane used by the reference solver for contacts.
    pub floor_height: f32,
    /// Peak acceleration of the simulated input source.
    pub simulated_amplitude: f32,
    /// Rate of the simulated input source (Hz).
    pub simulated_rate_hz: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fixed_step_s: 0.02,
            floor_height: 0.5,
            simulated_amplitude: 0.3,
            simulated_rate_hz: 60.0,
        }
    }
}

// Serde helpers for glam types, written as plain arrays in TOML.

mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec3, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec3, D::Error> {
        let [x, y, z] = <[f32; 3]>::deserialize(d)?;
        Ok(Vec3::new(x, y, z))
    }
}

mod quat_serde {
    use glam::Quat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(q: &Quat, s: S) -> Result<S::Ok, S::Error> {
        [q.x, q.y, q.z, q.w].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Quat, D::Error> {
        let [x, y, z, w] = <[f32; 4]>::deserialize(d)?;
        Ok(Quat::from_xyzw(x, y, z, w).normalize())
    }
}
