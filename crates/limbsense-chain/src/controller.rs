use crate::chain::Chain;
use crate::math::{angle_axis_deg, euler_deg_to_quat};
use crate::stiffness::{StiffnessError, StiffnessProfile};
use glam::{Quat, Vec3};
use limbsense_config::{ChainConfig, IdleSwayConfig, RootConvergence};
use limbsense_imu::InertialSample;
use tracing::trace;

/// Deviation below which a segment gets no correction, degrees.
const MIN_CORRECTION_DEG: f32 = 0.1;

/// Acceleration-mode torque for one simulated segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTorque {
    pub index: usize,
    pub torque: Vec3,
}

/// What the controller hands the solver for one fixed step.
#[derive(Debug, Clone, Default)]
pub struct StepCommands {
    /// New world rotation for the kinematic root.
    pub root_rotation: Quat,
    /// Idle sway torque, applied at the root joint. Zero when disabled.
    pub root_torque: Vec3,
    pub torques: Vec<SegmentTorque>,
}

/// Drives the root from inertial samples and holds the rest of the chain
/// near its bind pose with per-segment spring-dampers.
#[derive(Debug, Clone)]
pub struct ChainController {
    force_magnitude: f32,
    imu_offset: Vec3,
    muscle_force: f32,
    damping: f32,
    idle_sway: IdleSwayConfig,
    convergence: RootConvergence,
    stiffness: StiffnessProfile,
    elapsed_s: f64,
}

impl ChainController {
    pub fn new(config: &ChainConfig) -> Result<Self, StiffnessError> {
        Ok(Self::with_profile(
            config,
            StiffnessProfile::from_config(&config.stiffness)?,
        ))
    }

    pub fn with_profile(config: &ChainConfig, stiffness: StiffnessProfile) -> Self {
        Self {
            force_magnitude: config.force_magnitude,
            imu_offset: config.imu_offset,
            muscle_force: config.muscle_force,
            damping: config.angular_damping,
            idle_sway: config.idle_sway.clone(),
            convergence: config.convergence,
            stiffness,
            elapsed_s: 0.0,
        }
    }

    /// Simulation time accumulated from fixed steps, seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed_s
    }

    pub fn reset_clock(&mut self) {
        self.elapsed_s = 0.0;
    }

    /// Run one fixed step of length `dt` seconds.
    pub fn step(&mut self, chain: &mut Chain, sample: &InertialSample, dt: f32) -> StepCommands {
        chain.refresh_globals();
        self.elapsed_s += dt as f64;

        let target = self.root_target(chain, sample);
        let current = chain.global_rotation(0);
        let root_rotation = current
            .slerp(target, self.convergence_factor(dt))
            .normalize();

        let torques: Vec<SegmentTorque> = (1..chain.len())
            .filter_map(|index| {
                self.muscle_torque(chain, index)
                    .map(|torque| SegmentTorque { index, torque })
            })
            .collect();

        trace!(
            t = self.elapsed_s,
            corrected = torques.len(),
            "Controller step"
        );

        StepCommands {
            root_rotation,
            root_torque: self.root_sway_torque(chain),
            torques,
        }
    }

    /// Root world rotation the sensor currently asks for.
    pub fn root_target(&self, chain: &Chain, sample: &InertialSample) -> Quat {
        let accel = sample.accel + self.imu_offset;
        let accel = if accel.is_finite() { accel } else { Vec3::ZERO };

        let pitch = accel.z * self.force_magnitude;
        let mut yaw = accel.x * self.force_magnitude;
        if self.idle_sway.enabled {
            yaw += self.sway_phase().sin() * self.idle_sway.amount_deg;
        }
        chain.initial_root_global_rotation() * euler_deg_to_quat(pitch, yaw, 0.0)
    }

    /// Slerp factor toward the root target for a step of `dt` seconds.
    pub fn convergence_factor(&self, dt: f32) -> f32 {
        match self.convergence {
            RootConvergence::Linear { rate } => (rate * dt).clamp(0.0, 1.0),
            RootConvergence::Exponential { rate } => 1.0 - (-rate.max(0.0) * dt).exp(),
        }
    }

    /// Stiffness for segment `index`, already scaled by the base muscle force.
    pub fn stiffness_at(&self, index: usize, segment_count: usize) -> f32 {
        let position = index as f32 / segment_count.max(1) as f32;
        self.stiffness.evaluate(position) * self.muscle_force
    }

    /// Spring-damper torque pulling segment `index` toward its bind pose
    /// relative to its parent. `None` for the root, detached segments,
    /// negligible deviation, or degenerate rotations.
    pub fn muscle_torque(&self, chain: &Chain, index: usize) -> Option<Vec3> {
        if index == 0 {
            return None;
        }
        let segment = chain.segment(index)?;
        let parent = segment.parent_index()?;

        let target = chain.global_rotation(parent) * segment.bind_local_rotation();
        let current = chain.global_rotation(index);
        let (axis, angle) = angle_axis_deg(target * current.inverse())?;
        if angle.abs() <= MIN_CORRECTION_DEG {
            return None;
        }

        let stiffness = self.stiffness_at(index, chain.len());
        let torque = axis * angle * stiffness - segment.angular_velocity * self.damping;
        torque.is_finite().then_some(torque)
    }

    fn root_sway_torque(&self, chain: &Chain) -> Vec3 {
        let sway = &self.idle_sway;
        if !(sway.enabled && sway.torque_enabled) {
            return Vec3::ZERO;
        }
        let forward = chain.global_rotation(0) * Vec3::Z;
        forward * self.sway_phase().sin() * sway.amount_deg * sway.torque_gain
    }

    /// `elapsed * speed` wrapped to one turn before narrowing to f32.
    fn sway_phase(&self) -> f32 {
        (self.elapsed_s * self.idle_sway.speed as f64).rem_euclid(std::f64::consts::TAU) as f32
    }
}
