use crate::chain::Chain;
use crate::collision::RawContact;
use crate::controller::StepCommands;
use crate::math::{swing_twist, twist_angle_deg};
use crate::segment::{JointLimits, SegmentId};
use glam::{Quat, Vec3};
use tracing::trace;

/// Integrates controller commands into chain motion.
pub trait ConstraintSolver {
    fn integrate(&mut self, chain: &mut Chain, commands: &StepCommands, dt: f32);
}

/// A contact the solver detected during the last step.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentContact {
    pub segment: SegmentId,
    pub contact: RawContact,
}

/// Minimal joint integrator: kinematic root, damped angular velocities,
/// swing/twist limits, and a horizontal floor that reports contacts on entry.
#[derive(Debug, Clone)]
pub struct SimpleSolver {
    floor_height: f32,
    max_angular_velocity: f32,
    prev_positions: Vec<Vec3>,
    in_contact: Vec<bool>,
    contacts: Vec<SegmentContact>,
}

impl SimpleSolver {
    /// Angular speed cap, rad/s.
    pub const DEFAULT_MAX_ANGULAR_VELOCITY: f32 = 7.0;

    pub fn new(chain: &Chain, floor_height: f32) -> Self {
        let mut solver = Self {
            floor_height,
            max_angular_velocity: Self::DEFAULT_MAX_ANGULAR_VELOCITY,
            prev_positions: Vec::new(),
            in_contact: Vec::new(),
            contacts: Vec::new(),
        };
        solver.reset(chain);
        solver
    }

    pub fn with_max_angular_velocity(mut self, max: f32) -> Self {
        self.max_angular_velocity = max;
        self
    }

    /// Forget contact state and velocity history, e.g. after
    /// [`Chain::reset_dynamics`].
    pub fn reset(&mut self, chain: &Chain) {
        self.prev_positions = (0..chain.len()).map(|i| chain.global_position(i)).collect();
        self.in_contact = (0..chain.len())
            .map(|i| chain.global_position(i).y < self.floor_height)
            .collect();
        self.contacts.clear();
    }

    /// Contacts detected since the last call.
    pub fn drain_contacts(&mut self) -> Vec<SegmentContact> {
        std::mem::take(&mut self.contacts)
    }

    /// True while any segment is still below the floor.
    pub fn touching(&self) -> bool {
        self.in_contact.iter().any(|&c| c)
    }

    fn detect_floor_contacts(&mut self, chain: &Chain) {
        for i in 1..chain.len() {
            let pos = chain.global_position(i);
            let below = pos.y < self.floor_height;
            if below && !self.in_contact[i] {
                let seg = &chain.segments()[i];
                self.contacts.push(SegmentContact {
                    segment: seg.id,
                    contact: RawContact {
                        relative_velocity: seg.linear_velocity,
                        contact_points: vec![Vec3::new(pos.x, self.floor_height, pos.z)],
                    },
                });
                trace!(segment = %seg.id, "Floor contact");
            }
            self.in_contact[i] = below;
        }
    }
}

impl ConstraintSolver for SimpleSolver {
    fn integrate(&mut self, chain: &mut Chain, commands: &StepCommands, dt: f32) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }
        if self.prev_positions.len() != chain.len() {
            self.reset(chain);
        }

        chain.refresh_globals();
        let old_globals: Vec<Quat> = (0..chain.len()).map(|i| chain.global_rotation(i)).collect();

        // Root is driven, not simulated; derive its velocity from the move.
        let root_delta = commands.root_rotation * old_globals[0].inverse();
        chain.set_root_global_rotation(commands.root_rotation);
        if let Some(root) = chain.segment_mut(0) {
            root.angular_velocity = scaled_axis(root_delta) / dt;
        }

        for torque in &commands.torques {
            if let Some(seg) = chain.segment_mut(torque.index) {
                if torque.index != 0 {
                    seg.angular_velocity += torque.torque * dt;
                }
            }
        }
        if commands.root_torque != Vec3::ZERO {
            for seg in chain.segments.iter_mut().filter(|s| s.parent_index == Some(0)) {
                seg.angular_velocity += commands.root_torque / seg.mass.max(1e-3) * dt;
            }
        }

        for i in 1..chain.len() {
            // Parent is earlier, so its new global is already final.
            let parent_new = match chain.segments[i].parent_index {
                Some(p) => new_global(chain, p),
                None => continue,
            };
            let seg = &mut chain.segments[i];

            seg.angular_velocity *= 1.0 / (1.0 + dt * seg.angular_damping.max(0.0));
            let speed = seg.angular_velocity.length();
            if speed > self.max_angular_velocity {
                seg.angular_velocity *= self.max_angular_velocity / speed;
            }

            let moved = Quat::from_scaled_axis(seg.angular_velocity * dt) * old_globals[i];
            let local = (parent_new.inverse() * moved).normalize();
            let bind = seg.bind_local_rotation();
            let (limited, clamped) = apply_limits(bind.inverse() * local, &seg.joint_limits);
            seg.current_local_rotation = (bind * limited).normalize();
            if clamped {
                seg.angular_velocity = Vec3::ZERO;
            }
            seg.resting = seg.angular_velocity.length_squared() < 1e-6;
        }

        chain.refresh_globals();
        for i in 0..chain.len() {
            let pos = chain.global_position(i);
            chain.segments[i].linear_velocity = (pos - self.prev_positions[i]) / dt;
            self.prev_positions[i] = pos;
        }
        self.detect_floor_contacts(chain);
    }
}

/// World rotation of segment `index` from current local rotations, walking up
/// the parent links. Used mid-integration when the cache is stale.
fn new_global(chain: &Chain, index: usize) -> Quat {
    let seg = &chain.segments[index];
    match seg.parent_index {
        Some(p) => new_global(chain, p) * seg.current_local_rotation,
        None => chain.anchor_rotation() * seg.current_local_rotation,
    }
}

fn scaled_axis(q: Quat) -> Vec3 {
    let q = if q.w < 0.0 { -q } else { q };
    let v = q.to_scaled_axis();
    if v.is_finite() {
        v
    } else {
        Vec3::ZERO
    }
}

/// Clamp a rotation relative to bind pose into the joint limits. Returns the
/// limited rotation and whether any clamp was applied.
fn apply_limits(relative: Quat, limits: &JointLimits) -> (Quat, bool) {
    let (swing, twist) = swing_twist(relative, Vec3::Z);
    let mut clamped = false;

    let twist_deg = twist_angle_deg(twist, Vec3::Z);
    let twist = if twist_deg < limits.twist_min || twist_deg > limits.twist_max {
        clamped = true;
        let limited = twist_deg.clamp(limits.twist_min, limits.twist_max);
        Quat::from_rotation_z(limited.to_radians())
    } else {
        twist
    };

    let swing = if swing.w < 0.0 { -swing } else { swing };
    let swing_deg = swing.angle_between(Quat::IDENTITY).to_degrees();
    let swing = if swing_deg > limits.swing.max(0.0) {
        clamped = true;
        let (axis, _) = swing.to_axis_angle();
        Quat::from_axis_angle(axis, limits.swing.max(0.0).to_radians())
    } else {
        swing
    };

    ((swing * twist).normalize(), clamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ChainController;
    use limbsense_config::{ChainConfig, IdleSwayConfig, SegmentConfig};
    use limbsense_imu::InertialSample;

    fn config() -> ChainConfig {
        ChainConfig {
            anchor_position: Vec3::new(0.0, 1.0, 0.0),
            idle_sway: IdleSwayConfig {
                enabled: false,
                ..IdleSwayConfig::default()
            },
            segments: SegmentConfig::straight_chain(5, 0.25),
            ..ChainConfig::default()
        }
    }

    #[test]
    fn muscles_pull_chain_back_to_bind_pose() {
        let config = config();
        let mut chain = Chain::from_config(&config).unwrap();
        let mut controller = ChainController::new(&ChainConfig {
            angular_damping: 4.0,
            ..config.clone()
        })
        .unwrap();
        let mut solver = SimpleSolver::new(&chain, -10.0);

        chain.segment_mut(1).unwrap().current_local_rotation = Quat::from_rotation_x(0.4);
        chain.refresh_globals();
        let start = chain.global_rotation(1).angle_between(chain.global_rotation(0));

        for _ in 0..200 {
            let commands = controller.step(&mut chain, &InertialSample::ZERO, 0.02);
            solver.integrate(&mut chain, &commands, 0.02);
        }
        let end = chain.global_rotation(1).angle_between(chain.global_rotation(0));
        assert!(end < start * 0.5, "start {start} end {end}");
        assert!(chain.segments().iter().all(|s| s.current_local_rotation.is_finite()));
    }

    #[test]
    fn root_is_set_kinematically() {
        let config = config();
        let mut chain = Chain::from_config(&config).unwrap();
        let mut solver = SimpleSolver::new(&chain, -10.0);
        let target = Quat::from_rotation_y(0.3);
        let commands = StepCommands {
            root_rotation: target,
            ..StepCommands::default()
        };
        solver.integrate(&mut chain, &commands, 0.02);
        assert!(chain.global_rotation(0).dot(target).abs() > 0.99999);
        assert!((chain.segments()[0].angular_velocity.y - 15.0).abs() < 1e-2);
    }

    #[test]
    fn swing_is_clamped() {
        let limits = JointLimits {
            swing: 20.0,
            twist_min: -10.0,
            twist_max: 10.0,
        };
        let (limited, clamped) = apply_limits(Quat::from_rotation_x(60f32.to_radians()), &limits);
        assert!(clamped);
        assert!((limited.angle_between(Quat::IDENTITY).to_degrees() - 20.0).abs() < 1e-2);

        let (limited, clamped) = apply_limits(Quat::from_rotation_z(25f32.to_radians()), &limits);
        assert!(clamped);
        assert!((twist_angle_deg(limited, Vec3::Z) - 10.0).abs() < 1e-2);

        let small = Quat::from_rotation_x(5f32.to_radians());
        let (limited, clamped) = apply_limits(small, &limits);
        assert!(!clamped);
        assert!(limited.dot(small).abs() > 0.99999);
    }

    #[test]
    fn floor_contact_reported_once_on_entry() {
        let config = config();
        let mut chain = Chain::from_config(&config).unwrap();
        // Floor just below the chain; pitching the root drops the tip into it.
        let mut solver = SimpleSolver::new(&chain, 0.9);
        let pitched = StepCommands {
            root_rotation: Quat::from_rotation_x(-40f32.to_radians()),
            ..StepCommands::default()
        };

        assert!(!solver.touching());
        solver.integrate(&mut chain, &pitched, 0.02);
        let first = solver.drain_contacts();
        assert!(!first.is_empty());
        assert!(solver.touching());
        assert!(first
            .iter()
            .all(|c| (c.contact.contact_points[0].y - 0.9).abs() < 1e-6));

        solver.integrate(&mut chain, &pitched, 0.02);
        let ids: Vec<SegmentId> = solver.drain_contacts().iter().map(|c| c.segment).collect();
        for contact in &first {
            assert!(!ids.contains(&contact.segment));
        }
    }
}
