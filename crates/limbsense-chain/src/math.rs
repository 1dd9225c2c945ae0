use glam::{EulerRot, Quat, Vec3};

/// Rotation from Euler angles in degrees, applied roll, then pitch, then yaw
/// (Z, X, Y), matching the convention the chain was authored in.
pub fn euler_deg_to_quat(pitch_deg: f32, yaw_deg: f32, roll_deg: f32) -> Quat {
    Quat::from_euler(
        EulerRot::YXZ,
        yaw_deg.to_radians(),
        pitch_deg.to_radians(),
        roll_deg.to_radians(),
    )
}

/// Normalize an angle in degrees into `(-180, 180]`.
pub fn wrap_degrees(angle: f32) -> f32 {
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}

/// Signed shortest difference `to - from` in degrees, in `(-180, 180]`.
pub fn delta_angle(from_deg: f32, to_deg: f32) -> f32 {
    wrap_degrees(to_deg - from_deg)
}

/// Rotation `delta` as a unit axis and an angle in degrees within `(-180, 180]`.
///
/// Returns `None` when the rotation is degenerate (non-finite input or an axis
/// that cannot be normalized).
pub fn angle_axis_deg(delta: Quat) -> Option<(Vec3, f32)> {
    if !delta.is_finite() || delta.length_squared() < 1e-12 {
        return None;
    }
    let (axis, angle) = delta.normalize().to_axis_angle();
    let axis = axis.try_normalize()?;
    Some((axis, wrap_degrees(angle.to_degrees())))
}

/// Split `q` into a twist about `axis` and the remaining swing, `q = swing * twist`.
pub fn swing_twist(q: Quat, axis: Vec3) -> (Quat, Quat) {
    let r = Vec3::new(q.x, q.y, q.z);
    let p = axis * r.dot(axis);
    let twist = Quat::from_xyzw(p.x, p.y, p.z, q.w);
    let twist = if twist.length_squared() < 1e-12 {
        Quat::IDENTITY
    } else {
        twist.normalize()
    };
    (q * twist.conjugate(), twist)
}

/// Signed twist angle about `axis` in degrees.
pub fn twist_angle_deg(twist: Quat, axis: Vec3) -> f32 {
    let s = Vec3::new(twist.x, twist.y, twist.z).dot(axis);
    wrap_degrees((2.0 * s.atan2(twist.w)).to_degrees())
}

/// Signed angle from `from` to `to` around `up`, in degrees, after projecting
/// both onto the plane normal to `up`. Zero for degenerate input.
pub fn signed_angle_deg(from: Vec3, to: Vec3, up: Vec3) -> f32 {
    let from = (from - up * from.dot(up)).normalize_or_zero();
    let to = (to - up * to.dot(up)).normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return 0.0;
    }
    let angle = from.dot(to).clamp(-1.0, 1.0).acos().to_degrees();
    if from.cross(to).dot(up) < 0.0 {
        -angle
    } else {
        angle
    }
}
