use crate::grid::{ActuatorGrid, MAX_INTENSITY};
use crate::pattern::{Pattern, RateLimiter};
use crate::zones::column_indices;
use glam::Vec3;
use limbsense_chain::math::{delta_angle, signed_angle_deg};
use limbsense_config::DirectionalConfig;

/// Horizontal angle of each torso column in degrees from forward, positive
/// toward +X. 0..4 span the front, 4..8 wrap around the back.
pub const COLUMN_ANGLES: [f32; 8] = [-67.5, -22.5, 22.5, 67.5, 135.0, 165.0, -165.0, -135.0];

/// Signed horizontal angle of `contact_point` around a body at
/// `body_position` facing `body_forward`.
pub fn contact_angle(body_position: Vec3, body_forward: Vec3, contact_point: Vec3) -> f32 {
    let mut direction = contact_point - body_position;
    direction.y = 0.0;
    signed_angle_deg(body_forward, direction, Vec3::Y)
}

/// Columns lit for a contact at `angle_deg`, falling off linearly over the
/// spread. `None` if nothing clears the minimum intensity.
pub fn directional_grid(config: &DirectionalConfig, angle_deg: f32) -> Option<ActuatorGrid> {
    if !angle_deg.is_finite() {
        return None;
    }
    let front_hit = angle_deg.abs() <= 90.0;
    let mut grid = ActuatorGrid::new();
    let mut hit = false;

    for (column, &column_angle) in COLUMN_ANGLES.iter().enumerate() {
        let front_column = column < 4;
        let diff = delta_angle(angle_deg, column_angle).abs();
        if front_hit != front_column && diff > config.side_threshold_deg {
            continue;
        }
        if diff >= config.spread_deg {
            continue;
        }

        let strength = 1.0 - diff / config.spread_deg;
        let mut intensity = (config.base_intensity as f32 * strength) as i32;
        if !front_column {
            intensity = (intensity as f32 * config.back_boost) as i32;
        }
        let intensity = intensity.clamp(0, MAX_INTENSITY as i32) as u8;
        if intensity > config.min_intensity {
            if let Some(indices) = column_indices(column) {
                grid.light(indices, intensity);
                hit = true;
            }
        }
    }

    hit.then_some(grid)
}

/// Whether a torso contact just began or is continuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Enter,
    Stay,
}

/// 360 degree contact feedback around the torso. A new contact always
/// fires and restarts the interval; continuing contact is rate-limited.
#[derive(Debug, Clone)]
pub struct DirectionalMapper {
    config: DirectionalConfig,
    limiter: RateLimiter,
}

impl DirectionalMapper {
    pub fn new(config: DirectionalConfig) -> Self {
        let limiter = RateLimiter::new(config.interval_ms);
        Self { config, limiter }
    }

    pub fn evaluate(&mut self, angle_deg: f32, phase: ContactPhase, now_ms: u64) -> Option<Pattern> {
        if !self.config.enabled {
            return None;
        }
        match phase {
            ContactPhase::Enter => self.limiter.mark(now_ms),
            ContactPhase::Stay => {
                if !self.limiter.ready(now_ms) {
                    return None;
                }
            }
        }
        directional_grid(&self.config, angle_deg)
            .map(|grid| Pattern::new(grid, self.config.duration_ms))
    }

    pub fn reset(&mut self) {
        self.limiter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_ahead_lights_the_two_center_front_columns() {
        let grid = directional_grid(&DirectionalConfig::default(), 0.0).unwrap();
        // 22.5 off center: 100 * (1 - 22.5 / 70) = 67
        assert_eq!(grid.get(1), 67);
        assert_eq!(grid.get(2), 67);
        assert_eq!(grid.get(9), 67);
        // 67.5 off: 100 * (1 - 67.5 / 70) = 3, below the minimum.
        assert_eq!(grid.get(0), 0);
        assert!(grid.lit().iter().all(|&i| i < 20));
    }

    #[test]
    fn back_columns_are_boosted() {
        let grid = directional_grid(&DirectionalConfig::default(), 180.0).unwrap();
        // Columns 5 and 6 sit 15 off: 100 * (1 - 15 / 70) = 78, * 1.3 = 101 -> 100.
        assert_eq!(grid.get(22), 100);
        assert_eq!(grid.get(21), 100);
        assert!(grid.lit().iter().all(|&i| i >= 20));
    }

    #[test]
    fn side_hit_spills_only_near_the_seam() {
        let config = DirectionalConfig::default();
        // Front-right at 80: back column 4 (135) is 55 away, past the side threshold.
        let grid = directional_grid(&config, 80.0).unwrap();
        assert_eq!(grid.get(23), 0);
        assert!(grid.get(3) > 0);
        // Rear-right at 100: front column 3 (67.5) is 32.5 away, inside it.
        let grid = directional_grid(&config, 100.0).unwrap();
        assert!(grid.get(3) > 0);
        assert!(grid.get(23) > 0);
    }

    #[test]
    fn contact_angle_is_signed_by_side() {
        let right = contact_angle(Vec3::ZERO, Vec3::Z, Vec3::new(1.0, 3.0, 0.0));
        let left = contact_angle(Vec3::ZERO, Vec3::Z, Vec3::new(-1.0, -2.0, 0.0));
        assert!((right - 90.0).abs() < 1e-4);
        assert!((left + 90.0).abs() < 1e-4);
    }

    #[test]
    fn continuing_contact_is_rate_limited() {
        let mut mapper = DirectionalMapper::new(DirectionalConfig::default());
        assert!(mapper.evaluate(0.0, ContactPhase::Enter, 0).is_some());
        assert!(mapper.evaluate(0.0, ContactPhase::Stay, 50).is_none());
        let pattern = mapper.evaluate(0.0, ContactPhase::Stay, 100).unwrap();
        assert_eq!(pattern.duration_ms, 200);
    }

    #[test]
    fn new_contact_fires_inside_the_interval() {
        let mut mapper = DirectionalMapper::new(DirectionalConfig::default());
        assert!(mapper.evaluate(0.0, ContactPhase::Enter, 0).is_some());
        assert!(mapper.evaluate(180.0, ContactPhase::Enter, 30).is_some());
        // The second contact restarted the interval.
        assert!(mapper.evaluate(180.0, ContactPhase::Stay, 100).is_none());
        assert!(mapper.evaluate(180.0, ContactPhase::Stay, 130).is_some());
    }
}
