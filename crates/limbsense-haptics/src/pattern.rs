use crate::grid::{ActuatorGrid, MAX_INTENSITY};
use crate::zones::{HapticZoneMap, Zone};
use glam::Vec3;
use limbsense_config::{IdleConfig, ImpactConfig, SwayConfig, TensionConfig};

/// One dispatch to the driver: a full grid and how long to hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    pub grid: ActuatorGrid,
    pub duration_ms: u32,
}

impl Pattern {
    pub fn new(grid: ActuatorGrid, duration_ms: u32) -> Self {
        Self { grid, duration_ms }
    }

    /// A grid with every index of `zones` at `intensity`.
    pub fn zones(map: &HapticZoneMap, zones: &[Zone], intensity: u8, duration_ms: u32) -> Self {
        let mut grid = ActuatorGrid::new();
        for &zone in zones {
            grid.light(map.zone_indices(zone).iter().copied(), intensity);
        }
        Self::new(grid, duration_ms)
    }
}

/// Scale a `0..=1` level to an actuator intensity, truncating.
pub fn unit_to_intensity(level: f32) -> u8 {
    (level.clamp(0.0, 1.0) * MAX_INTENSITY as f32) as u8
}

/// Lets something through at most once per interval of simulation time.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl RateLimiter {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// True if enough time passed since the last accepted call; records `now_ms`
    /// when it does.
    pub fn ready(&mut self, now_ms: u64) -> bool {
        match self.last_ms {
            Some(last) if now_ms.saturating_sub(last) < self.interval_ms => false,
            _ => {
                self.last_ms = Some(now_ms);
                true
            }
        }
    }

    /// Restart the interval at `now_ms` without asking.
    pub fn mark(&mut self, now_ms: u64) {
        self.last_ms = Some(now_ms);
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}

/// Side-to-side swing of the limb, felt on the outer back columns.
#[derive(Debug, Clone)]
pub struct SwayMapper {
    config: SwayConfig,
    limiter: RateLimiter,
}

impl SwayMapper {
    pub fn new(config: SwayConfig) -> Self {
        let limiter = RateLimiter::new(config.interval_ms);
        Self { config, limiter }
    }

    /// Rate-limited evaluation; the interval restarts on every evaluation,
    /// whether or not it actuates.
    pub fn evaluate(
        &mut self,
        yaw_velocity_deg: f32,
        now_ms: u64,
        zones: &HapticZoneMap,
    ) -> Option<Pattern> {
        if !self.config.enabled || !self.limiter.ready(now_ms) {
            return None;
        }
        sway_pattern(&self.config, yaw_velocity_deg, zones)
    }

    pub fn reset(&mut self) {
        self.limiter.reset();
    }
}

/// Positive yaw lights the left columns, negative the right: the felt pull is
/// opposite the turn.
pub fn sway_pattern(
    config: &SwayConfig,
    yaw_velocity_deg: f32,
    zones: &HapticZoneMap,
) -> Option<Pattern> {
    let speed = yaw_velocity_deg.abs();
    if !speed.is_finite() || speed <= config.velocity_threshold {
        return None;
    }
    let intensity = unit_to_intensity(speed * config.intensity_multiplier / 100.0);
    let zone = if yaw_velocity_deg > 0.0 {
        Zone::SwayLeft
    } else {
        Zone::SwayRight
    };
    Some(Pattern::zones(zones, &[zone], intensity, config.duration_ms))
}

/// A delayed step of an impact response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbStep {
    pub delay_ms: u64,
    pub pattern: Pattern,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImpactResponse {
    pub near_root: bool,
    pub immediate: Pattern,
    pub reverberation: Vec<ReverbStep>,
}

pub fn impact_intensity(impact_force: f32, multiplier: f32) -> u8 {
    unit_to_intensity(impact_force * multiplier)
}

pub fn is_near_root(config: &ImpactConfig, distance: f32) -> bool {
    distance < config.max_impact_distance * config.near_root_ratio
}

/// Near the root: a concentrated hit at the base, then two steps travelling up
/// the spine at half intensity each. Further out: a weaker diffuse hit with no
/// follow-up. `None` when the impact is too soft to feel.
pub fn impact_response(
    config: &ImpactConfig,
    impact_force: f32,
    contact_point: Vec3,
    root_position: Vec3,
    zones: &HapticZoneMap,
) -> Option<ImpactResponse> {
    let intensity = impact_intensity(impact_force, config.intensity_multiplier);
    if intensity == 0 {
        return None;
    }

    let distance = root_position.distance(contact_point);
    if !is_near_root(config, distance) {
        let weak = (intensity as f32 * config.tip_intensity_ratio.clamp(0.0, 1.0)) as u8;
        return Some(ImpactResponse {
            near_root: false,
            immediate: Pattern::zones(zones, &[Zone::TipDiffuse], weak, config.tip_duration_ms),
            reverberation: Vec::new(),
        });
    }

    let immediate = Pattern::zones(
        zones,
        &[Zone::LowerCenter, Zone::RootCenter],
        intensity,
        config.near_duration_ms,
    );
    // Halving stops at the first step that would be silent.
    let mut level = intensity;
    let reverberation = [Zone::MidCenter, Zone::UpperCenter]
        .into_iter()
        .enumerate()
        .map_while(|(k, zone)| {
            level /= 2;
            (level > 0).then(|| ReverbStep {
                delay_ms: config.reverberation_delay_ms * (k as u64 + 1),
                pattern: Pattern::zones(zones, &[zone], level, config.reverberation_duration_ms),
            })
        })
        .collect();

    Some(ImpactResponse {
        near_root: true,
        immediate,
        reverberation,
    })
}

/// Spine clusters lit for `tension`, from the root upward.
pub fn tension_zones(config: &TensionConfig, tension: f32) -> Vec<Zone> {
    let mut zones = vec![Zone::RootCenter];
    zones.extend(
        config
            .thresholds
            .iter()
            .zip(&Zone::SPINE[1..])
            .filter(|(&threshold, _)| tension > threshold)
            .map(|(_, &zone)| zone),
    );
    zones
}

/// `None` at or below the tension floor.
pub fn tension_pattern(
    config: &TensionConfig,
    tension: f32,
    zones: &HapticZoneMap,
) -> Option<Pattern> {
    if !config.enabled || !(tension > config.floor) {
        return None;
    }
    let intensity = unit_to_intensity(tension);
    Some(Pattern::zones(
        zones,
        &tension_zones(config, tension),
        intensity,
        config.duration_ms,
    ))
}

/// Slow breathing at the root so the limb's weight is felt at rest.
#[derive(Debug, Clone)]
pub struct IdleMapper {
    config: IdleConfig,
    limiter: RateLimiter,
}

impl IdleMapper {
    pub fn new(config: IdleConfig) -> Self {
        let limiter = RateLimiter::new(config.interval_ms);
        Self { config, limiter }
    }

    pub fn evaluate(&mut self, now_ms: u64, zones: &HapticZoneMap) -> Option<Pattern> {
        if !self.config.enabled || !self.limiter.ready(now_ms) {
            return None;
        }
        let intensity = breath_intensity(&self.config, now_ms);
        (intensity > 0).then(|| {
            Pattern::zones(zones, &[Zone::RootCenter], intensity, self.config.duration_ms)
        })
    }

    pub fn reset(&mut self) {
        self.limiter.reset();
    }
}

/// Phase is taken modulo the period in integer-precise f64 so long sessions
/// breathe at the same rate as short ones.
pub fn breath_intensity(config: &IdleConfig, now_ms: u64) -> u8 {
    let period_ms = (config.period_s.max(f32::EPSILON) as f64 * 1000.0).max(1.0);
    let phase = (now_ms as f64).rem_euclid(period_ms) / period_ms;
    let breath = (((phase * std::f64::consts::TAU).sin() + 1.0) / 2.0) as f32;
    unit_to_intensity(config.base_intensity + breath * (config.peak_intensity - config.base_intensity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> HapticZoneMap {
        HapticZoneMap::new()
    }

    #[test]
    fn sway_below_threshold_is_silent() {
        let config = SwayConfig::default();
        for v in [0.0, 3.0, -9.9, 10.0, -10.0] {
            assert!(sway_pattern(&config, v, &zones()).is_none(), "{v}");
        }
    }

    #[test]
    fn sway_directions_are_mirrored() {
        let config = SwayConfig::default();
        let left = sway_pattern(&config, 80.0, &zones()).unwrap();
        let right = sway_pattern(&config, -80.0, &zones()).unwrap();

        let l = left.grid.lit();
        let r = right.grid.lit();
        assert_eq!(l, vec![24, 28, 32]);
        assert_eq!(r, vec![27, 31, 35]);
        assert!(l.iter().all(|i| !r.contains(i)));
        assert_eq!(left.grid.max_intensity(), right.grid.max_intensity());
        // 80 * 0.5 / 100 = 0.4
        assert_eq!(left.grid.get(24), 40);
        assert_eq!(left.duration_ms, 100);
    }

    #[test]
    fn sway_is_rate_limited() {
        let mut mapper = SwayMapper::new(SwayConfig::default());
        let z = zones();
        assert!(mapper.evaluate(50.0, 0, &z).is_some());
        assert!(mapper.evaluate(50.0, 60, &z).is_none());
        assert!(mapper.evaluate(50.0, 100, &z).is_some());
        // A quiet evaluation still restarts the interval.
        assert!(mapper.evaluate(1.0, 200, &z).is_none());
        assert!(mapper.evaluate(50.0, 250, &z).is_none());
    }

    #[test]
    fn near_root_impact_intensities_follow_formula() {
        let config = ImpactConfig::default();
        let response =
            impact_response(&config, 2.0, Vec3::new(0.0, 0.0, -0.1), Vec3::ZERO, &zones())
                .unwrap();
        assert!(response.near_root);

        let expected = ((2.0f32 * 0.7).clamp(0.0, 1.0) * 100.0) as u8;
        assert_eq!(expected, 100);
        assert_eq!(response.immediate.grid.lit(), vec![33, 34, 37, 38]);
        assert_eq!(response.immediate.grid.get(37), expected);

        assert_eq!(response.reverberation.len(), 2);
        let first = &response.reverberation[0];
        let second = &response.reverberation[1];
        assert_eq!(first.pattern.grid.lit(), vec![29, 30]);
        assert_eq!(first.pattern.grid.get(29), expected / 2);
        assert_eq!(second.pattern.grid.lit(), vec![25, 26]);
        assert_eq!(second.pattern.grid.get(25), expected / 4);
        assert_eq!(first.delay_ms, 100);
        assert_eq!(second.delay_ms, 200);
    }

    #[test]
    fn tip_impact_has_no_reverberation() {
        let config = ImpactConfig::default();
        // Exactly at the boundary counts as a tip impact.
        let boundary = config.max_impact_distance * config.near_root_ratio;
        let response = impact_response(
            &config,
            1.0,
            Vec3::new(0.0, 0.0, -boundary),
            Vec3::ZERO,
            &zones(),
        )
        .unwrap();
        assert!(!response.near_root);
        assert!(response.reverberation.is_empty());
        assert_eq!(response.immediate.grid.lit(), vec![32, 35, 36, 39]);
        assert_eq!(response.immediate.grid.get(32), (70.0 * 0.8) as u8);
        assert_eq!(response.immediate.duration_ms, 200);
    }

    #[test]
    fn weak_near_root_impact_skips_silent_steps() {
        let config = ImpactConfig::default();
        // 0.015 * 0.7 -> intensity 1, which halves straight to nothing.
        let response = impact_response(&config, 0.015, Vec3::ZERO, Vec3::ZERO, &zones()).unwrap();
        assert!(response.near_root);
        assert_eq!(response.immediate.grid.get(37), 1);
        assert!(response.reverberation.is_empty());

        // Intensity 3 keeps the first step at 1 and drops the second.
        let response = impact_response(&config, 0.045, Vec3::ZERO, Vec3::ZERO, &zones()).unwrap();
        assert_eq!(response.immediate.grid.get(37), 3);
        assert_eq!(response.reverberation.len(), 1);
        assert_eq!(response.reverberation[0].pattern.grid.get(29), 1);
    }

    #[test]
    fn zero_force_is_not_felt() {
        assert!(impact_response(&ImpactConfig::default(), 0.0, Vec3::ZERO, Vec3::ZERO, &zones())
            .is_none());
    }

    #[test]
    fn tension_zones_grow_monotonically() {
        let config = TensionConfig::default();
        let samples: Vec<f32> = (0..=20).map(|i| i as f32 / 20.0).collect();
        for pair in samples.windows(2) {
            let low = tension_zones(&config, pair[0]);
            let high = tension_zones(&config, pair[1]);
            assert!(low.iter().all(|z| high.contains(z)), "{pair:?}");
        }
        assert_eq!(tension_zones(&config, 0.95), Zone::SPINE.to_vec());
        assert_eq!(tension_zones(&config, 0.3), vec![Zone::RootCenter]);
    }

    #[test]
    fn tension_pattern_respects_floor() {
        let config = TensionConfig::default();
        assert!(tension_pattern(&config, 0.005, &zones()).is_none());
        let pattern = tension_pattern(&config, 0.75, &zones()).unwrap();
        assert_eq!(pattern.grid.lit(), vec![29, 30, 33, 34, 37, 38]);
        assert_eq!(pattern.grid.get(37), 75);
    }

    #[test]
    fn breathing_stays_between_base_and_peak() {
        let config = IdleConfig::default();
        for ms in (0..8000).step_by(250) {
            let v = breath_intensity(&config, ms);
            assert!((10..=15).contains(&v), "{ms}: {v}");
        }
        // Crest at a quarter period, trough at three quarters.
        assert!(breath_intensity(&config, 1000) > breath_intensity(&config, 3000));
        assert_eq!(breath_intensity(&config, 3000), 10);
    }

    #[test]
    fn breathing_keeps_its_phase_in_long_sessions() {
        let config = IdleConfig::default();
        let period_ms = (config.period_s * 1000.0) as u64;
        let later = period_ms * 10_000_000;
        for ms in [0, 500, 1000, 2500, 3000] {
            assert_eq!(breath_intensity(&config, later + ms), breath_intensity(&config, ms), "{ms}");
        }
    }

    #[test]
    fn rate_limiter_mark_restarts_interval() {
        let mut limiter = RateLimiter::new(100);
        limiter.mark(40);
        assert!(!limiter.ready(139));
        assert!(limiter.ready(140));
    }

    #[test]
    fn rate_limiter_first_call_passes() {
        let mut limiter = RateLimiter::new(100);
        assert!(limiter.ready(5));
        assert!(!limiter.ready(104));
        assert!(limiter.ready(105));
    }
}
