use limbsense_config::{CurveInterpolation, StiffnessConfig};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StiffnessError {
    #[error("stiffness curve needs at least one key")]
    NoKeys,
    #[error("key position {0} is outside [0, 1]")]
    PositionOutOfRange(f32),
    #[error("key positions must be strictly increasing")]
    Unsorted,
    #[error("key values must be all non-increasing or all non-decreasing")]
    NotMonotone,
    #[error("key contains a non-finite value")]
    NonFinite,
}

/// Monotone curve from normalized chain position to a stiffness multiplier.
#[derive(Debug, Clone)]
pub struct StiffnessProfile {
    keys: Vec<(f32, f32)>,
    interpolation: CurveInterpolation,
}

impl StiffnessProfile {
    pub fn new(
        keys: Vec<(f32, f32)>,
        interpolation: CurveInterpolation,
    ) -> Result<Self, StiffnessError> {
        if keys.is_empty() {
            return Err(StiffnessError::NoKeys);
        }
        for &(position, value) in &keys {
            if !position.is_finite() || !value.is_finite() {
                return Err(StiffnessError::NonFinite);
            }
            if !(0.0..=1.0).contains(&position) {
                return Err(StiffnessError::PositionOutOfRange(position));
            }
        }
        if keys.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(StiffnessError::Unsorted);
        }
        let rising = keys.windows(2).all(|w| w[1].1 >= w[0].1);
        let falling = keys.windows(2).all(|w| w[1].1 <= w[0].1);
        if !rising && !falling {
            return Err(StiffnessError::NotMonotone);
        }
        Ok(Self {
            keys,
            interpolation,
        })
    }

    /// Straight line from `base` at position 0 to `tip` at position 1.
    pub fn linear(base: f32, tip: f32) -> Self {
        Self {
            keys: vec![(0.0, base), (1.0, tip)],
            interpolation: CurveInterpolation::Linear,
        }
    }

    pub fn from_config(config: &StiffnessConfig) -> Result<Self, StiffnessError> {
        Self::new(
            config.keys.iter().map(|k| (k[0], k[1])).collect(),
            config.interpolation,
        )
    }

    /// Multiplier at `position`, clamped to `[0, 1]`. Holds the end values
    /// outside the keyed range.
    pub fn evaluate(&self, position: f32) -> f32 {
        let p = if position.is_finite() {
            position.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let first = self.keys[0];
        let last = self.keys[self.keys.len() - 1];
        if p <= first.0 {
            return first.1;
        }
        if p >= last.0 {
            return last.1;
        }

        let k = self.keys.partition_point(|key| key.0 <= p);
        let (x0, y0) = self.keys[k - 1];
        let (x1, y1) = self.keys[k];
        let u = (p - x0) / (x1 - x0);
        let u = match self.interpolation {
            CurveInterpolation::Linear => u,
            CurveInterpolation::Smooth => u * u * (3.0 - 2.0 * u),
        };
        y0 + (y1 - y0) * u
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_profile_interpolates() {
        let profile = StiffnessProfile::linear(1.0, 0.1);
        assert!((profile.evaluate(0.0) - 1.0).abs() < 1e-6);
        assert!((profile.evaluate(1.0) - 0.1).abs() < 1e-6);
        assert!((profile.evaluate(0.6) - 0.46).abs() < 1e-6);
    }

    #[test]
    fn evaluate_clamps_position() {
        let profile = StiffnessProfile::linear(1.0, 0.1);
        assert_eq!(profile.evaluate(-3.0), profile.evaluate(0.0));
        assert_eq!(profile.evaluate(7.0), profile.evaluate(1.0));
        assert_eq!(profile.evaluate(f32::NAN), profile.evaluate(0.0));
    }

    #[test]
    fn smooth_profile_eases_but_keeps_endpoints() {
        let profile = StiffnessProfile::new(
            vec![(0.0, 1.0), (1.0, 0.0)],
            CurveInterpolation::Smooth,
        )
        .unwrap();
        assert!((profile.evaluate(0.5) - 0.5).abs() < 1e-6);
        // Flat tangent at the base: smoothed value stays above the line.
        assert!(profile.evaluate(0.1) > 0.9);
        assert!((profile.evaluate(1.0)).abs() < 1e-6);
    }

    #[test]
    fn multi_key_profile_holds_ends() {
        let profile = StiffnessProfile::new(
            vec![(0.2, 1.0), (0.5, 0.5), (0.8, 0.2)],
            CurveInterpolation::Linear,
        )
        .unwrap();
        assert_eq!(profile.evaluate(0.0), 1.0);
        assert_eq!(profile.evaluate(0.9), 0.2);
        assert!((profile.evaluate(0.65) - 0.35).abs() < 1e-6);
    }

    #[test]
    fn profile_is_monotone_over_chain() {
        let profile = StiffnessProfile::linear(1.0, 0.1);
        let values: Vec<f32> = (0..=10).map(|i| profile.evaluate(i as f32 / 10.0)).collect();
        assert!(values.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn rejects_bad_keys() {
        assert_eq!(
            StiffnessProfile::new(vec![], CurveInterpolation::Linear).unwrap_err(),
            StiffnessError::NoKeys
        );
        assert_eq!(
            StiffnessProfile::new(vec![(0.5, 1.0), (0.2, 0.5)], CurveInterpolation::Linear)
                .unwrap_err(),
            StiffnessError::Unsorted
        );
        assert_eq!(
            StiffnessProfile::new(
                vec![(0.0, 1.0), (0.5, 0.2), (1.0, 0.8)],
                CurveInterpolation::Linear
            )
            .unwrap_err(),
            StiffnessError::NotMonotone
        );
        assert_eq!(
            StiffnessProfile::new(vec![(1.5, 1.0)], CurveInterpolation::Linear).unwrap_err(),
            StiffnessError::PositionOutOfRange(1.5)
        );
    }

    #[test]
    fn default_config_builds() {
        let profile = StiffnessProfile::from_config(&StiffnessConfig::default()).unwrap();
        assert!((profile.evaluate(0.5) - 0.55).abs() < 1e-6);
    }
}
