use crate::types::InertialSample;
use glam::Vec3;

/// Post-parse conditioning applied on the ingestion side before a sample is
/// published: gyro bias removal and an optional acceleration tare.
///
/// The axis convention is applied by the wire parser; this stage only sees
/// samples already in the simulation frame.
pub struct SampleConditioner {
    /// Gyroscope bias (average of calibration samples).
    gyro_bias: Vec3,
    calibration: CalibrationState,
    /// Acceleration captured by "set zero", subtracted from later samples.
    accel_tare: Vec3,
    last_raw_accel: Vec3,
}

enum CalibrationState {
    Collecting { samples: Vec<Vec3>, target: usize },
    Calibrated,
}

impl SampleConditioner {
    /// `calibration_samples == 0` skips gyro calibration entirely.
    pub fn new(calibration_samples: u32) -> Self {
        Self {
            gyro_bias: Vec3::ZERO,
            calibration: Self::calibration_for(calibration_samples),
            accel_tare: Vec3::ZERO,
            last_raw_accel: Vec3::ZERO,
        }
    }

    fn calibration_for(samples: u32) -> CalibrationState {
        if samples == 0 {
            CalibrationState::Calibrated
        } else {
            CalibrationState::Collecting {
                samples: Vec::with_capacity(samples as usize),
                target: samples as usize,
            }
        }
    }

    /// Condition a parsed sample. While calibrating, the gyro passes through
    /// uncorrected so the root keeps tracking acceleration.
    pub fn apply(&mut self, sample: InertialSample) -> InertialSample {
        self.last_raw_accel = sample.accel;

        if let CalibrationState::Collecting { samples, target } = &mut self.calibration {
            samples.push(sample.gyro);
            if samples.len() >= *target {
                let sum: Vec3 = samples.iter().copied().sum();
                self.gyro_bias = sum / samples.len() as f32;
                self.calibration = CalibrationState::Calibrated;
                tracing::info!(
                    bias_x = self.gyro_bias.x,
                    bias_y = self.gyro_bias.y,
                    bias_z = self.gyro_bias.z,
                    "Gyro calibration complete"
                );
            }
            return InertialSample {
                accel: sample.accel - self.accel_tare,
                ..sample
            };
        }

        InertialSample {
            accel: sample.accel - self.accel_tare,
            gyro: sample.gyro - self.gyro_bias,
            captured_at_ms: sample.captured_at_ms,
        }
    }

    /// Treat the most recent acceleration as the neutral pose.
    pub fn set_zero(&mut self) {
        self.accel_tare = self.last_raw_accel;
        tracing::info!(
            x = self.accel_tare.x,
            y = self.accel_tare.y,
            z = self.accel_tare.z,
            "Acceleration zero reference set"
        );
    }

    /// Drop the acceleration tare.
    pub fn clear_zero(&mut self) {
        self.accel_tare = Vec3::ZERO;
    }

    /// Restart gyro bias calibration.
    pub fn recalibrate(&mut self, samples: u32) {
        self.calibration = Self::calibration_for(samples);
        self.gyro_bias = Vec3::ZERO;
        tracing::info!(samples, "Gyro recalibration started");
    }

    /// Whether calibration is complete.
    pub fn is_calibrated(&self) -> bool {
        matches!(self.calibration, CalibrationState::Calibrated)
    }

    pub fn gyro_bias(&self) -> Vec3 {
        self.gyro_bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(accel: Vec3, gyro: Vec3) -> InertialSample {
        InertialSample::new(accel, gyro, 0)
    }

    #[test]
    fn disabled_calibration_passes_through() {
        let mut c = SampleConditioner::new(0);
        assert!(c.is_calibrated());
        let out = c.apply(sample(Vec3::X, Vec3::Y));
        assert_eq!(out.accel, Vec3::X);
        assert_eq!(out.gyro, Vec3::Y);
    }

    #[test]
    fn bias_is_removed_after_calibration() {
        let mut c = SampleConditioner::new(4);
        let bias = Vec3::new(0.02, -0.01, 0.005);
        for _ in 0..4 {
            let out = c.apply(sample(Vec3::ZERO, bias));
            // Still raw while collecting.
            assert_eq!(out.gyro, bias);
        }
        assert!(c.is_calibrated());
        assert!((c.gyro_bias() - bias).length() < 1e-6);

        let out = c.apply(sample(Vec3::ZERO, bias + Vec3::Z));
        assert!((out.gyro - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn set_zero_tares_acceleration() {
        let mut c = SampleConditioner::new(0);
        c.apply(sample(Vec3::new(0.0, 9.8, 0.2), Vec3::ZERO));
        c.set_zero();
        let out = c.apply(sample(Vec3::new(1.0, 9.8, 0.2), Vec3::ZERO));
        assert!((out.accel - Vec3::X).length() < 1e-6);

        c.clear_zero();
        let out = c.apply(sample(Vec3::new(1.0, 9.8, 0.2), Vec3::ZERO));
        assert!((out.accel.y - 9.8).abs() < 1e-6);
    }

    #[test]
    fn recalibrate_resets_bias() {
        let mut c = SampleConditioner::new(1);
        c.apply(sample(Vec3::ZERO, Vec3::ONE));
        assert!(c.is_calibrated());
        c.recalibrate(2);
        assert!(!c.is_calibrated());
        assert_eq!(c.gyro_bias(), Vec3::ZERO);
    }
}
