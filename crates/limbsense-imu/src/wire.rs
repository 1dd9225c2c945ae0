use crate::types::{AxisConvention, InertialSample};
use glam::Vec3;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed sensor packet: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Sensor packet contains a non-finite value")]
    NonFinite,
}

#[derive(Debug, Deserialize)]
struct Axes {
    x: f32,
    y: f32,
    z: f32,
}

impl From<Axes> for Vec3 {
    fn from(a: Axes) -> Self {
        Vec3::new(a.x, a.y, a.z)
    }
}

/// JSON body posted by the phone app.
#[derive(Debug, Deserialize)]
struct SensorPacket {
    #[serde(default)]
    timestamp: u64,
    accelerometer: Axes,
    gyroscope: Axes,
}

/// Parse a JSON sensor packet and bring it into the simulation frame.
pub fn parse_packet(body: &[u8], axes: AxisConvention) -> Result<InertialSample, WireError> {
    let packet: SensorPacket = serde_json::from_slice(body)?;
    let accel = Vec3::from(packet.accelerometer);
    let gyro = Vec3::from(packet.gyroscope);

    if !accel.is_finite() || !gyro.is_finite() {
        return Err(WireError::NonFinite);
    }

    Ok(InertialSample {
        accel: axes.apply(accel),
        gyro: axes.apply(gyro),
        captured_at_ms: packet.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET: &str = r#"{
        "timestamp": 1712345678901,
        "accelerometer": {"x": 0.5, "y": 9.8, "z": -1.25},
        "gyroscope": {"x": 0.1, "y": -0.2, "z": 0.3}
    }"#;

    #[test]
    fn parse_applies_axis_convention() {
        let sample = parse_packet(PACKET.as_bytes(), AxisConvention::PHONE).unwrap();
        assert_eq!(sample.captured_at_ms, 1712345678901);
        assert!((sample.accel.x + 0.5).abs() < 1e-6);
        assert!((sample.accel.y - 9.8).abs() < 1e-6);
        assert!((sample.accel.z - 1.25).abs() < 1e-6);
        assert!((sample.gyro.x + 0.1).abs() < 1e-6);
        assert!((sample.gyro.y + 0.2).abs() < 1e-6);
        assert!((sample.gyro.z + 0.3).abs() < 1e-6);
    }

    #[test]
    fn missing_timestamp_defaults_to_zero() {
        let body = r#"{"accelerometer":{"x":0,"y":0,"z":0},"gyroscope":{"x":0,"y":0,"z":0}}"#;
        let sample = parse_packet(body.as_bytes(), AxisConvention::IDENTITY).unwrap();
        assert_eq!(sample.captured_at_ms, 0);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = parse_packet(b"not json", AxisConvention::PHONE).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
    }

    #[test]
    fn missing_axis_is_rejected() {
        let body = r#"{"timestamp":1,"accelerometer":{"x":0,"y":0},"gyroscope":{"x":0,"y":0,"z":0}}"#;
        assert!(parse_packet(body.as_bytes(), AxisConvention::PHONE).is_err());
    }
}
