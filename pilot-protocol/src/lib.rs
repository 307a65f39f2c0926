use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "v1";

/// Gyro triple reserved by bench tooling to probe the relay link without
/// engaging race logic.
pub const CALIBRATION_GYRO: [f64; 3] = [111.0, 112.0, 113.0];

/// Velocity magic value marking a calibration sample in velocity mode.
pub const CALIBRATION_VELOCITY: f64 = -999.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub timestamp_ms: i64,
    pub gyro: [f64; 3],
    pub accel: [f64; 3],
}

impl SensorEvent {
    pub fn is_calibration_probe(&self) -> bool {
        self.gyro == CALIBRATION_GYRO
    }

    /// Angular rate around the vertical axis, the only channel the race
    /// strategy consumes.
    pub fn gyro_z(&self) -> f64 {
        self.gyro[2]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityEvent {
    pub timestamp_ms: i64,
    pub velocity: f64,
}

impl VelocityEvent {
    pub fn is_calibration_probe(&self) -> bool {
        self.velocity == CALIBRATION_VELOCITY
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTimeEvent {
    pub duration_ms: i64,
}

/// Outbound power request, keyed by the vehicle identity the relay expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerControl {
    pub power: u8,
    pub vehicle: String,
    pub access_code: String,
    pub timestamp_ms: i64,
}

impl PowerControl {
    pub fn new(power: u8, vehicle: &str, access_code: &str, timestamp_ms: i64) -> Self {
        Self {
            power,
            vehicle: vehicle.to_string(),
            access_code: access_code.to_string(),
            timestamp_ms,
        }
    }
}

/// Every message a race produces, in the shape it is journaled and replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RaceMessage {
    RaceStart,
    RaceStop,
    Sensor(SensorEvent),
    Velocity(VelocityEvent),
    Penalty,
    RoundTime(RoundTimeEvent),
    Power(PowerControl),
}
