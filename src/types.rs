use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the cumulative crank revolutions field in the CSC measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CrankWidth {
    /// 16-bit field, as defined by the Bluetooth SIG
    #[default]
    Standard,
    /// 32-bit field used by some legacy firmware
    Extended,
}

impl fmt::Display for CrankWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => write!(f, "16-bit"),
            Self::Extended => write!(f, "32-bit"),
        }
    }
}

/// Optional field set of the Cycling Power measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerProfile {
    /// Flags and instantaneous power only
    #[default]
    Minimal,
    /// Adds cumulative crank revolutions and last crank event time
    CrankRevolutions,
}

impl fmt::Display for PowerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "Minimal"),
            Self::CrankRevolutions => write!(f, "Crank Revolutions"),
        }
    }
}

/// One consistent pairing of CSC crank width and CP field set
///
/// The measurement payloads and the Feature characteristic values are both
/// derived from this, so a client never sees a payload the advertised
/// features do not describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeasurementProfile {
    /// Width of the CSC crank revolutions field
    pub crank_width: CrankWidth,
    /// Fields present in the CP measurement
    pub power_profile: PowerProfile,
}

/// Sensor Location characteristic (0x2A5D) values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorLocation {
    /// Other
    Other = 0,
    /// Rear wheel
    RearWheel = 12,
}

impl From<u8> for SensorLocation {
    fn from(value: u8) -> Self {
        match value {
            12 => Self::RearWheel,
            _ => Self::Other,
        }
    }
}

impl From<SensorLocation> for u8 {
    fn from(location: SensorLocation) -> Self {
        location as Self
    }
}

impl fmt::Display for SensorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other => write!(f, "Other"),
            Self::RearWheel => write!(f, "Rear Wheel"),
        }
    }
}

/// Whether a central is currently attached to the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No central connected, advertising
    #[default]
    Disconnected,
    /// A central is connected
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Physical state of the simulated bike
///
/// Event times are the low 16 bits of the millisecond timestamp of the tick
/// that last advanced the axis. Update instants of `0` mean the axis has never
/// been updated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryState {
    /// Cumulative wheel revolutions, never 0
    pub wheel_revolutions: u32,
    /// Last wheel event time
    pub wheel_event_time: u16,
    /// Cumulative crank revolutions, never 0
    pub crank_revolutions: u32,
    /// Last crank event time
    pub crank_event_time: u16,
    /// Instantaneous power in watts
    pub instantaneous_power: i16,
    /// Current speed (km/h)
    pub speed_kmh: f32,
    /// Current cadence (rpm)
    pub cadence_rpm: f32,
    /// Speed set-point (km/h)
    pub target_speed_kmh: f32,
    /// Cadence set-point (rpm)
    pub target_cadence_rpm: f32,
    /// Instant of the last wheel/speed update (ms)
    pub last_wheel_update_ms: u64,
    /// Instant of the last crank/cadence update (ms)
    pub last_crank_update_ms: u64,
    /// Instant of the last power update (ms)
    pub last_power_update_ms: u64,
}

impl TelemetryState {
    /// Starting state for a freshly booted bike
    ///
    /// Current speed and cadence start on their set-points so the first
    /// notifications already carry riding values.
    #[must_use]
    pub fn initial(config: &SimulatorConfig) -> Self {
        Self {
            wheel_revolutions: 1,
            wheel_event_time: 0,
            crank_revolutions: 1,
            crank_event_time: 0,
            instantaneous_power: config.min_power,
            speed_kmh: config.initial_speed_kmh,
            cadence_rpm: config.initial_cadence_rpm,
            target_speed_kmh: config.initial_speed_kmh,
            target_cadence_rpm: config.initial_cadence_rpm,
            last_wheel_update_ms: 0,
            last_crank_update_ms: 0,
            last_power_update_ms: 0,
        }
    }
}

/// Simulator tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Wheel circumference in meters
    pub wheel_circumference_m: f32,
    /// Lower power bound in watts
    pub min_power: i16,
    /// Upper power bound in watts
    pub max_power: i16,
    /// Upper speed bound (km/h)
    pub max_speed_kmh: f32,
    /// Upper cadence bound (rpm)
    pub max_cadence_rpm: f32,
    /// Speed set-point at startup (km/h)
    pub initial_speed_kmh: f32,
    /// Cadence set-point at startup (rpm)
    pub initial_cadence_rpm: f32,
    /// Speed set-point substituted for a non-finite value (km/h)
    pub fallback_speed_kmh: f32,
    /// Cadence set-point substituted for a non-finite value (rpm)
    pub fallback_cadence_rpm: f32,
    /// Minimum interval between wheel updates (ms)
    pub wheel_interval_ms: u64,
    /// Minimum interval between crank updates (ms)
    pub crank_interval_ms: u64,
    /// Minimum interval between power updates (ms)
    pub power_interval_ms: u64,
    /// Carry the fractional part of each revolution increment into the next window
    pub accumulate_fractional_revolutions: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            wheel_circumference_m: 2.0,
            min_power: 50,
            max_power: 300,
            max_speed_kmh: 40.0,
            max_cadence_rpm: 120.0,
            initial_speed_kmh: 20.0,
            initial_cadence_rpm: 90.0,
            fallback_speed_kmh: 15.0,
            fallback_cadence_rpm: 70.0,
            wheel_interval_ms: 100,
            crank_interval_ms: 100,
            power_interval_ms: 100,
            accumulate_fractional_revolutions: false,
        }
    }
}

/// Driver loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralConfig {
    /// Period of the tick/encode/notify loop in milliseconds
    pub notify_interval_ms: u64,
    /// Longest tolerated run of failed notifications in milliseconds
    pub watchdog_timeout_ms: u64,
    /// Payload layout pairing
    pub profile: MeasurementProfile,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            notify_interval_ms: 50,
            watchdog_timeout_ms: 10_000,
            profile: MeasurementProfile::default(),
        }
    }
}

/// Scan and connect parameters for [`crate::ble::SensorMonitor`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanParams {
    /// How long to scan for advertisements in milliseconds
    pub scan_timeout_ms: u64,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 10_000,
            connect_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_config_defaults() {
        let config = SimulatorConfig::default();

        assert!((config.wheel_circumference_m - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.min_power, 50);
        assert_eq!(config.max_power, 300);
        assert!((config.max_speed_kmh - 40.0).abs() < f32::EPSILON);
        assert!((config.max_cadence_rpm - 120.0).abs() < f32::EPSILON);
        assert!((config.initial_speed_kmh - 20.0).abs() < f32::EPSILON);
        assert!((config.initial_cadence_rpm - 90.0).abs() < f32::EPSILON);
        assert!((config.fallback_speed_kmh - 15.0).abs() < f32::EPSILON);
        assert!((config.fallback_cadence_rpm - 70.0).abs() < f32::EPSILON);
        assert_eq!(config.wheel_interval_ms, 100);
        assert_eq!(config.crank_interval_ms, 100);
        assert_eq!(config.power_interval_ms, 100);
        assert!(!config.accumulate_fractional_revolutions);
    }

    #[test]
    fn test_initial_state() {
        let state = TelemetryState::initial(&SimulatorConfig::default());

        assert_eq!(state.wheel_revolutions, 1);
        assert_eq!(state.crank_revolutions, 1);
        assert_eq!(state.instantaneous_power, 50);
        assert_eq!(state.last_wheel_update_ms, 0);
        assert_eq!(state.last_crank_update_ms, 0);
        assert_eq!(state.last_power_update_ms, 0);
        assert!((state.target_speed_kmh - 20.0).abs() < f32::EPSILON);
        assert!((state.target_cadence_rpm - 90.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_sensor_location_from_u8() {
        assert_eq!(SensorLocation::from(12), SensorLocation::RearWheel);
        assert_eq!(SensorLocation::from(0), SensorLocation::Other);
        assert_eq!(SensorLocation::from(99), SensorLocation::Other);
        assert_eq!(u8::from(SensorLocation::RearWheel), 12);
    }

    #[test]
    fn test_peripheral_config_defaults() {
        let config = PeripheralConfig::default();
        assert_eq!(config.notify_interval_ms, 50);
        assert_eq!(config.watchdog_timeout_ms, 10_000);
        assert_eq!(config.profile.crank_width, CrankWidth::Standard);
        assert_eq!(config.profile.power_profile, PowerProfile::Minimal);
    }

    #[test]
    fn test_scan_params_default() {
        let params = ScanParams::default();
        assert_eq!(params.scan_timeout_ms, 10_000);
        assert_eq!(params.connect_timeout_ms, 30_000);
    }
}
