#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Pedalers 🚲
//!
//! A simulated indoor bike that speaks the Bluetooth Low Energy Cycling Speed
//! and Cadence (CSC) and Cycling Power (CP) profiles.
//!
//! No sensor is read. Speed and cadence smoothly follow set-points, cumulative
//! wheel and crank revolutions are derived from them, and power is computed
//! from how close the bike is to its set-points plus a little jitter. The
//! measurements are encoded in the exact little-endian layouts defined by the
//! Bluetooth SIG so any fitness app can consume them.
//!
//! ## Components
//!
//! - [`TelemetrySimulator`]: overflow-safe, NaN-proof state machine advanced
//!   by [`TelemetrySimulator::tick`]
//! - [`protocol`]: pure encoders (and decoders) for the CSC Measurement
//!   (0x2A5B) and CP Measurement (0x2A63) payloads
//! - [`BikePeripheral`]: the loop that ticks, encodes and notifies through a
//!   host BLE stack behind [`MeasurementSink`]
//! - [`ble::SensorMonitor`]: a btleplug central that watches a bike and
//!   decodes what it sends
//!
//! ## Quick Start
//!
//! ```
//! use pedalers::{
//!     encode_cp, encode_csc, CrankRevolutions, CrankWidth, SimulatorConfig, TelemetrySimulator,
//! };
//!
//! let mut bike = TelemetrySimulator::new(SimulatorConfig::default());
//! bike.set_target_speed(25.0);
//!
//! for now_ms in (100..=1_000).step_by(100) {
//!     bike.tick(now_ms);
//! }
//!
//! let state = bike.snapshot();
//! let csc = encode_csc(
//!     state.wheel_revolutions,
//!     state.wheel_event_time,
//!     CrankRevolutions::with_width(state.crank_revolutions, CrankWidth::Standard),
//!     state.crank_event_time,
//! );
//! let cp = encode_cp(state.instantaneous_power);
//!
//! assert_eq!(csc.len(), 11);
//! assert_eq!(cp.len(), 4);
//! ```

use uuid::Uuid;

/// Bluetooth Low Energy central for watching bikes
pub mod ble;
/// Monotonic time source
pub mod clock;
/// Error types and handling
pub mod error;
/// Driver loop and host stack seams
pub mod peripheral;
/// Measurement payload encoders and decoders
pub mod protocol;
/// Telemetry simulation
pub mod simulator;
/// Type definitions and configuration
pub mod types;

// Re-export the main types for convenient usage
pub use clock::{Clock, MonotonicClock};
pub use error::{PedalError, Result};
pub use peripheral::{
    BikePeripheral, ConnectionEvents, ConnectionTracker, MeasurementSink, PeripheralHandle,
};
pub use protocol::{
    encode_cp, encode_cp_with_crank, encode_csc, CpMeasurement, CrankRevolutions, CscMeasurement,
};
pub use simulator::TelemetrySimulator;
pub use types::{
    ConnectionState, CrankWidth, MeasurementProfile, PeripheralConfig, PowerProfile, ScanParams,
    SensorLocation, SimulatorConfig, TelemetryState,
};

/// Cycling Speed and Cadence service (0x1816)
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// CSC Measurement characteristic (0x2A5B), notified with [`encode_csc`] payloads
pub const CSC_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a5b_0000_1000_8000_0080_5f9b_34fb);

/// CSC Feature characteristic (0x2A5C), see [`MeasurementProfile::csc_feature`]
pub const CSC_FEATURE_UUID: Uuid = Uuid::from_u128(0x0000_2a5c_0000_1000_8000_0080_5f9b_34fb);

/// Sensor Location characteristic (0x2A5D), see [`MeasurementProfile::sensor_location`]
pub const SENSOR_LOCATION_UUID: Uuid =
    Uuid::from_u128(0x0000_2a5d_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power service (0x1818)
pub const CP_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1818_0000_1000_8000_0080_5f9b_34fb);

/// CP Measurement characteristic (0x2A63), notified with [`encode_cp`] payloads
pub const CP_MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x0000_2a63_0000_1000_8000_0080_5f9b_34fb);

/// CP Feature characteristic (0x2A65), see [`MeasurementProfile::cp_feature`]
pub const CP_FEATURE_UUID: Uuid = Uuid::from_u128(0x0000_2a65_0000_1000_8000_0080_5f9b_34fb);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuids_use_bluetooth_base() {
        let cases = [
            (CSC_SERVICE_UUID, "00001816-0000-1000-8000-00805f9b34fb"),
            (CSC_MEASUREMENT_UUID, "00002a5b-0000-1000-8000-00805f9b34fb"),
            (CSC_FEATURE_UUID, "00002a5c-0000-1000-8000-00805f9b34fb"),
            (SENSOR_LOCATION_UUID, "00002a5d-0000-1000-8000-00805f9b34fb"),
            (CP_SERVICE_UUID, "00001818-0000-1000-8000-00805f9b34fb"),
            (CP_MEASUREMENT_UUID, "00002a63-0000-1000-8000-00805f9b34fb"),
            (CP_FEATURE_UUID, "00002a65-0000-1000-8000-00805f9b34fb"),
        ];

        for (uuid, expected) in cases {
            assert_eq!(uuid, Uuid::parse_str(expected).unwrap());
        }
    }
}
