use async_trait::async_trait;
use bytes::Bytes;
use pedalers::{
    BikePeripheral, MeasurementSink, MonotonicClock, PeripheralConfig, Result, SimulatorConfig,
    TelemetrySimulator, CP_MEASUREMENT_UUID, CSC_MEASUREMENT_UUID,
};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// Stands in for the host BLE stack and prints every notification
struct LogSink;

#[async_trait]
impl MeasurementSink for LogSink {
    async fn notify(&self, characteristic: Uuid, value: Bytes) -> Result<()> {
        let name = if characteristic == CSC_MEASUREMENT_UUID {
            "CSC"
        } else if characteristic == CP_MEASUREMENT_UUID {
            "CP "
        } else {
            "???"
        };
        info!("{} <- {:02X?}", name, value);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("🚲 Pedalers Virtual Bike Example");

    let config = SimulatorConfig {
        accumulate_fractional_revolutions: true,
        ..Default::default()
    };
    let peripheral_config = PeripheralConfig {
        notify_interval_ms: 100,
        ..Default::default()
    };
    let profile = peripheral_config.profile;
    info!(
        "CSC feature {:#06X}, CP feature {:#010X}, sensor location {}",
        profile.csc_feature(),
        profile.cp_feature(),
        profile.sensor_location()
    );

    let simulator = TelemetrySimulator::new(config);
    let mut bike = BikePeripheral::new(simulator, LogSink, MonotonicClock::new(), peripheral_config);
    let handle = bike.handle();

    // Print a summary every two seconds
    let reporter = handle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(2));
        while reporter.is_running().await {
            ticker.tick().await;
            let state = reporter.latest().await;
            println!(
                "speed {:5.1} km/h | cadence {:5.1} rpm | power {:3} W | wheel {} | crank {}",
                state.speed_kmh,
                state.cadence_rpm,
                state.instantaneous_power,
                state.wheel_revolutions,
                state.crank_revolutions
            );
        }
    });

    // Stop on Ctrl+C
    let stopper = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop().await;
        }
    });

    info!("Press Ctrl+C to stop");
    if let Err(e) = bike.run().await {
        error!("❌ Peripheral stopped: {}", e);
        return Err(e);
    }

    info!("🎉 Virtual bike stopped");
    Ok(())
}
