use pedalers::{
    ble::{Measurement, SensorMonitor},
    PedalError, Result, ScanParams,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("📊 Pedalers Sensor Monitor Example");

    let monitor = SensorMonitor::new(ScanParams::default()).await?;
    let mut bikes = monitor.scan().await?;
    bikes.sort_by_key(|(bike, _)| std::cmp::Reverse(bike.rssi));

    let Some((bike, peripheral)) = bikes.into_iter().next() else {
        error!("❌ No bike found");
        return Err(PedalError::DeviceNotFound);
    };
    info!("✅ Connecting to {} (power: {})", bike.name, bike.has_power);

    let mut measurements = monitor.watch(peripheral).await?;

    let mut previous_csc = None;
    while let Some(measurement) = measurements.recv().await {
        match measurement {
            Measurement::Csc(csc) => {
                if let (Some(prev), Some(revs), Some(time)) =
                    (previous_csc, csc.wheel_revolutions, csc.wheel_event_time)
                {
                    let (prev_revs, prev_time): (u32, u16) = prev;
                    let delta_revs = revs.wrapping_sub(prev_revs);
                    let delta_time = time.wrapping_sub(prev_time);
                    println!("wheel +{delta_revs} revs over {delta_time} time units");
                }
                if let (Some(revs), Some(time)) = (csc.wheel_revolutions, csc.wheel_event_time) {
                    previous_csc = Some((revs, time));
                }
                if let Some(crank) = csc.crank_revolutions {
                    println!("crank {} ({})", crank.count(), crank.width());
                }
            }
            Measurement::Cp(cp) => println!("power {} W", cp.instantaneous_power),
        }
    }

    warn!("❌ Bike disconnected");
    Ok(())
}
