use crate::{
    clock::Clock,
    error::{PedalError, Result},
    simulator::TelemetrySimulator,
    types::{ConnectionState, PeripheralConfig, TelemetryState},
    CP_MEASUREMENT_UUID, CSC_MEASUREMENT_UUID,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::RwLock,
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Notification path of the host BLE stack
///
/// One call corresponds to setting a characteristic's value and notifying
/// subscribed centrals.
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    /// Publish `value` on the characteristic identified by `characteristic`
    ///
    /// # Errors
    ///
    /// Implementations return [`PedalError::Notify`] when the stack refuses
    /// the value.
    async fn notify(&self, characteristic: Uuid, value: Bytes) -> Result<()>;
}

/// Connection callbacks invoked by the host BLE stack
pub trait ConnectionEvents: Send + Sync {
    /// A central connected
    fn on_connect(&self);
    /// The central disconnected; the stack should resume advertising
    fn on_disconnect(&self);
}

/// [`ConnectionEvents`] implementation that records the link state
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connected: AtomicBool,
    disconnects: AtomicU32,
}

impl ConnectionTracker {
    /// Current link state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::Acquire) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Number of disconnects seen since startup
    #[must_use]
    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::Relaxed)
    }
}

impl ConnectionEvents for ConnectionTracker {
    fn on_connect(&self) {
        self.connected.store(true, Ordering::Release);
        info!("Central connected");
    }

    fn on_disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        let count = self.disconnects.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Central disconnected ({} so far), advertising again", count);
    }
}

/// Cloneable view onto a running [`BikePeripheral`]
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    running: Arc<RwLock<bool>>,
    latest: Arc<RwLock<TelemetryState>>,
    connection: Arc<ConnectionTracker>,
}

impl PeripheralHandle {
    /// Ask the driver loop to exit after its current iteration
    pub async fn stop(&self) {
        *self.running.write().await = false;
        info!("Peripheral stop requested");
    }

    /// Whether the driver loop has not been stopped
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Copy of the most recently published snapshot
    ///
    /// The whole state is copied under one lock, so revolution counters and
    /// their event times always belong to the same tick.
    pub async fn latest(&self) -> TelemetryState {
        *self.latest.read().await
    }

    /// Connection callbacks to hand to the host stack
    #[must_use]
    pub fn connection(&self) -> Arc<ConnectionTracker> {
        self.connection.clone()
    }
}

/// Drives a [`TelemetrySimulator`] and publishes its measurements
///
/// Every iteration ticks the simulator with the clock's time, publishes the
/// snapshot, encodes the CSC and CP payloads with the configured
/// [`MeasurementProfile`](crate::MeasurementProfile) and hands them to the
/// sink.
///
/// # Examples
///
/// ```no_run
/// use pedalers::{
///     BikePeripheral, MeasurementSink, MonotonicClock, PeripheralConfig, Result,
///     SimulatorConfig, TelemetrySimulator,
/// };
///
/// struct Stack;
///
/// #[async_trait::async_trait]
/// impl MeasurementSink for Stack {
///     async fn notify(&self, _characteristic: uuid::Uuid, _value: bytes::Bytes) -> Result<()> {
///         Ok(())
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let simulator = TelemetrySimulator::new(SimulatorConfig::default());
///     let mut bike = BikePeripheral::new(
///         simulator,
///         Stack,
///         MonotonicClock::new(),
///         PeripheralConfig::default(),
///     );
///     bike.run().await
/// }
/// ```
pub struct BikePeripheral<S, C> {
    simulator: TelemetrySimulator,
    sink: S,
    clock: C,
    config: PeripheralConfig,
    handle: PeripheralHandle,
}

impl<S: MeasurementSink, C: Clock> BikePeripheral<S, C> {
    /// Create a peripheral; it counts as running until stopped
    pub fn new(simulator: TelemetrySimulator, sink: S, clock: C, config: PeripheralConfig) -> Self {
        let handle = PeripheralHandle {
            running: Arc::new(RwLock::new(true)),
            latest: Arc::new(RwLock::new(simulator.snapshot())),
            connection: Arc::new(ConnectionTracker::default()),
        };

        Self {
            simulator,
            sink,
            clock,
            config,
            handle,
        }
    }

    /// Handle for stopping the loop and reading snapshots from other tasks
    #[must_use]
    pub fn handle(&self) -> PeripheralHandle {
        self.handle.clone()
    }

    /// Driver settings
    pub const fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    /// Change the speed and cadence set-points
    pub fn set_targets(&mut self, speed_kmh: f32, cadence_rpm: f32) {
        self.simulator.set_target_speed(speed_kmh);
        self.simulator.set_target_cadence(cadence_rpm);
    }

    /// Run one tick, publish and notify
    ///
    /// # Errors
    ///
    /// Returns the sink's error if either notification fails. The snapshot is
    /// published before notifying.
    pub async fn step(&mut self) -> Result<()> {
        self.simulator.tick(self.clock.now_ms());
        let state = self.simulator.snapshot();
        *self.handle.latest.write().await = state;

        let csc = self.config.profile.encode_csc(&state);
        let cp = self.config.profile.encode_cp(&state);
        debug!("Notifying CSC: {:02X?} CP: {:02X?}", csc, cp);

        self.sink.notify(CSC_MEASUREMENT_UUID, csc).await?;
        self.sink.notify(CP_MEASUREMENT_UUID, cp).await?;

        Ok(())
    }

    /// Run the tick/encode/notify loop until stopped
    ///
    /// Failed notifications are retried on the next iteration. While no
    /// central is connected failures are expected and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PedalError::Stalled`] once no notification has been
    /// delivered to a connected central for longer than
    /// [`PeripheralConfig::watchdog_timeout_ms`].
    pub async fn run(&mut self) -> Result<()> {
        let period = Duration::from_millis(self.config.notify_interval_ms.max(1));
        let watchdog = Duration::from_millis(self.config.watchdog_timeout_ms);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_delivery = Instant::now();

        info!(
            "Peripheral loop started: every {}ms, {} crank field, {} power profile",
            self.config.notify_interval_ms,
            self.config.profile.crank_width,
            self.config.profile.power_profile
        );

        loop {
            ticker.tick().await;

            if !self.handle.is_running().await {
                info!("Peripheral loop stopped");
                break;
            }

            match self.step().await {
                Ok(()) => last_delivery = Instant::now(),
                Err(e) if self.handle.connection.state() == ConnectionState::Disconnected => {
                    debug!("Notification without a central: {}", e);
                    last_delivery = Instant::now();
                }
                Err(e) => {
                    warn!("Notification failed: {}", e);

                    let elapsed = last_delivery.elapsed();
                    if elapsed > watchdog {
                        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                        error!("No notification delivered for {}ms, giving up", elapsed_ms);
                        *self.handle.running.write().await = false;
                        return Err(PedalError::Stalled { elapsed_ms });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{CpMeasurement, CscMeasurement},
        types::{CrankWidth, MeasurementProfile, PowerProfile, SimulatorConfig},
    };
    use std::sync::atomic::AtomicU64;
    use tokio::sync::Mutex;

    #[derive(Default, Clone)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<(Uuid, Bytes)>>>,
    }

    #[async_trait]
    impl MeasurementSink for RecordingSink {
        async fn notify(&self, characteristic: Uuid, value: Bytes) -> Result<()> {
            self.sent.lock().await.push((characteristic, value));
            Ok(())
        }
    }

    struct RejectingSink;

    #[async_trait]
    impl MeasurementSink for RejectingSink {
        async fn notify(&self, _characteristic: Uuid, _value: Bytes) -> Result<()> {
            Err(PedalError::Notify("no subscribers".to_string()))
        }
    }

    /// Advances 100ms per reading, starting at 100ms
    #[derive(Default)]
    struct SteppingClock(AtomicU64);

    impl Clock for SteppingClock {
        fn now_ms(&self) -> u64 {
            self.0.fetch_add(100, Ordering::Relaxed) + 100
        }
    }

    fn simulator() -> TelemetrySimulator {
        TelemetrySimulator::with_seed(SimulatorConfig::default(), 11)
    }

    #[tokio::test]
    async fn test_step_notifies_csc_then_cp() {
        let sink = RecordingSink::default();
        let mut bike = BikePeripheral::new(
            simulator(),
            sink.clone(),
            SteppingClock::default(),
            PeripheralConfig::default(),
        );

        bike.step().await.unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, CSC_MEASUREMENT_UUID);
        assert_eq!(sent[1].0, CP_MEASUREMENT_UUID);

        let csc = CscMeasurement::parse(&sent[0].1).unwrap();
        let latest = bike.handle().latest().await;
        assert_eq!(csc.wheel_revolutions, Some(latest.wheel_revolutions));
        assert_eq!(csc.wheel_event_time, Some(100));
        assert_eq!(sent[0].1.len(), 11);

        let cp = CpMeasurement::parse(&sent[1].1).unwrap();
        assert_eq!(cp.flags, 0);
        assert_eq!(cp.instantaneous_power, latest.instantaneous_power);
    }

    #[tokio::test]
    async fn test_profile_controls_payload_shape() {
        let sink = RecordingSink::default();
        let config = PeripheralConfig {
            profile: MeasurementProfile {
                crank_width: CrankWidth::Extended,
                power_profile: PowerProfile::CrankRevolutions,
            },
            ..Default::default()
        };
        let mut bike = BikePeripheral::new(simulator(), sink.clone(), SteppingClock::default(), config);

        bike.step().await.unwrap();

        let sent = sink.sent.lock().await;
        assert_eq!(sent[0].1.len(), 13);
        assert_eq!(sent[1].1.len(), 8);
        let cp = CpMeasurement::parse(&sent[1].1).unwrap();
        assert_eq!(cp.crank_revolutions, Some(1));
    }

    #[tokio::test]
    async fn test_first_step_on_fresh_clock_updates() {
        let mut bike = BikePeripheral::new(
            simulator(),
            RecordingSink::default(),
            crate::clock::MonotonicClock::new(),
            PeripheralConfig::default(),
        );

        bike.step().await.unwrap();

        let latest = bike.handle().latest().await;
        assert_ne!(latest.last_wheel_update_ms, 0);
        assert_ne!(latest.last_power_update_ms, 0);
    }

    #[tokio::test]
    async fn test_set_targets_reach_simulator() {
        let mut bike = BikePeripheral::new(
            simulator(),
            RecordingSink::default(),
            SteppingClock::default(),
            PeripheralConfig::default(),
        );

        bike.set_targets(f32::NAN, 60.0);
        bike.step().await.unwrap();

        let latest = bike.handle().latest().await;
        assert!((latest.target_speed_kmh - 15.0).abs() < f32::EPSILON);
        assert!((latest.target_cadence_rpm - 60.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_run_stops_on_request() {
        let sink = RecordingSink::default();
        let config = PeripheralConfig {
            notify_interval_ms: 5,
            ..Default::default()
        };
        let mut bike = BikePeripheral::new(simulator(), sink.clone(), SteppingClock::default(), config);
        let handle = bike.handle();

        let task = tokio::spawn(async move { bike.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        let result = task.await.unwrap();
        assert!(result.is_ok());
        assert!(!handle.is_running().await);
        assert!(!sink.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_watchdog_trips_while_connected() {
        let config = PeripheralConfig {
            notify_interval_ms: 2,
            watchdog_timeout_ms: 20,
            ..Default::default()
        };
        let mut bike = BikePeripheral::new(simulator(), RejectingSink, SteppingClock::default(), config);
        let handle = bike.handle();
        handle.connection().on_connect();

        let result = bike.run().await;

        assert!(matches!(result, Err(PedalError::Stalled { elapsed_ms }) if elapsed_ms >= 20));
        assert!(!handle.is_running().await);
    }

    #[tokio::test]
    async fn test_failures_without_central_are_ignored() {
        let config = PeripheralConfig {
            notify_interval_ms: 2,
            watchdog_timeout_ms: 10,
            ..Default::default()
        };
        let mut bike = BikePeripheral::new(simulator(), RejectingSink, SteppingClock::default(), config);
        let handle = bike.handle();

        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            stopper.stop().await;
        });

        assert!(bike.run().await.is_ok());
        assert!(handle.latest().await.last_wheel_update_ms > 0);
    }

    #[test]
    fn test_connection_tracker() {
        let tracker = ConnectionTracker::default();
        assert_eq!(tracker.state(), ConnectionState::Disconnected);

        tracker.on_connect();
        assert_eq!(tracker.state(), ConnectionState::Connected);

        tracker.on_disconnect();
        tracker.on_connect();
        tracker.on_disconnect();
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        assert_eq!(tracker.disconnects(), 2);
    }

    #[test]
    fn test_step_blocking() {
        let mut bike = BikePeripheral::new(
            simulator(),
            RecordingSink::default(),
            SteppingClock::default(),
            PeripheralConfig::default(),
        );

        tokio_test::block_on(async {
            bike.step().await.unwrap();
            bike.step().await.unwrap();
            assert_eq!(bike.handle().latest().await.last_power_update_ms, 200);
        });
    }
}
