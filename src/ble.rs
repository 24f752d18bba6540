use btleplug::{
    api::{BDAddr, Central, Manager as _, Peripheral as _, ScanFilter},
    platform::{Manager, Peripheral},
};
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    error::{PedalError, Result},
    protocol::{CpMeasurement, CscMeasurement},
    types::{ScanParams, SensorLocation},
    CP_MEASUREMENT_UUID, CP_SERVICE_UUID, CSC_MEASUREMENT_UUID, CSC_SERVICE_UUID,
    SENSOR_LOCATION_UUID,
};

/// A decoded notification from a bike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    /// Cycling Speed and Cadence measurement
    Csc(CscMeasurement),
    /// Cycling Power measurement
    Cp(CpMeasurement),
}

impl Measurement {
    /// Decode a notification by the characteristic it arrived on
    ///
    /// Returns `None` for characteristics other than CSC and CP measurement.
    ///
    /// # Errors
    ///
    /// Returns [`PedalError::ParseError`] if the payload is malformed.
    pub fn decode(characteristic: uuid::Uuid, value: &[u8]) -> Result<Option<Self>> {
        if characteristic == CSC_MEASUREMENT_UUID {
            CscMeasurement::parse(value).map(|m| Some(Self::Csc(m)))
        } else if characteristic == CP_MEASUREMENT_UUID {
            CpMeasurement::parse(value).map(|m| Some(Self::Cp(m)))
        } else {
            Ok(None)
        }
    }
}

/// Bike found during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredBike {
    /// Advertised local name
    pub name: String,
    /// Device address
    pub address: BDAddr,
    /// Signal strength (RSSI)
    pub rssi: i16,
    /// Whether the Cycling Power service is advertised as well
    pub has_power: bool,
}

/// BLE central that watches simulated (or real) bikes
///
/// The monitor scans for peripherals advertising the Cycling Speed and
/// Cadence service, subscribes to their CSC and CP measurements and decodes
/// every notification.
pub struct SensorMonitor {
    manager: Manager,
    params: ScanParams,
}

impl SensorMonitor {
    /// Create a monitor on the system's BLE stack
    ///
    /// # Errors
    ///
    /// Returns [`PedalError::Ble`] if the Bluetooth manager cannot be initialized.
    pub async fn new(params: ScanParams) -> Result<Self> {
        let manager = Manager::new().await?;
        Ok(Self { manager, params })
    }

    /// Scan for bikes
    ///
    /// # Errors
    ///
    /// Returns [`PedalError::DeviceNotFound`] if no Bluetooth adapter is
    /// available, or [`PedalError::Ble`] for other Bluetooth errors.
    pub async fn scan(&self) -> Result<Vec<(DiscoveredBike, Peripheral)>> {
        info!("Scanning for cycling sensors...");

        let adapters = self.manager.adapters().await?;
        let central = adapters.first().ok_or(PedalError::DeviceNotFound)?;

        central
            .start_scan(ScanFilter {
                services: vec![CSC_SERVICE_UUID],
            })
            .await?;
        tokio::time::sleep(Duration::from_millis(self.params.scan_timeout_ms)).await;
        central.stop_scan().await?;

        let mut bikes = Vec::new();
        for peripheral in central.peripherals().await? {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            if !properties.services.contains(&CSC_SERVICE_UUID) {
                continue;
            }

            let bike = DiscoveredBike {
                name: properties
                    .local_name
                    .unwrap_or_else(|| "Unknown Bike".to_string()),
                address: properties.address,
                rssi: properties.rssi.unwrap_or(0),
                has_power: properties.services.contains(&CP_SERVICE_UUID),
            };
            info!("Found bike: {} ({})", bike.name, bike.address);
            bikes.push((bike, peripheral));
        }

        info!("Scan completed. Found {} bike(s)", bikes.len());
        Ok(bikes)
    }

    /// Connect to a bike and stream its decoded measurements
    ///
    /// Notifications are decoded on a background task; malformed payloads are
    /// logged and dropped. The channel closes when the bike disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`PedalError::Timeout`] if the connection is not established in
    /// time, [`PedalError::ConnectionFailed`] if it fails, or
    /// [`PedalError::Protocol`] if the CSC measurement characteristic is missing.
    pub async fn watch(&self, peripheral: Peripheral) -> Result<mpsc::UnboundedReceiver<Measurement>> {
        timeout(
            Duration::from_millis(self.params.connect_timeout_ms),
            peripheral.connect(),
        )
        .await
        .map_err(|_| PedalError::Timeout {
            timeout_ms: self.params.connect_timeout_ms,
        })?
        .map_err(|e| PedalError::ConnectionFailed(e.to_string()))?;

        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let csc_char = characteristics
            .iter()
            .find(|c| c.uuid == CSC_MEASUREMENT_UUID)
            .ok_or_else(|| {
                PedalError::Protocol("CSC measurement characteristic not found".to_string())
            })?;
        peripheral.subscribe(csc_char).await?;

        if let Some(location_char) = characteristics
            .iter()
            .find(|c| c.uuid == SENSOR_LOCATION_UUID)
        {
            match peripheral.read(location_char).await {
                Ok(value) => match value.first() {
                    Some(&raw) => info!("Sensor location: {}", SensorLocation::from(raw)),
                    None => debug!("Empty sensor location value"),
                },
                Err(e) => debug!("Could not read sensor location: {}", e),
            }
        }

        if let Some(cp_char) = characteristics.iter().find(|c| c.uuid == CP_MEASUREMENT_UUID) {
            peripheral.subscribe(cp_char).await?;
        } else {
            warn!("Bike has no CP measurement characteristic, power will be missing");
        }

        let mut notifications = peripheral.notifications().await?;
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(data) = notifications.next().await {
                match Measurement::decode(data.uuid, &data.value) {
                    Ok(Some(measurement)) => {
                        if sender.send(measurement).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!("Dropping notification {:02X?}: {}", data.value, e),
                }
            }
            info!("Notification stream ended");
        });

        info!("Watching bike {}", peripheral.address());
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_cp, encode_csc, CrankRevolutions};

    #[test]
    fn test_decode_by_characteristic() {
        let csc = encode_csc(300, 500, CrankRevolutions::Standard(40), 200);
        match Measurement::decode(CSC_MEASUREMENT_UUID, &csc).unwrap() {
            Some(Measurement::Csc(m)) => assert_eq!(m.wheel_revolutions, Some(300)),
            other => panic!("unexpected {other:?}"),
        }

        let cp = encode_cp(-1);
        match Measurement::decode(CP_MEASUREMENT_UUID, &cp).unwrap() {
            Some(Measurement::Cp(m)) => assert_eq!(m.instantaneous_power, -1),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(Measurement::decode(CSC_SERVICE_UUID, &csc).unwrap(), None);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(Measurement::decode(CP_MEASUREMENT_UUID, &[0x00]).is_err());
    }
}
