use thiserror::Error;

/// Errors that can occur around the simulated bike
///
/// The simulator and the measurement encoders never fail; these errors belong
/// to the layers around them: notifying the host stack, decoding payloads and
/// talking to a bike over the air.
#[derive(Error, Debug)]
pub enum PedalError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No bike found during scanning
    #[error("Bike sensor not found")]
    DeviceNotFound,

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Measurement parsing failed
    #[error("Failed to parse measurement: {0}")]
    ParseError(String),

    /// The host stack refused a notification
    #[error("Notification failed: {0}")]
    Notify(String),

    /// No notification went out for longer than the watchdog allows
    #[error("Peripheral stalled: no notification delivered for {elapsed_ms}ms")]
    Stalled {
        /// Time since the last delivered notification in milliseconds
        elapsed_ms: u64,
    },
}

/// Result type for pedalers operations
pub type Result<T> = std::result::Result<T, PedalError>;

impl PedalError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Ble(_) | Self::ConnectionFailed(_) | Self::DeviceNotFound)
    }

    /// Check if this error is recoverable by retrying the same operation
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Notify(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let connection_error = PedalError::ConnectionFailed("test".to_string());
        assert!(connection_error.is_connection_error());
        assert!(!connection_error.is_recoverable());

        let timeout_error = PedalError::Timeout { timeout_ms: 5000 };
        assert!(!timeout_error.is_connection_error());
        assert!(timeout_error.is_recoverable());

        let notify_error = PedalError::Notify("queue full".to_string());
        assert!(notify_error.is_recoverable());

        let stalled = PedalError::Stalled { elapsed_ms: 10_001 };
        assert!(!stalled.is_connection_error());
        assert!(!stalled.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = PedalError::ParseError("CSC payload too short".to_string());
        let error_string = format!("{error}");
        assert!(error_string.contains("Failed to parse measurement"));
        assert!(error_string.contains("CSC payload too short"));

        let stalled = PedalError::Stalled { elapsed_ms: 12_000 };
        assert!(format!("{stalled}").contains("12000ms"));
    }
}
