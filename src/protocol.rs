use crate::{
    error::{PedalError, Result},
    types::{CrankWidth, MeasurementProfile, PowerProfile, SensorLocation, TelemetryState},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// CSC measurement flag: wheel revolution data present
pub const CSC_FLAG_WHEEL_DATA: u8 = 0x01;

/// CSC measurement flag: crank revolution data present
pub const CSC_FLAG_CRANK_DATA: u8 = 0x02;

/// CP measurement flag: pedal power balance present
pub const CP_FLAG_PEDAL_POWER_BALANCE: u16 = 0x0001;

/// CP measurement flag: accumulated torque present
pub const CP_FLAG_ACCUMULATED_TORQUE: u16 = 0x0004;

/// CP measurement flag: wheel revolution data present
pub const CP_FLAG_WHEEL_DATA: u16 = 0x0010;

/// CP measurement flag: crank revolution data present
pub const CP_FLAG_CRANK_DATA: u16 = 0x0020;

/// CSC Feature bits: wheel and crank revolution data supported
pub const CSC_FEATURE_WHEEL_AND_CRANK: u16 = 0x0003;

/// CP Feature bit: crank revolution data supported
pub const CP_FEATURE_CRANK_DATA: u32 = 0x0000_0008;

/// Cumulative crank revolutions as carried on the wire
///
/// The variant fixes the field width, so a payload can never disagree with
/// the width it was meant to be encoded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrankRevolutions {
    /// 16-bit field
    Standard(u16),
    /// 32-bit field
    Extended(u32),
}

impl CrankRevolutions {
    /// Fit a counter into the given width, saturating at the width's maximum
    #[must_use]
    pub fn with_width(count: u32, width: CrankWidth) -> Self {
        match width {
            CrankWidth::Standard => Self::Standard(u16::try_from(count).unwrap_or(u16::MAX)),
            CrankWidth::Extended => Self::Extended(count),
        }
    }

    /// Counter value regardless of width
    #[must_use]
    pub fn count(self) -> u32 {
        match self {
            Self::Standard(count) => u32::from(count),
            Self::Extended(count) => count,
        }
    }

    /// Field width
    #[must_use]
    pub const fn width(self) -> CrankWidth {
        match self {
            Self::Standard(_) => CrankWidth::Standard,
            Self::Extended(_) => CrankWidth::Extended,
        }
    }
}

/// Encode a CSC Measurement (0x2A5B) payload
///
/// Layout (little-endian):
/// - Byte 0: flags, always `0x03` (wheel and crank data present)
/// - Bytes 1-4: cumulative wheel revolutions (u32)
/// - Bytes 5-6: last wheel event time (u16)
/// - Bytes 7-8 (or 7-10): cumulative crank revolutions (u16, or u32 when extended)
/// - Last 2 bytes: last crank event time (u16)
///
/// The payload is 11 bytes with a standard crank field and 13 with an
/// extended one.
#[must_use]
pub fn encode_csc(
    wheel_revolutions: u32,
    wheel_event_time: u16,
    crank_revolutions: CrankRevolutions,
    crank_event_time: u16,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(13);

    buf.put_u8(CSC_FLAG_WHEEL_DATA | CSC_FLAG_CRANK_DATA);

    buf.put_u32_le(wheel_revolutions);
    buf.put_u16_le(wheel_event_time);

    match crank_revolutions {
        CrankRevolutions::Standard(count) => buf.put_u16_le(count),
        CrankRevolutions::Extended(count) => buf.put_u32_le(count),
    }
    buf.put_u16_le(crank_event_time);

    buf.freeze()
}

/// Encode a minimal CP Measurement (0x2A63) payload
///
/// Layout: flags `0x0000` (u16 LE) followed by instantaneous power (i16 LE).
#[must_use]
pub fn encode_cp(instantaneous_power: i16) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u16_le(0x0000);
    buf.put_i16_le(instantaneous_power);
    buf.freeze()
}

/// Encode a CP Measurement payload carrying crank revolution data
///
/// Layout: flags `0x0020` (u16 LE), instantaneous power (i16 LE), cumulative
/// crank revolutions (u16 LE), last crank event time (u16 LE).
#[must_use]
pub fn encode_cp_with_crank(
    instantaneous_power: i16,
    crank_revolutions: u16,
    crank_event_time: u16,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u16_le(CP_FLAG_CRANK_DATA);
    buf.put_i16_le(instantaneous_power);
    buf.put_u16_le(crank_revolutions);
    buf.put_u16_le(crank_event_time);
    buf.freeze()
}

impl MeasurementProfile {
    /// Encode the CSC measurement for a snapshot
    #[must_use]
    pub fn encode_csc(&self, state: &TelemetryState) -> Bytes {
        encode_csc(
            state.wheel_revolutions,
            state.wheel_event_time,
            CrankRevolutions::with_width(state.crank_revolutions, self.crank_width),
            state.crank_event_time,
        )
    }

    /// Encode the CP measurement for a snapshot
    #[must_use]
    pub fn encode_cp(&self, state: &TelemetryState) -> Bytes {
        match self.power_profile {
            PowerProfile::Minimal => encode_cp(state.instantaneous_power),
            PowerProfile::CrankRevolutions => encode_cp_with_crank(
                state.instantaneous_power,
                // CP crank revolutions are 16-bit on the wire and roll over
                u16::try_from(state.crank_revolutions & 0xFFFF).unwrap_or(u16::MAX),
                state.crank_event_time,
            ),
        }
    }

    /// Value of the CSC Feature characteristic (0x2A5C)
    #[must_use]
    pub const fn csc_feature(&self) -> u16 {
        CSC_FEATURE_WHEEL_AND_CRANK
    }

    /// Value of the Sensor Location characteristic (0x2A5D), shared by CSC and CP
    #[must_use]
    pub const fn sensor_location(&self) -> SensorLocation {
        SensorLocation::RearWheel
    }

    /// Value of the CP Feature characteristic (0x2A65)
    #[must_use]
    pub const fn cp_feature(&self) -> u32 {
        match self.power_profile {
            PowerProfile::Minimal => 0,
            PowerProfile::CrankRevolutions => CP_FEATURE_CRANK_DATA,
        }
    }
}

/// Decoded CSC Measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CscMeasurement {
    /// Cumulative wheel revolutions, if present
    pub wheel_revolutions: Option<u32>,
    /// Last wheel event time, if present
    pub wheel_event_time: Option<u16>,
    /// Cumulative crank revolutions, if present
    pub crank_revolutions: Option<CrankRevolutions>,
    /// Last crank event time, if present
    pub crank_event_time: Option<u16>,
}

impl CscMeasurement {
    /// Parse a CSC Measurement payload
    ///
    /// A crank block of 6 bytes instead of 4 is read as the extended 32-bit
    /// crank counter.
    ///
    /// # Errors
    ///
    /// Returns [`PedalError::ParseError`] if the payload is empty or shorter
    /// than its flags announce.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(PedalError::ParseError("Empty CSC measurement".to_string()));
        }

        let mut buf = data;
        let flags = buf.get_u8();

        let mut measurement = Self {
            wheel_revolutions: None,
            wheel_event_time: None,
            crank_revolutions: None,
            crank_event_time: None,
        };

        if flags & CSC_FLAG_WHEEL_DATA != 0 {
            if buf.remaining() < 6 {
                return Err(PedalError::ParseError(format!(
                    "CSC wheel data truncated: {} bytes left, expected 6",
                    buf.remaining()
                )));
            }
            measurement.wheel_revolutions = Some(buf.get_u32_le());
            measurement.wheel_event_time = Some(buf.get_u16_le());
        }

        if flags & CSC_FLAG_CRANK_DATA != 0 {
            let revolutions = match buf.remaining() {
                4 => CrankRevolutions::Standard(buf.get_u16_le()),
                6 => CrankRevolutions::Extended(buf.get_u32_le()),
                n => {
                    return Err(PedalError::ParseError(format!(
                        "CSC crank data has {n} bytes, expected 4 or 6"
                    )))
                }
            };
            measurement.crank_revolutions = Some(revolutions);
            measurement.crank_event_time = Some(buf.get_u16_le());
        }

        Ok(measurement)
    }
}

/// Decoded CP Measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpMeasurement {
    /// Raw flags field
    pub flags: u16,
    /// Instantaneous power in watts
    pub instantaneous_power: i16,
    /// Cumulative crank revolutions, if present
    pub crank_revolutions: Option<u16>,
    /// Last crank event time, if present
    pub crank_event_time: Option<u16>,
}

impl CpMeasurement {
    /// Parse a CP Measurement payload
    ///
    /// Pedal power balance, accumulated torque and wheel revolution data are
    /// skipped; crank revolution data is decoded. Fields after the crank
    /// block are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PedalError::ParseError`] if the payload is shorter than the
    /// fields its flags announce.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(PedalError::ParseError(format!(
                "CP measurement too short: {} bytes, expected at least 4",
                data.len()
            )));
        }

        let mut buf = data;
        let flags = buf.get_u16_le();
        let instantaneous_power = buf.get_i16_le();

        let skipped = [
            (CP_FLAG_PEDAL_POWER_BALANCE, 1, "pedal power balance"),
            (CP_FLAG_ACCUMULATED_TORQUE, 2, "accumulated torque"),
            (CP_FLAG_WHEEL_DATA, 6, "wheel revolution data"),
        ];
        for (flag, len, name) in skipped {
            if flags & flag != 0 {
                if buf.remaining() < len {
                    return Err(PedalError::ParseError(format!("CP {name} truncated")));
                }
                buf.advance(len);
            }
        }

        let (crank_revolutions, crank_event_time) = if flags & CP_FLAG_CRANK_DATA != 0 {
            if buf.remaining() < 4 {
                return Err(PedalError::ParseError(
                    "CP crank revolution data truncated".to_string(),
                ));
            }
            (Some(buf.get_u16_le()), Some(buf.get_u16_le()))
        } else {
            (None, None)
        };

        Ok(Self {
            flags,
            instantaneous_power,
            crank_revolutions,
            crank_event_time,
        })
    }
}
