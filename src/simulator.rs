use crate::types::{SimulatorConfig, TelemetryState};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::{debug, trace, warn};

/// Fraction of the remaining distance to the set-point covered per update
const SMOOTHING_GAIN: f32 = 0.1;

/// Distance to the set-point within which the value is left unchanged
const SMOOTHING_DEADBAND: f32 = 0.1;

/// Simulated time covered by one axis update, in seconds
const UPDATE_WINDOW_S: f32 = 0.1;

/// Ceiling on the wheel revolution rate fed into an increment (rev/s)
const MAX_WHEEL_REV_RATE: f32 = 20.0;

/// Ceiling on the crank revolution rate fed into an increment (rev/s)
const MAX_CRANK_REV_RATE: f32 = 5.0;

/// Most wheel revolutions added by one update
const MAX_WHEEL_INCREMENT: u32 = 10;

/// Most crank revolutions added by one update
const MAX_CRANK_INCREMENT: u32 = 5;

/// Smallest set-point used as a divisor for the power factors
const MIN_FACTOR_DIVISOR: f32 = 0.1;

/// Power jitter is `r / 1000` for `r` drawn from this range (±5%)
const POWER_JITTER_PERMILLE: std::ops::Range<i16> = -50..50;

/// Synthesizes bike telemetry without any sensor input
///
/// The simulator smoothly tracks speed and cadence set-points, turns them into
/// cumulative wheel and crank revolutions, and derives a jittered power value.
/// It never fails: non-finite set-points fall back to fixed defaults, counters
/// saturate instead of wrapping, and a zero timestamp is ignored.
///
/// Each of the three axes (wheel/speed, crank/cadence, power) is gated on its
/// own minimum interval, so [`tick`](Self::tick) may be called more often than
/// the axes update.
///
/// # Examples
///
/// ```
/// use pedalers::{encode_cp, SimulatorConfig, TelemetrySimulator};
///
/// let mut bike = TelemetrySimulator::with_seed(SimulatorConfig::default(), 7);
/// bike.tick(100);
///
/// let state = bike.snapshot();
/// assert_eq!(state.wheel_event_time, 100);
/// assert!((50..=300).contains(&state.instantaneous_power));
///
/// let payload = encode_cp(state.instantaneous_power);
/// assert_eq!(payload.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct TelemetrySimulator<R = SmallRng> {
    config: SimulatorConfig,
    state: TelemetryState,
    wheel_carry: f32,
    crank_carry: f32,
    rng: R,
}

impl TelemetrySimulator<SmallRng> {
    /// Create a simulator whose power jitter is seeded once from OS entropy
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self::with_rng(config, SmallRng::from_entropy())
    }

    /// Create a simulator with a reproducible jitter sequence
    #[must_use]
    pub fn with_seed(config: SimulatorConfig, seed: u64) -> Self {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }
}

impl<R: Rng> TelemetrySimulator<R> {
    /// Create a simulator drawing power jitter from `rng`
    pub fn with_rng(config: SimulatorConfig, rng: R) -> Self {
        let state = TelemetryState::initial(&config);
        Self {
            config,
            state,
            wheel_carry: 0.0,
            crank_carry: 0.0,
            rng,
        }
    }

    /// Simulator tuning
    pub const fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Copy of the current state
    pub const fn snapshot(&self) -> TelemetryState {
        self.state
    }

    /// Set the speed set-point (km/h)
    ///
    /// The value is stored as given; a non-finite value is replaced by the
    /// fallback set-point the next time an update reads it.
    pub fn set_target_speed(&mut self, speed_kmh: f32) {
        self.state.target_speed_kmh = speed_kmh;
    }

    /// Set the cadence set-point (rpm)
    ///
    /// Same substitution rule as [`set_target_speed`](Self::set_target_speed).
    pub fn set_target_cadence(&mut self, cadence_rpm: f32) {
        self.state.target_cadence_rpm = cadence_rpm;
    }

    /// Advance the simulation to `now_ms`
    ///
    /// `now_ms == 0` means the clock is not running yet and the call does
    /// nothing. Otherwise every axis whose interval has elapsed (or that was
    /// never updated) is recomputed and stamped with `now_ms`. When no axis is
    /// due because the clock has moved behind all of them, the three axes are
    /// updated once anyway and re-based onto the new clock.
    pub fn tick(&mut self, now_ms: u64) {
        if now_ms == 0 {
            trace!("Clock reads zero, skipping tick");
            return;
        }

        let wheel_due = is_due(
            self.state.last_wheel_update_ms,
            now_ms,
            self.config.wheel_interval_ms,
        );
        let crank_due = is_due(
            self.state.last_crank_update_ms,
            now_ms,
            self.config.crank_interval_ms,
        );
        let power_due = is_due(
            self.state.last_power_update_ms,
            now_ms,
            self.config.power_interval_ms,
        );

        if wheel_due {
            self.update_speed(now_ms);
            self.state.last_wheel_update_ms = now_ms;
        }
        if crank_due {
            self.update_cadence(now_ms);
            self.state.last_crank_update_ms = now_ms;
        }
        if power_due {
            self.update_power();
            self.state.last_power_update_ms = now_ms;
        }

        if !(wheel_due || crank_due || power_due) && self.clock_regressed(now_ms) {
            warn!(
                "Clock moved back to {}ms (last update {}ms), forcing update",
                now_ms, self.state.last_wheel_update_ms
            );
            self.update_speed(now_ms);
            self.update_cadence(now_ms);
            self.update_power();
            self.state.last_wheel_update_ms = now_ms;
            self.state.last_crank_update_ms = now_ms;
            self.state.last_power_update_ms = now_ms;
        }
    }

    fn clock_regressed(&self, now_ms: u64) -> bool {
        now_ms < self.state.last_wheel_update_ms
            && now_ms < self.state.last_crank_update_ms
            && now_ms < self.state.last_power_update_ms
    }

    fn update_speed(&mut self, now_ms: u64) {
        let target = sanitize_set_point(
            &mut self.state.target_speed_kmh,
            self.config.fallback_speed_kmh,
            "speed",
        );
        let speed = smooth_toward(self.state.speed_kmh, target, self.config.max_speed_kmh);

        let rev_rate = speed * 1000.0 / (3600.0 * self.config.wheel_circumference_m);
        let increment = revolutions_in_window(
            rev_rate,
            MAX_WHEEL_REV_RATE,
            MAX_WHEEL_INCREMENT,
            self.config
                .accumulate_fractional_revolutions
                .then_some(&mut self.wheel_carry),
        );

        self.state.wheel_revolutions = self.state.wheel_revolutions.saturating_add(increment);
        self.state.wheel_event_time = event_time(now_ms);
        self.state.speed_kmh = speed;
    }

    fn update_cadence(&mut self, now_ms: u64) {
        let target = sanitize_set_point(
            &mut self.state.target_cadence_rpm,
            self.config.fallback_cadence_rpm,
            "cadence",
        );
        let cadence = smooth_toward(self.state.cadence_rpm, target, self.config.max_cadence_rpm);

        let increment = revolutions_in_window(
            cadence / 60.0,
            MAX_CRANK_REV_RATE,
            MAX_CRANK_INCREMENT,
            self.config
                .accumulate_fractional_revolutions
                .then_some(&mut self.crank_carry),
        );

        self.state.crank_revolutions = self.state.crank_revolutions.saturating_add(increment);
        self.state.crank_event_time = event_time(now_ms);
        self.state.cadence_rpm = cadence;
    }

    fn update_power(&mut self) {
        let TelemetryState {
            speed_kmh,
            target_speed_kmh,
            cadence_rpm,
            target_cadence_rpm,
            ..
        } = self.state;

        if ![speed_kmh, target_speed_kmh, cadence_rpm, target_cadence_rpm]
            .iter()
            .all(|value| value.is_finite())
        {
            debug!("Non-finite power input, holding minimum power");
            self.state.instantaneous_power = self.config.min_power;
            return;
        }

        let min_power = f32::from(self.config.min_power);
        let max_power = f32::from(self.config.max_power);

        let speed_factor = constrain(speed_kmh / target_speed_kmh.max(MIN_FACTOR_DIVISOR), 0.0, 1.0);
        let cadence_factor = constrain(
            cadence_rpm / target_cadence_rpm.max(MIN_FACTOR_DIVISOR),
            0.0,
            1.0,
        );

        let base_power = (max_power - min_power).mul_add(speed_factor, min_power);
        let mut power = base_power * 0.2f32.mul_add(cadence_factor, 0.8);

        let jitter = self.rng.gen_range(POWER_JITTER_PERMILLE);
        power *= 1.0 + f32::from(jitter) / 1000.0;

        self.state.instantaneous_power = truncate_power(constrain(power, min_power, max_power));
    }
}

const fn is_due(last_update_ms: u64, now_ms: u64, interval_ms: u64) -> bool {
    last_update_ms == 0 || now_ms.saturating_sub(last_update_ms) >= interval_ms
}

fn event_time(now_ms: u64) -> u16 {
    u16::try_from(now_ms & 0xFFFF).unwrap_or(u16::MAX)
}

/// Drop the fraction of a power value already clamped into the `i16` range
#[allow(clippy::cast_possible_truncation)]
fn truncate_power(watts: f32) -> i16 {
    watts.trunc() as i16
}

/// Clamp into `[min, max]`, mapping NaN and infinities to `min`
fn constrain(value: f32, min: f32, max: f32) -> f32 {
    if !value.is_finite() || value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

fn sanitize_set_point(set_point: &mut f32, fallback: f32, axis: &str) -> f32 {
    if !set_point.is_finite() {
        warn!("Non-finite {} set-point {}, using {}", axis, set_point, fallback);
        *set_point = fallback;
    }
    *set_point
}

fn smooth_toward(current: f32, target: f32, max: f32) -> f32 {
    let current = if current.is_finite() { current } else { 0.0 };
    let diff = target - current;

    let next = if diff.abs() > SMOOTHING_DEADBAND {
        diff.mul_add(SMOOTHING_GAIN, current)
    } else {
        current
    };

    constrain(next, 0.0, max)
}

/// Whole revolutions covered in one update window
///
/// With a carry, the fractional remainder is kept for the next window;
/// without one it is dropped.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn revolutions_in_window(
    rev_per_second: f32,
    max_rate: f32,
    max_increment: u32,
    carry: Option<&mut f32>,
) -> u32 {
    let mut revolutions = constrain(rev_per_second, 0.0, max_rate) * UPDATE_WINDOW_S;

    if let Some(carry) = carry {
        revolutions += *carry;
        *carry = revolutions.fract();
    }

    (revolutions.trunc() as u32).min(max_increment)
}
