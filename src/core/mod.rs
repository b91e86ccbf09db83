#[cfg(feature = "modbus")]
pub mod modbus;

use core::{fmt, time::Duration};

/// (Thermodynamic) Temperature.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Temperature(f64);

impl Temperature {
    pub const fn from_degree_celsius(degree_celsius: f64) -> Self {
        Self(degree_celsius)
    }

    pub const fn to_degree_celsius(self) -> f64 {
        self.0
    }

    pub const fn min_degree_celsius() -> f64 {
        -40.0
    }

    pub const fn max_degree_celsius() -> f64 {
        85.0
    }

    pub const fn min() -> Self {
        Self::from_degree_celsius(Self::min_degree_celsius())
    }

    pub const fn max() -> Self {
        Self::from_degree_celsius(Self::max_degree_celsius())
    }

    /// Non-finite values are never valid.
    pub fn is_valid(self) -> bool {
        self >= Self::min() && self <= Self::max()
    }

    /// Clamp finite values into the valid range, non-finite values
    /// pass through.
    pub fn clamped(self) -> Self {
        if !self.0.is_finite() {
            return self;
        }
        Self(self.0.clamp(Self::min_degree_celsius(), Self::max_degree_celsius()))
    }
}

impl From<f64> for Temperature {
    fn from(from: f64) -> Self {
        Temperature(from)
    }
}

impl From<Temperature> for f64 {
    fn from(from: Temperature) -> Self {
        from.0
    }
}

/// Volumetric water content (VWC).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct VolumetricWaterContent(f64);

impl VolumetricWaterContent {
    pub const fn from_percent(percent: f64) -> Self {
        Self(percent)
    }

    pub const fn to_percent(self) -> f64 {
        self.0
    }

    pub const fn min_percent() -> f64 {
        0.0
    }

    pub const fn max_percent() -> f64 {
        100.0
    }

    pub const fn min() -> Self {
        Self::from_percent(Self::min_percent())
    }

    pub const fn max() -> Self {
        Self::from_percent(Self::max_percent())
    }

    pub fn is_valid(self) -> bool {
        self >= Self::min() && self <= Self::max()
    }

    /// Clamp finite values into the valid range, non-finite values
    /// pass through.
    pub fn clamped(self) -> Self {
        if !self.0.is_finite() {
            return self;
        }
        Self(self.0.clamp(Self::min_percent(), Self::max_percent()))
    }
}

/// A single soil measurement, immutable once acquired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub moisture: VolumetricWaterContent,
    pub temperature: Temperature,
}

impl SensorReading {
    pub const fn new(moisture_pct: f64, temperature_c: f64) -> Self {
        Self {
            moisture: VolumetricWaterContent::from_percent(moisture_pct),
            temperature: Temperature::from_degree_celsius(temperature_c),
        }
    }

    /// The reading that stands in for a failed acquisition.
    ///
    /// It never passes validation.
    pub const fn unavailable() -> Self {
        Self::new(f64::NAN, f64::NAN)
    }

    pub const fn moisture_pct(&self) -> f64 {
        self.moisture.to_percent()
    }

    pub const fn temperature_c(&self) -> f64 {
        self.temperature.to_degree_celsius()
    }

    pub fn clamped(self) -> Self {
        Self {
            moisture: self.moisture.clamped(),
            temperature: self.temperature.clamped(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.moisture.is_valid() && self.temperature.is_valid()
    }
}

/// What resumed the device from deep sleep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeEvent {
    TimerExpired,
    ButtonPressed,
}

impl fmt::Display for WakeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use WakeEvent::*;
        match self {
            TimerExpired => write!(f, "timer expired"),
            ButtonPressed => write!(f, "button pressed"),
        }
    }
}

/// Signal level of the button line that triggers an external wake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WakeLevel {
    Low,
    High,
}

/// Where the device is allowed to get its notion of time from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimeSyncMode {
    NetworkOnly,
    ServerOnly,
    Hybrid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeSource {
    None,
    Network,
    Server,
    Hybrid,
}

/// Whether the local clock may be used to timestamp a record.
///
/// Created fresh for every full cycle and never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockState {
    pub trusted: bool,
    pub source: TimeSource,
}

impl ClockState {
    pub const fn untrusted() -> Self {
        Self {
            trusted: false,
            source: TimeSource::None,
        }
    }

    pub const fn trusted(source: TimeSource) -> Self {
        Self {
            trusted: true,
            source,
        }
    }

    /// The collector stamps the record on receipt.
    pub const fn server_stamped() -> Self {
        Self {
            trusted: false,
            source: TimeSource::Server,
        }
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::untrusted()
    }
}

/// One step of a delivery attempt sequence.
///
/// `backoff_ms` is the pause that precedes this attempt, i.e. zero for
/// the first attempt and doubling from the initial backoff afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub attempt_index: u32,
    pub backoff_ms: u64,
}

impl DeliveryAttempt {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Bounded exponential backoff, restartable per delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffSchedule {
    max_attempts: u32,
    initial_backoff_ms: u64,
}

impl BackoffSchedule {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

    pub const fn new(max_attempts: u32, initial_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempts(&self) -> Attempts {
        Attempts {
            schedule: *self,
            next_index: 0,
        }
    }

    /// Sum of all pauses if every attempt fails.
    pub fn total_backoff_ms(&self) -> u64 {
        self.attempts().map(|a| a.backoff_ms).fold(0, u64::saturating_add)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INITIAL_BACKOFF_MS)
    }
}

impl IntoIterator for BackoffSchedule {
    type Item = DeliveryAttempt;
    type IntoIter = Attempts;

    fn into_iter(self) -> Self::IntoIter {
        self.attempts()
    }
}

#[derive(Clone, Debug)]
pub struct Attempts {
    schedule: BackoffSchedule,
    next_index: u32,
}

impl Iterator for Attempts {
    type Item = DeliveryAttempt;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.schedule.max_attempts {
            return None;
        }
        let attempt_index = self.next_index;
        self.next_index += 1;
        let backoff_ms = match attempt_index {
            0 => 0,
            n => self
                .schedule
                .initial_backoff_ms
                .saturating_mul(2u64.saturating_pow(n - 1)),
        };
        Some(DeliveryAttempt {
            attempt_index,
            backoff_ms,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.schedule.max_attempts.saturating_sub(self.next_index) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Attempts {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Abandoned,
}

/// States of a single wake cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Dispatching,
    FullCycle,
    ButtonCycle,
    Sleeping,
}

impl CycleState {
    pub fn can_transition_to(self, next: CycleState) -> bool {
        use CycleState::*;
        matches!(
            (self, next),
            (Idle, Dispatching)
                | (Dispatching, FullCycle)
                | (Dispatching, ButtonCycle)
                | (FullCycle, Sleeping)
                | (ButtonCycle, Sleeping)
                | (Sleeping, Idle)
        )
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CycleState::*;
        match self {
            Idle => write!(f, "idle"),
            Dispatching => write!(f, "dispatching"),
            FullCycle => write!(f, "full cycle"),
            ButtonCycle => write!(f, "button cycle"),
            Sleeping => write!(f, "sleeping"),
        }
    }
}
