//! Wake-cycle orchestration for duty-cycled soil telemetry nodes.
//!
//! A node wakes from deep sleep on a timer or a button press, measures
//! soil moisture and temperature with an SMT100 probe, shows the values
//! locally and, on timer wakes, authenticates against a collector and
//! delivers the reading with bounded retries before sleeping again.
#![cfg_attr(not(feature = "std"), no_std)]

/// The no_std enclave
pub mod core;

pub use self::core::*;

#[cfg(feature = "std")]
pub mod auth;
#[cfg(feature = "std")]
pub mod config;
#[cfg(feature = "std")]
pub mod cycle;
#[cfg(feature = "std")]
pub mod delivery;
#[cfg(feature = "std")]
pub mod platform;
#[cfg(feature = "std")]
pub mod time_sync;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "modbus-rtu")]
pub mod modbus;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(feature = "std")]
use std::{io::Error, time::Duration};

#[cfg(feature = "std")]
use async_trait::async_trait;

#[cfg(feature = "std")]
type Result<T> = std::result::Result<T, Error>;

/// Asynchronous interface that exposes the measurements of a soil
/// moisture probe.
#[cfg(feature = "std")]
#[async_trait(?Send)]
pub trait Capabilities {
    /// Measure the current temperature of the medium around the sensor.
    async fn read_temperature(&self, timeout: Option<Duration>) -> Result<Temperature>;

    /// Measure the current water content of the medium (soil) around the sensor
    /// in the range from 0% to 100%.
    async fn read_water_content(&self, timeout: Option<Duration>)
        -> Result<VolumetricWaterContent>;

    /// Measure both values. Probes that can fetch them in a single
    /// transaction should override this.
    async fn read_reading(&self, timeout: Option<Duration>) -> Result<SensorReading> {
        let temperature = self.read_temperature(timeout).await?;
        let moisture = self.read_water_content(timeout).await?;
        Ok(SensorReading {
            moisture,
            temperature,
        })
    }
}

/// Acquire a calibrated reading that is clamped into the physical bounds.
///
/// Acquisition never fails: a probe error is logged and replaced by
/// [`SensorReading::unavailable`], which the delivery gate rejects.
#[cfg(feature = "std")]
pub async fn acquire_reading<S>(sensor: &S, timeout: Option<Duration>) -> SensorReading
where
    S: Capabilities + ?Sized,
{
    match sensor.read_reading(timeout).await {
        Ok(reading) => {
            let clamped = reading.clamped();
            if clamped != reading {
                log::debug!("Clamped {:?} to {:?}", reading, clamped);
            }
            clamped
        }
        Err(err) => {
            log::warn!("Failed to read sensor: {}", err);
            SensorReading::unavailable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::Probe;
    use futures::executor::block_on;

    #[test]
    #[allow(clippy::float_cmp)]
    fn acquire_clamps_finite_values() {
        let probe = Probe::new(SensorReading::new(101.5, 90.0));
        let reading = block_on(acquire_reading(&probe, None));
        assert_eq!(100.0, reading.moisture_pct());
        assert_eq!(85.0, reading.temperature_c());
    }

    #[test]
    fn acquire_turns_errors_into_invalid_reading() {
        let probe = Probe::failing();
        let reading = block_on(acquire_reading(&probe, None));
        assert!(!reading.is_valid());
    }

    #[test]
    fn acquire_keeps_nan() {
        let probe = Probe::new(SensorReading::new(f64::NAN, 21.0));
        assert!(!block_on(acquire_reading(&probe, None)).is_valid());
    }

    #[test]
    fn acquire_keeps_infinity() {
        let probe = Probe::new(SensorReading::new(50.0, f64::INFINITY));
        let reading = block_on(acquire_reading(&probe, None));
        assert!(reading.temperature_c().is_infinite());
        assert!(!reading.is_valid());

        probe.set_reading(SensorReading::new(f64::NEG_INFINITY, 20.0));
        let reading = block_on(acquire_reading(&probe, None));
        assert!(reading.moisture_pct().is_infinite());
        assert!(!reading.is_valid());
        assert_eq!(2, probe.reads());
    }

    #[test]
    fn infinite_readings_are_never_sent() {
        use crate::{
            auth::{CredentialManager, Credentials},
            delivery::DeliveryPipeline,
            mock::{Clock, Collector, Pauses},
        };

        const DATA_URL: &str = "https://collector.test/devices/field-7/data";

        let auth = Collector::default();
        auth.respond_status("auth", 200, r#"{"token":"t0k3n"}"#);
        let token =
            block_on(CredentialManager::new(&auth, "auth").authenticate(&Credentials::new("u", "p")))
                .unwrap();

        let probe = Probe::new(SensorReading::new(50.0, 20.0));
        for reading in [
            SensorReading::new(50.0, f64::INFINITY),
            SensorReading::new(50.0, f64::NEG_INFINITY),
            SensorReading::new(f64::INFINITY, 20.0),
            SensorReading::new(f64::NEG_INFINITY, 20.0),
        ] {
            probe.set_reading(reading);
            let acquired = block_on(acquire_reading(&probe, None));

            let collector = Collector::default();
            collector.respond_status(DATA_URL, 200, "");
            let clock = Clock::never_syncing();
            let pauses = Pauses::default();
            let pipeline = DeliveryPipeline::new(
                &collector,
                &clock,
                &pauses,
                DATA_URL,
                BackoffSchedule::default(),
            );
            let outcome = block_on(pipeline.deliver(&acquired, &ClockState::untrusted(), Some(&token)));
            assert_eq!(DeliveryOutcome::Abandoned, outcome);
            assert!(collector.requests().is_empty());
        }
        assert_eq!(4, probe.reads());
    }
}
