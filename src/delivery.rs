//! Validated delivery of a reading with bounded retries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    auth::AuthToken,
    core::{BackoffSchedule, ClockState, DeliveryOutcome, SensorReading},
    platform::{Delay, TimeService, Transport},
};

/// ISO-8601 in UTC with second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Serialize)]
struct TelemetryPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    soil_moisture: f64,
    temperature: f64,
}

/// Serialize a reading, the timestamp is only present if given.
pub fn telemetry_payload(
    reading: &SensorReading,
    timestamp: Option<DateTime<Utc>>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&TelemetryPayload {
        timestamp: timestamp.map(|ts| ts.format(TIMESTAMP_FORMAT).to_string()),
        soil_moisture: reading.moisture_pct(),
        temperature: reading.temperature_c(),
    })
}

/// The collector acknowledges a stored record with either status.
fn is_accepted(status: u16) -> bool {
    matches!(status, 200 | 201)
}

pub struct DeliveryPipeline<'a> {
    transport: &'a dyn Transport,
    time: &'a dyn TimeService,
    delay: &'a dyn Delay,
    data_url: &'a str,
    schedule: BackoffSchedule,
}

impl<'a> DeliveryPipeline<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        time: &'a dyn TimeService,
        delay: &'a dyn Delay,
        data_url: &'a str,
        schedule: BackoffSchedule,
    ) -> Self {
        Self {
            transport,
            time,
            delay,
            data_url,
            schedule,
        }
    }

    /// Deliver a reading to the collector.
    ///
    /// Invalid readings and missing tokens are abandoned without any
    /// network call. Otherwise every attempt of the backoff schedule
    /// issues exactly one POST until the collector accepts the record.
    pub async fn deliver(
        &self,
        reading: &SensorReading,
        clock: &ClockState,
        token: Option<&AuthToken>,
    ) -> DeliveryOutcome {
        if !reading.is_valid() {
            log::warn!("Not sending out of bounds reading {:?}", reading);
            return DeliveryOutcome::Abandoned;
        }
        let token = match token {
            Some(token) => token,
            None => {
                log::warn!("Not sending without authentication token");
                return DeliveryOutcome::Abandoned;
            }
        };
        let max_attempts = self.schedule.max_attempts();
        for attempt in self.schedule.attempts() {
            if attempt.backoff_ms > 0 {
                log::info!("Retrying in {} ms", attempt.backoff_ms);
                self.delay.pause(attempt.backoff()).await;
            }
            let number = attempt.attempt_index + 1;
            let timestamp = if clock.trusted {
                Some(self.time.now())
            } else {
                None
            };
            let body = match telemetry_payload(reading, timestamp) {
                Ok(body) => body,
                Err(err) => {
                    log::error!("Failed to serialize {:?}: {}", reading, err);
                    return DeliveryOutcome::Abandoned;
                }
            };
            log::debug!("Sending {}", body);
            match self
                .transport
                .post_json(self.data_url, &body, Some(token.value()))
                .await
            {
                Ok(response) if is_accepted(response.status) => {
                    log::info!(
                        "Data sent (attempt {}/{}, status {})",
                        number,
                        max_attempts,
                        response.status
                    );
                    return DeliveryOutcome::Sent;
                }
                Ok(response) => {
                    log::warn!(
                        "Attempt {}/{} failed with status {}: {}",
                        number,
                        max_attempts,
                        response.status,
                        response.body
                    );
                }
                Err(err) => {
                    log::warn!("Attempt {}/{} failed: {}", number, max_attempts, err);
                }
            }
        }
        log::error!("Giving up after {} attempts", max_attempts);
        DeliveryOutcome::Abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{CredentialManager, Credentials},
        core::TimeSource,
        mock::{Clock, Collector, Pauses},
        platform::TransportError,
    };
    use chrono::TimeZone;
    use futures::executor::block_on;
    use std::time::Duration;

    const DATA_URL: &str = "https://collector.test/devices/field-7/data";

    fn token() -> AuthToken {
        let collector = Collector::default();
        collector.respond_status("auth", 200, r#"{"token":"t0k3n"}"#);
        block_on(CredentialManager::new(&collector, "auth").authenticate(&Credentials::new("u", "p")))
            .unwrap()
    }

    fn clock() -> Clock {
        Clock::fixed(Utc.with_ymd_and_hms(2024, 5, 17, 6, 30, 0).unwrap())
    }

    fn deliver(
        collector: &Collector,
        pauses: &Pauses,
        reading: SensorReading,
        clock_state: ClockState,
        token: Option<&AuthToken>,
    ) -> DeliveryOutcome {
        let clock = clock();
        let pipeline =
            DeliveryPipeline::new(collector, &clock, pauses, DATA_URL, BackoffSchedule::default());
        block_on(pipeline.deliver(&reading, &clock_state, token))
    }

    #[test]
    fn first_attempt_success() {
        let collector = Collector::default();
        collector.respond_status(DATA_URL, 201, "");
        let pauses = Pauses::default();
        let token = token();
        let outcome = deliver(
            &collector,
            &pauses,
            SensorReading::new(45.2, 22.8),
            ClockState::trusted(TimeSource::Network),
            Some(&token),
        );
        assert_eq!(DeliveryOutcome::Sent, outcome);
        let requests = collector.requests();
        assert_eq!(1, requests.len());
        assert_eq!(Some("t0k3n".to_owned()), requests[0].bearer);
        assert_eq!(
            r#"{"timestamp":"2024-05-17T06:30:00Z","soil_moisture":45.2,"temperature":22.8}"#,
            requests[0].body
        );
        assert!(pauses.recorded().is_empty());
    }

    #[test]
    fn exhaust_retries_with_backoff() {
        let collector = Collector::default();
        collector
            .respond_status(DATA_URL, 500, "internal error")
            .respond(DATA_URL, Err(TransportError::Timeout("read".to_owned())))
            .respond_status(DATA_URL, 503, "");
        let pauses = Pauses::default();
        let token = token();
        let outcome = deliver(
            &collector,
            &pauses,
            SensorReading::new(45.2, 22.8),
            ClockState::untrusted(),
            Some(&token),
        );
        assert_eq!(DeliveryOutcome::Abandoned, outcome);
        assert_eq!(3, collector.requests().len());
        assert_eq!(
            vec![Duration::from_millis(1000), Duration::from_millis(2000)],
            pauses.recorded()
        );
        assert!(pauses.total() >= Duration::from_millis(3000));
    }

    #[test]
    fn retry_until_accepted() {
        let collector = Collector::default();
        collector
            .respond_status(DATA_URL, 502, "")
            .respond_status(DATA_URL, 200, "");
        let pauses = Pauses::default();
        let token = token();
        let outcome = deliver(
            &collector,
            &pauses,
            SensorReading::new(12.0, 4.5),
            ClockState::untrusted(),
            Some(&token),
        );
        assert_eq!(DeliveryOutcome::Sent, outcome);
        assert_eq!(2, collector.requests().len());
        assert_eq!(vec![Duration::from_millis(1000)], pauses.recorded());
    }

    #[test]
    fn other_success_statuses_are_not_accepted() {
        let collector = Collector::default();
        for _ in 0..3 {
            collector.respond_status(DATA_URL, 204, "");
        }
        let pauses = Pauses::default();
        let token = token();
        let outcome = deliver(
            &collector,
            &pauses,
            SensorReading::new(12.0, 4.5),
            ClockState::untrusted(),
            Some(&token),
        );
        assert_eq!(DeliveryOutcome::Abandoned, outcome);
        assert_eq!(3, collector.requests().len());
    }

    #[test]
    fn invalid_readings_are_never_sent() {
        let token = token();
        for reading in [
            SensorReading::new(100.5, 20.0),
            SensorReading::new(-0.1, 20.0),
            SensorReading::new(50.0, 85.5),
            SensorReading::new(50.0, -41.0),
            SensorReading::new(f64::NAN, 20.0),
            SensorReading::new(50.0, f64::INFINITY),
            SensorReading::unavailable(),
        ] {
            let collector = Collector::default();
            collector.respond_status(DATA_URL, 200, "");
            let pauses = Pauses::default();
            let outcome = deliver(
                &collector,
                &pauses,
                reading,
                ClockState::untrusted(),
                Some(&token),
            );
            assert_eq!(DeliveryOutcome::Abandoned, outcome);
            assert!(collector.requests().is_empty());
            assert!(pauses.recorded().is_empty());
        }
    }

    #[test]
    fn boundary_readings_are_sent() {
        let token = token();
        for reading in [SensorReading::new(0.0, -40.0), SensorReading::new(100.0, 85.0)] {
            let collector = Collector::default();
            collector.respond_status(DATA_URL, 200, "");
            let outcome = deliver(
                &collector,
                &Pauses::default(),
                reading,
                ClockState::untrusted(),
                Some(&token),
            );
            assert_eq!(DeliveryOutcome::Sent, outcome);
            assert_eq!(1, collector.requests().len());
        }
    }

    #[test]
    fn missing_token_short_circuits() {
        for reading in [SensorReading::new(45.2, 22.8), SensorReading::unavailable()] {
            let collector = Collector::default();
            collector.respond_status(DATA_URL, 200, "");
            let pauses = Pauses::default();
            let outcome = deliver(&collector, &pauses, reading, ClockState::untrusted(), None);
            assert_eq!(DeliveryOutcome::Abandoned, outcome);
            assert!(collector.requests().is_empty());
            assert!(pauses.recorded().is_empty());
        }
    }

    #[test]
    fn untrusted_clock_omits_timestamp() {
        let collector = Collector::default();
        collector.respond_status(DATA_URL, 200, "");
        let token = token();
        deliver(
            &collector,
            &Pauses::default(),
            SensorReading::new(45.2, 22.8),
            ClockState::server_stamped(),
            Some(&token),
        );
        assert_eq!(
            r#"{"soil_moisture":45.2,"temperature":22.8}"#,
            collector.requests()[0].body
        );
    }

    #[test]
    fn payload_shape() {
        let ts = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let json = telemetry_payload(&SensorReading::new(0.0, -12.5), Some(ts)).unwrap();
        assert_eq!(
            r#"{"timestamp":"2023-12-31T23:59:59Z","soil_moisture":0.0,"temperature":-12.5}"#,
            json
        );
    }
}
