//! Reconciliation of the local clock with a network time service.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{
    core::{ClockState, TimeSource, TimeSyncMode},
    platform::{Delay, TimeService},
};

/// An unsynchronized clock starts at the epoch. Anything later than
/// 16 hours past the epoch must have come from a time service.
pub const SANE_EPOCH_SECS: i64 = 8 * 3600 * 2;

pub fn is_plausible(now: DateTime<Utc>) -> bool {
    now.timestamp() > SANE_EPOCH_SECS
}

pub struct TimeReconciler<'a> {
    time: &'a dyn TimeService,
    delay: &'a dyn Delay,
    server: &'a str,
    timeout: Duration,
    poll_interval: Duration,
}

impl<'a> TimeReconciler<'a> {
    pub fn new(
        time: &'a dyn TimeService,
        delay: &'a dyn Delay,
        server: &'a str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            time,
            delay,
            server,
            timeout,
            poll_interval,
        }
    }

    /// Establish how far the local clock can be trusted in this cycle.
    ///
    /// Never fails, a failed sync only downgrades trust.
    pub async fn reconcile(&self, mode: TimeSyncMode) -> ClockState {
        let clock = match mode {
            TimeSyncMode::NetworkOnly => {
                if self.sync_network_time().await {
                    ClockState::trusted(TimeSource::Network)
                } else {
                    ClockState::untrusted()
                }
            }
            TimeSyncMode::ServerOnly => ClockState::server_stamped(),
            TimeSyncMode::Hybrid => {
                if self.sync_network_time().await {
                    ClockState::trusted(TimeSource::Hybrid)
                } else {
                    log::info!("Falling back to server-side timestamps");
                    ClockState::server_stamped()
                }
            }
        };
        log::info!(
            "Clock {} (source: {:?}, mode: {:?})",
            if clock.trusted { "trusted" } else { "untrusted" },
            clock.source,
            mode
        );
        clock
    }

    /// Poll the local clock until it shows a plausible time or the
    /// timeout has been used up.
    async fn sync_network_time(&self) -> bool {
        log::info!("Synchronizing time with {}", self.server);
        self.time.request_sync(self.server).await;
        let mut waited = Duration::ZERO;
        loop {
            let now = self.time.now();
            if is_plausible(now) {
                log::info!("Time synchronized after {:?}: {}", waited, now);
                return true;
            }
            if waited >= self.timeout || self.poll_interval.is_zero() {
                log::warn!("Time synchronization timed out after {:?}", waited);
                return false;
            }
            let pause = self.poll_interval.min(self.timeout - waited);
            self.delay.pause(pause).await;
            waited += pause;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Clock, Pauses};
    use chrono::TimeZone;
    use futures::executor::block_on;

    const TIMEOUT: Duration = Duration::from_secs(10);
    const POLL: Duration = Duration::from_millis(500);

    fn synced_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 6, 30, 0).unwrap()
    }

    fn reconcile(clock: &Clock, pauses: &Pauses, mode: TimeSyncMode) -> ClockState {
        block_on(TimeReconciler::new(clock, pauses, "pool.ntp.org", TIMEOUT, POLL).reconcile(mode))
    }

    #[test]
    fn plausibility_threshold() {
        assert!(!is_plausible(Utc.timestamp_opt(0, 0).unwrap()));
        assert!(!is_plausible(Utc.timestamp_opt(SANE_EPOCH_SECS, 0).unwrap()));
        assert!(is_plausible(Utc.timestamp_opt(SANE_EPOCH_SECS + 1, 0).unwrap()));
    }

    #[test]
    fn network_only_trusts_synced_clock() {
        let clock = Clock::syncing_after(3, synced_time());
        let pauses = Pauses::default();
        let state = reconcile(&clock, &pauses, TimeSyncMode::NetworkOnly);
        assert_eq!(ClockState::trusted(TimeSource::Network), state);
        assert!(clock.sync_requested());
        assert_eq!(vec![POLL; 3], pauses.recorded());
    }

    #[test]
    fn network_only_timeout_is_bounded() {
        let clock = Clock::never_syncing();
        let pauses = Pauses::default();
        let state = reconcile(&clock, &pauses, TimeSyncMode::NetworkOnly);
        assert_eq!(ClockState::untrusted(), state);
        assert_eq!(TIMEOUT, pauses.total());
        assert_eq!(21, clock.polls());
    }

    #[test]
    fn uneven_poll_interval_stays_within_timeout() {
        let clock = Clock::never_syncing();
        let pauses = Pauses::default();
        let reconciler = TimeReconciler::new(
            &clock,
            &pauses,
            "pool.ntp.org",
            Duration::from_millis(1000),
            Duration::from_millis(600),
        );
        let state = block_on(reconciler.reconcile(TimeSyncMode::NetworkOnly));
        assert_eq!(ClockState::untrusted(), state);
        assert_eq!(
            vec![Duration::from_millis(600), Duration::from_millis(400)],
            pauses.recorded()
        );
        assert_eq!(Duration::from_millis(1000), pauses.total());
    }

    #[test]
    fn clock_synced_at_the_deadline_is_trusted() {
        // Third poll happens exactly at the timeout
        let clock = Clock::syncing_after(2, synced_time());
        let pauses = Pauses::default();
        let reconciler = TimeReconciler::new(
            &clock,
            &pauses,
            "pool.ntp.org",
            Duration::from_millis(1000),
            Duration::from_millis(600),
        );
        let state = block_on(reconciler.reconcile(TimeSyncMode::NetworkOnly));
        assert_eq!(ClockState::trusted(TimeSource::Network), state);
        assert_eq!(Duration::from_millis(1000), pauses.total());
    }

    #[test]
    fn server_only_never_queries_network_time() {
        let clock = Clock::syncing_after(0, synced_time());
        let pauses = Pauses::default();
        let state = reconcile(&clock, &pauses, TimeSyncMode::ServerOnly);
        assert!(!state.trusted);
        assert_eq!(TimeSource::Server, state.source);
        assert!(!clock.sync_requested());
        assert!(pauses.recorded().is_empty());
    }

    #[test]
    fn hybrid_falls_back_to_server() {
        let clock = Clock::never_syncing();
        let pauses = Pauses::default();
        let state = reconcile(&clock, &pauses, TimeSyncMode::Hybrid);
        assert_eq!(ClockState::server_stamped(), state);
        assert_eq!(TIMEOUT, pauses.total());
    }

    #[test]
    fn hybrid_prefers_network_time() {
        let clock = Clock::syncing_after(0, synced_time());
        let pauses = Pauses::default();
        let state = reconcile(&clock, &pauses, TimeSyncMode::Hybrid);
        assert_eq!(ClockState::trusted(TimeSource::Hybrid), state);
        assert!(pauses.recorded().is_empty());
    }
}
