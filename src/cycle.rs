//! The wake cycle state machine.
//!
//! Every power-on runs exactly one cycle from `Idle` to `Sleeping`. A
//! button wake only measures and displays; any other wake runs the full
//! telemetry cycle. Both branches end by arming the button and the timer
//! as wake sources before handing over to the power manager.

use std::time::Duration;

use crate::{
    acquire_reading,
    auth::{AuthToken, CredentialManager, Credentials},
    config::Config,
    core::{ClockState, CycleState, DeliveryOutcome, SensorReading, WakeEvent},
    delivery::DeliveryPipeline,
    platform::{Delay, Network, PowerManager, ReadingDisplay, TimeService, Transport},
    time_sync::TimeReconciler,
    Capabilities,
};

/// The board capabilities a cycle runs on.
#[derive(Clone, Copy)]
pub struct Peripherals<'a> {
    pub sensor: &'a dyn Capabilities,
    pub display: &'a dyn ReadingDisplay,
    pub network: &'a dyn Network,
    pub transport: &'a dyn Transport,
    pub time: &'a dyn TimeService,
    pub power: &'a dyn PowerManager,
    pub delay: &'a dyn Delay,
}

/// Volatile state of a full cycle. It is created after the wake and
/// dropped before the node sleeps, nothing in here survives.
#[derive(Debug)]
pub struct CycleContext {
    pub wake: WakeEvent,
    pub clock: ClockState,
    pub token: Option<AuthToken>,
}

/// What happened during a cycle, for hosts and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub wake: WakeEvent,
    pub states: Vec<CycleState>,
    pub reading: SensorReading,
    pub clock: Option<ClockState>,
    pub authenticated: bool,
    pub delivery: Option<DeliveryOutcome>,
    pub sleep_interval: Duration,
}

pub struct WakeCycle<'a> {
    config: &'a Config,
    peripherals: Peripherals<'a>,
    states: Vec<CycleState>,
}

impl<'a> WakeCycle<'a> {
    pub fn new(config: &'a Config, peripherals: Peripherals<'a>) -> Self {
        Self {
            config,
            peripherals,
            states: vec![CycleState::Idle],
        }
    }

    pub fn state(&self) -> CycleState {
        self.states.last().copied().unwrap_or(CycleState::Idle)
    }

    fn transition(&mut self, next: CycleState) {
        let current = self.state();
        debug_assert!(
            current.can_transition_to(next),
            "invalid transition {} -> {}",
            current,
            next
        );
        log::info!("{} -> {}", current, next);
        self.states.push(next);
    }

    /// Run the cycle for the wake cause reported by the power manager.
    pub async fn wake(self) -> CycleReport {
        let wake = self.peripherals.power.wake_cause();
        self.run(wake).await
    }

    /// Run one cycle and put the node to sleep.
    ///
    /// On a device the final deep sleep does not return and the report
    /// is never observed.
    pub async fn run(mut self, wake: WakeEvent) -> CycleReport {
        log::info!("Woken up: {}", wake);
        self.transition(CycleState::Dispatching);
        let mut report = match wake {
            WakeEvent::ButtonPressed => {
                self.transition(CycleState::ButtonCycle);
                self.button_cycle(wake).await
            }
            WakeEvent::TimerExpired => {
                self.transition(CycleState::FullCycle);
                self.full_cycle(wake).await
            }
        };
        report.sleep_interval = self.sleep();
        report.states = self.states;
        report
    }

    async fn measure(&self) -> SensorReading {
        let Peripherals {
            sensor, display, ..
        } = self.peripherals;
        let reading = acquire_reading(sensor, Some(self.config.sensor_timeout())).await;
        log::info!(
            "Soil moisture: {:.1} %, temperature: {:.1} °C",
            reading.moisture_pct(),
            reading.temperature_c()
        );
        display.render(reading.moisture_pct(), reading.temperature_c());
        reading
    }

    async fn button_cycle(&self, wake: WakeEvent) -> CycleReport {
        let reading = self.measure().await;
        self.peripherals
            .delay
            .pause(self.config.display_hold())
            .await;
        CycleReport {
            wake,
            states: Vec::new(),
            reading,
            clock: None,
            authenticated: false,
            delivery: None,
            sleep_interval: Duration::ZERO,
        }
    }

    async fn full_cycle(&self, wake: WakeEvent) -> CycleReport {
        let config = self.config;
        let Peripherals {
            network,
            transport,
            time,
            delay,
            ..
        } = self.peripherals;

        log::info!("Connecting to {}", config.wifi_ssid);
        match network
            .connect(
                &config.wifi_ssid,
                &config.wifi_password,
                config.connect_timeout(),
            )
            .await
        {
            Ok(()) => log::info!("Connected"),
            Err(err) => log::warn!("Failed to connect: {}", err),
        }

        let clock = TimeReconciler::new(
            time,
            delay,
            &config.ntp_server,
            config.time_sync_timeout(),
            config.time_sync_poll(),
        )
        .reconcile(config.time_sync_mode)
        .await;

        let credentials = Credentials::new(config.username.as_str(), config.password.as_str());
        let token = match CredentialManager::new(transport, &config.auth_url)
            .authenticate(&credentials)
            .await
        {
            Ok(token) => Some(token),
            Err(err) => {
                log::warn!("Authentication failed: {}", err);
                None
            }
        };
        let context = CycleContext { wake, clock, token };

        let reading = self.measure().await;

        let data_url = config.data_endpoint();
        let outcome = DeliveryPipeline::new(
            transport,
            time,
            delay,
            &data_url,
            config.backoff_schedule(),
        )
        .deliver(&reading, &context.clock, context.token.as_ref())
        .await;

        CycleReport {
            wake: context.wake,
            states: Vec::new(),
            reading,
            clock: Some(context.clock),
            authenticated: context.token.is_some(),
            delivery: Some(outcome),
            sleep_interval: Duration::ZERO,
        }
    }

    /// Arm both wake sources and enter deep sleep.
    fn sleep(&mut self) -> Duration {
        let power = self.peripherals.power;
        let interval = self.config.sleep_interval();
        power.arm_external_wake(self.config.button_wake_level);
        power.arm_timer_wake(interval);
        log::info!(
            "Sleeping for {} s (button wake on {:?} level)",
            interval.as_secs(),
            self.config.button_wake_level
        );
        self.transition(CycleState::Sleeping);
        power.enter_deep_sleep();
        interval
    }
}
