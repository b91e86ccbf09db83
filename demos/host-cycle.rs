//! Run a single wake cycle on a host against a real collector.
//!
//! Usage: `cargo run --example host-cycle -- [timer|button] [config.json]`
//!
//! The probe is simulated, the display and the power manager only log.

use async_trait::async_trait;
use env_logger::Builder as LoggerBuilder;
use std::{env, io, time::Duration};

use smt100_telemetry::{
    config::Config,
    cycle::{Peripherals, WakeCycle},
    http::HttpTransport,
    platform::{
        Network, NetworkError, PowerManager, ReadingDisplay, SystemClock, TokioDelay,
    },
    Capabilities, Temperature, VolumetricWaterContent, WakeEvent, WakeLevel,
};

struct SimulatedProbe {
    moisture_pct: f64,
    temperature_c: f64,
}

#[async_trait(?Send)]
impl Capabilities for SimulatedProbe {
    async fn read_temperature(&self, _timeout: Option<Duration>) -> io::Result<Temperature> {
        Ok(Temperature::from_degree_celsius(self.temperature_c))
    }

    async fn read_water_content(
        &self,
        _timeout: Option<Duration>,
    ) -> io::Result<VolumetricWaterContent> {
        Ok(VolumetricWaterContent::from_percent(self.moisture_pct))
    }
}

struct LogDisplay;

impl ReadingDisplay for LogDisplay {
    fn render(&self, moisture_pct: f64, temperature_c: f64) {
        log::info!("[display] {:.1} % | {:.1} °C", moisture_pct, temperature_c);
    }
}

/// The host is always online.
struct HostNetwork;

#[async_trait(?Send)]
impl Network for HostNetwork {
    async fn connect(
        &self,
        _ssid: &str,
        _password: &str,
        _timeout: Duration,
    ) -> Result<(), NetworkError> {
        Ok(())
    }
}

struct HostPower {
    wake_cause: WakeEvent,
}

impl PowerManager for HostPower {
    fn wake_cause(&self) -> WakeEvent {
        self.wake_cause
    }

    fn arm_external_wake(&self, level: WakeLevel) {
        log::info!("[power] external wake armed on {:?} level", level);
    }

    fn arm_timer_wake(&self, after: Duration) {
        log::info!("[power] timer wake armed in {:?}", after);
    }

    fn enter_deep_sleep(&self) {
        log::info!("[power] deep sleep");
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut logger_builder = LoggerBuilder::new();
    logger_builder.filter_level(log::LevelFilter::Info);
    if let Ok(rust_log_var) = env::var("RUST_LOG") {
        logger_builder.parse_filters(&rust_log_var);
    }
    logger_builder.init();

    let mut args = env::args().skip(1);
    let wake_cause = match args.next().as_deref() {
        Some("button") => WakeEvent::ButtonPressed,
        _ => WakeEvent::TimerExpired,
    };
    let config = match args.next() {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    log::info!("{:?}", config);

    let probe = SimulatedProbe {
        moisture_pct: env_f64("SIM_MOISTURE", 45.2),
        temperature_c: env_f64("SIM_TEMPERATURE", 22.8),
    };
    let transport = HttpTransport::new(config.request_timeout())?;
    let power = HostPower { wake_cause };
    let peripherals = Peripherals {
        sensor: &probe,
        display: &LogDisplay,
        network: &HostNetwork,
        transport: &transport,
        time: &SystemClock,
        power: &power,
        delay: &TokioDelay,
    };

    let report = WakeCycle::new(&config, peripherals).wake().await;
    log::info!("{:?}", report);
    Ok(())
}
