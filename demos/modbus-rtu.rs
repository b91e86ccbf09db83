//! Periodically measure with an SMT100 probe on a serial line.
//!
//! Usage: `cargo run --example modbus-rtu --features modbus-rtu -- [/dev/ttyUSB0]`

use env_logger::Builder as LoggerBuilder;
use std::{env, time::Duration};
use tokio_modbus::slave::Slave;

use smt100_telemetry::{acquire_reading, modbus};

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let mut logger_builder = LoggerBuilder::new();
    logger_builder.filter_level(log::LevelFilter::Info);
    if let Ok(rust_log_var) = env::var("RUST_LOG") {
        logger_builder.parse_filters(&rust_log_var);
    }
    logger_builder.init();

    let tty_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_owned());
    let cycle_time = Duration::from_millis(1000);
    let timeout = Duration::from_millis(500);

    let proxy = modbus::rtu::connect_path(&tty_path, Slave::min_device())?;
    log::info!("Created Modbus slave proxy for {:?}", proxy.slave());

    loop {
        let reading = acquire_reading(&proxy, Some(timeout)).await;
        if reading.is_valid() {
            log::info!("{:?}", reading);
        } else {
            log::warn!("No valid reading from {:?} on {}", proxy.slave(), tty_path);
        }
        tokio::time::sleep(cycle_time).await;
    }
}
