use super::*;

use crate::core::modbus::rtu::*;

use std::path::Path;
use tokio_modbus::client::rtu::attach_slave;
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};

pub fn serial_port_builder(path: &str) -> tokio_serial::SerialPortBuilder {
    debug_assert_eq!(8, DATA_BITS);
    debug_assert_eq!(1, STOP_BITS);
    tokio_serial::new(path, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(if EVEN_PARITY { Parity::Even } else { Parity::None })
}

/// Open the serial port and attach a proxy for `slave`.
pub fn connect_path(path: impl AsRef<Path>, slave: Slave) -> Result<SlaveProxy> {
    let path = path.as_ref().to_string_lossy();
    log::info!("Connecting to serial port {}", path);
    let serial = SerialStream::open(&serial_port_builder(&path))?;
    Ok(SlaveProxy::new(attach_slave(serial, slave), slave))
}
