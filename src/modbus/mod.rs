//! SMT100 probe attached via Modbus.

pub mod rtu;

use super::*;

use crate::core::modbus::{decode_reading_from_registers, READING_REG_COUNT, READING_REG_START};
use std::io::ErrorKind;
use tokio::sync::Mutex;
use tokio_modbus::{
    client::{Context, Reader},
    slave::{Slave, SlaveContext},
};

/// Proxy for a single probe on a (shared) Modbus line.
pub struct SlaveProxy {
    context: Mutex<Context>,
    slave: Slave,
}

impl SlaveProxy {
    pub fn new(context: Context, slave: Slave) -> Self {
        Self {
            context: Mutex::new(context),
            slave,
        }
    }

    pub fn slave(&self) -> Slave {
        self.slave
    }

    async fn read_reading_registers(&self, timeout: Option<Duration>) -> Result<Vec<u16>> {
        let mut context = self.context.lock().await;
        context.set_slave(self.slave);
        let request = context.read_holding_registers(READING_REG_START, READING_REG_COUNT);
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, request)
                .await
                .map_err(|_| Error::new(ErrorKind::TimedOut, "No response from probe"))?,
            None => request.await,
        }
    }
}

#[async_trait(?Send)]
impl Capabilities for SlaveProxy {
    async fn read_temperature(&self, timeout: Option<Duration>) -> Result<Temperature> {
        self.read_reading(timeout).await.map(|r| r.temperature)
    }

    async fn read_water_content(
        &self,
        timeout: Option<Duration>,
    ) -> Result<VolumetricWaterContent> {
        self.read_reading(timeout).await.map(|r| r.moisture)
    }

    async fn read_reading(&self, timeout: Option<Duration>) -> Result<SensorReading> {
        let regs = self.read_reading_registers(timeout).await?;
        log::debug!("Read registers {:04X?} from {:?}", regs, self.slave);
        decode_reading_from_registers(&regs).map_err(|err| Error::new(ErrorKind::InvalidData, err))
    }
}
