//! Register layout and decoding of the SMT100 Modbus interface.

use super::*;

#[cfg(feature = "rtu")]
pub mod rtu;

use core::{convert::TryInto, mem};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    InsufficientInput,
    InvalidInput,
    InvalidData,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DecodeError::*;
        match self {
            InsufficientInput => write!(f, "Insufficient input"),
            InvalidInput => write!(f, "Invalid input"),
            InvalidData => write!(f, "Invalid data"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

pub type DecodeResult<T> = Result<T, DecodeError>;

fn decode_be_u16_from_bytes(input: &[u8]) -> DecodeResult<(u16, &[u8])> {
    if input.len() < mem::size_of::<u16>() {
        return Err(DecodeError::InsufficientInput);
    }
    let (head, rest) = input.split_at(mem::size_of::<u16>());
    head.try_into()
        .map(|bytes| (u16::from_be_bytes(bytes), rest))
        .map_err(|_| DecodeError::InvalidInput)
}

/// Temperature and water content are adjacent holding registers
/// and are fetched with a single request.
pub const READING_REG_START: u16 = 0x0000;
pub const READING_REG_COUNT: u16 = 0x0002;

/// Raw temperature register, offset by 100 °C and scaled by 100.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemperatureRaw(pub u16);

impl From<TemperatureRaw> for Temperature {
    fn from(from: TemperatureRaw) -> Self {
        Self::from_degree_celsius(f64::from(i32::from(from.0) - 10000i32) / 100f64)
    }
}

/// Raw water content register in 1/100 %.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumetricWaterContentRaw(pub u16);

impl From<VolumetricWaterContentRaw> for VolumetricWaterContent {
    fn from(from: VolumetricWaterContentRaw) -> Self {
        Self::from_percent(f64::from(from.0) / 100f64)
    }
}

/// Decode the register pair starting at [`READING_REG_START`].
///
/// Water content above 100 % is what a disconnected probe reports and is
/// rejected. The temperature is passed on as measured; the acquisition
/// step decides how to bound it.
pub fn decode_reading_from_registers(regs: &[u16]) -> DecodeResult<SensorReading> {
    match *regs {
        [temperature, water_content] => {
            let moisture = VolumetricWaterContent::from(VolumetricWaterContentRaw(water_content));
            if !moisture.is_valid() {
                return Err(DecodeError::InvalidData);
            }
            Ok(SensorReading {
                moisture,
                temperature: TemperatureRaw(temperature).into(),
            })
        }
        [] | [_] => Err(DecodeError::InsufficientInput),
        _ => Err(DecodeError::InvalidInput),
    }
}

pub fn decode_reading_from_bytes(input: &[u8]) -> DecodeResult<(SensorReading, &[u8])> {
    let (temperature, rest) = decode_be_u16_from_bytes(input)?;
    let (water_content, rest) = decode_be_u16_from_bytes(rest)?;
    let reading = decode_reading_from_registers(&[temperature, water_content])?;
    Ok((reading, rest))
}
