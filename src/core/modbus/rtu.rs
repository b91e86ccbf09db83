//! Serial line settings of the SMT100 RTU variant (9600 8E1).

pub const BAUD_RATE: u32 = 9600;
pub const DATA_BITS: u8 = 8;
pub const STOP_BITS: u8 = 1;
pub const EVEN_PARITY: bool = true;
