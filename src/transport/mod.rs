//! The serial Modbus link to a controller.

pub mod mock;
pub mod serial;

use std::time::Duration;

use crate::error::{ModbusError, TransportError};

pub use serial::SerialModbus;

/// Default device node of the RS-485 adapter used in the field.
pub const DEFAULT_PORT: &str = "/dev/USB232";
/// Default Modbus unit id of the generator controller.
pub const DEFAULT_UNIT_ID: u8 = 157;
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    #[default]
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    Seven,
    #[default]
    Eight,
}

/// Physical settings of the serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: DataBits,
    /// Per-call timeout for each request/response exchange.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            data_bits: DataBits::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.trim().is_empty() {
            return Err(TransportError::InvalidConfig {
                setting: "port",
                reason: "no device path given".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(TransportError::InvalidConfig {
                setting: "baud_rate",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(TransportError::InvalidConfig {
                setting: "timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// A Modbus client the executor can drive.
///
/// Implemented by [`SerialModbus`] for real hardware and by
/// [`mock::MockTransport`] for tests.
pub trait ModbusTransport {
    /// Opens the link. Calling this on an open link reopens it.
    fn connect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Function code 0x10.
    fn write_multiple_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        values: &[u16],
    ) -> Result<(), ModbusError>;

    /// Function code 0x06.
    fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ModbusError>;

    /// Function code 0x03.
    fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    /// Releases the link. Safe to call when already closed.
    fn close(&mut self);
}

impl<T: ModbusTransport + ?Sized> ModbusTransport for Box<T> {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn write_multiple_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        values: &[u16],
    ) -> Result<(), ModbusError> {
        (**self).write_multiple_registers(unit_id, start, values)
    }

    fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ModbusError> {
        (**self).write_single_register(unit_id, address, value)
    }

    fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        (**self).read_holding_registers(unit_id, start, count)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_field_adapter() {
        let config = SerialConfig::default();
        assert_eq!(config.port, "/dev/USB232");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let config = SerialConfig {
            baud_rate: 0,
            ..SerialConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TransportError::InvalidConfig { setting: "baud_rate", .. })
        ));

        let config = SerialConfig {
            timeout: Duration::ZERO,
            ..SerialConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SerialConfig {
            port: " ".to_string(),
            ..SerialConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
