//! Modbus RTU over a local serial port.

use std::io::{Read, Write};

use log::{debug, trace};
use serialport::{ClearBuffer, SerialPort};

use super::{DataBits, ModbusTransport, Parity, SerialConfig, StopBits};
use crate::error::{ModbusError, TransportError};
use crate::modbus::{inter_frame_delay, Request, RESPONSE_HEADER_LEN};

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(stop_bits: StopBits) -> Self {
        match stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(data_bits: DataBits) -> Self {
        match data_bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|port| port.port_name).collect())
        .map_err(|e| TransportError::Open {
            port: "*".to_string(),
            reason: format!("could not enumerate serial ports: {}", e),
        })
}

/// A Modbus RTU master on one serial port.
pub struct SerialModbus {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialModbus {
    pub fn new(config: SerialConfig) -> Self {
        Self { config, port: None }
    }

    fn timeout_ms(&self) -> u64 {
        self.config.timeout.as_millis() as u64
    }

    /// Sends one request and returns the register values of its response.
    fn transact(&mut self, unit_id: u8, request: &Request<'_>) -> Result<Vec<u16>, ModbusError> {
        let frame = request.encode(unit_id)?;
        let timeout_ms = self.timeout_ms();
        let gap = inter_frame_delay(self.config.baud_rate);
        let port = self.port.as_mut().ok_or(ModbusError::NotConnected)?;
        let io_err = |e: std::io::Error| ModbusError::from_io(&e, timeout_ms);

        // A late reply to an earlier timed-out request must not be taken
        // for the answer to this one.
        if let Err(e) = port.clear(ClearBuffer::Input) {
            debug!("event=clear_input status=error error=\"{}\"", e);
        }
        std::thread::sleep(gap);

        trace!("event=tx unit={} bytes={:02X?}", unit_id, frame);
        port.write_all(&frame).map_err(io_err)?;
        port.flush().map_err(io_err)?;

        let mut response = vec![0u8; RESPONSE_HEADER_LEN];
        port.read_exact(&mut response).map_err(io_err)?;
        let total = request.response_len(&response)?;
        response.resize(total, 0);
        port.read_exact(&mut response[RESPONSE_HEADER_LEN..])
            .map_err(io_err)?;
        trace!("event=rx unit={} bytes={:02X?}", unit_id, response);

        request.parse_response(unit_id, &response)
    }
}

impl ModbusTransport for SerialModbus {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.config.validate()?;
        self.close();

        let port = serialport::new(self.config.port.as_str(), self.config.baud_rate)
            .parity(self.config.parity.into())
            .stop_bits(self.config.stop_bits.into())
            .data_bits(self.config.data_bits.into())
            .timeout(self.config.timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: self.config.port.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "event=serial_open port={} baud={} parity={:?} stop_bits={:?} data_bits={:?} timeout_ms={}",
            self.config.port,
            self.config.baud_rate,
            self.config.parity,
            self.config.stop_bits,
            self.config.data_bits,
            self.timeout_ms()
        );
        self.port = Some(port);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn write_multiple_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        values: &[u16],
    ) -> Result<(), ModbusError> {
        self.transact(unit_id, &Request::WriteMultipleRegisters { start, values })
            .map(|_| ())
    }

    fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ModbusError> {
        self.transact(unit_id, &Request::WriteSingleRegister { address, value })
            .map(|_| ())
    }

    fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.transact(unit_id, &Request::ReadHoldingRegisters { start, count })
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("event=serial_close port={}", self.config.port);
        }
    }
}

impl Drop for SerialModbus {
    fn drop(&mut self) {
        self.close();
    }
}
