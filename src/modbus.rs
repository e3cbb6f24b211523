//! Modbus RTU framing for the three function codes the clock protocol uses.
//!
//! A frame is `unit id | function | payload | CRC-16 (low byte first)`.
//! Requests are built whole; responses are read in two steps, first the
//! fixed header and then the rest, whose length depends on the header.

use std::time::Duration;

use crate::error::{ExceptionCode, ModbusError};

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

const EXCEPTION_FLAG: u8 = 0x80;

/// Register limits per request imposed by the 256-byte RTU frame.
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_REGISTERS: u16 = 123;

/// Bytes of a response needed before its total length is known:
/// unit id, function code, and the first payload byte.
pub const RESPONSE_HEADER_LEN: usize = 3;

/// CRC-16/MODBUS: init 0xFFFF, reflected polynomial 0xA001.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// A request the clock protocol can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    ReadHoldingRegisters { start: u16, count: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleRegisters { start: u16, values: &'a [u16] },
}

impl Request<'_> {
    pub fn function_code(&self) -> u8 {
        match self {
            Request::ReadHoldingRegisters { .. } => READ_HOLDING_REGISTERS,
            Request::WriteSingleRegister { .. } => WRITE_SINGLE_REGISTER,
            Request::WriteMultipleRegisters { .. } => WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Encodes the complete RTU frame, CRC included.
    pub fn encode(&self, unit_id: u8) -> Result<Vec<u8>, ModbusError> {
        let mut frame = vec![unit_id, self.function_code()];
        match *self {
            Request::ReadHoldingRegisters { start, count } => {
                if count == 0 || count > MAX_READ_REGISTERS {
                    return Err(ModbusError::InvalidRequest(format!(
                        "cannot read {} registers in one request",
                        count
                    )));
                }
                frame.extend_from_slice(&start.to_be_bytes());
                frame.extend_from_slice(&count.to_be_bytes());
            }
            Request::WriteSingleRegister { address, value } => {
                frame.extend_from_slice(&address.to_be_bytes());
                frame.extend_from_slice(&value.to_be_bytes());
            }
            Request::WriteMultipleRegisters { start, values } => {
                let count = values.len();
                if count == 0 || count > usize::from(MAX_WRITE_REGISTERS) {
                    return Err(ModbusError::InvalidRequest(format!(
                        "cannot write {} registers in one request",
                        count
                    )));
                }
                frame.extend_from_slice(&start.to_be_bytes());
                frame.extend_from_slice(&(count as u16).to_be_bytes());
                frame.push((count * 2) as u8);
                for value in values {
                    frame.extend_from_slice(&value.to_be_bytes());
                }
            }
        }
        Ok(with_crc(frame))
    }

    /// Total response length, given the first [`RESPONSE_HEADER_LEN`] bytes.
    pub fn response_len(&self, header: &[u8]) -> Result<usize, ModbusError> {
        if header.len() < RESPONSE_HEADER_LEN {
            return Err(ModbusError::UnexpectedResponse(format!(
                "response header is {} bytes",
                header.len()
            )));
        }
        if header[1] & EXCEPTION_FLAG != 0 {
            // unit, function, exception code, crc
            return Ok(5);
        }
        Ok(match self {
            Request::ReadHoldingRegisters { .. } => RESPONSE_HEADER_LEN + usize::from(header[2]) + 2,
            Request::WriteSingleRegister { .. } | Request::WriteMultipleRegisters { .. } => 8,
        })
    }

    /// Validates a complete response frame and returns its register values.
    ///
    /// Write responses yield an empty vector once their echo has been checked.
    pub fn parse_response(&self, unit_id: u8, frame: &[u8]) -> Result<Vec<u16>, ModbusError> {
        if frame.len() < 5 {
            return Err(ModbusError::UnexpectedResponse(format!(
                "frame of {} bytes is too short",
                frame.len()
            )));
        }
        let (body, crc_bytes) = frame.split_at(frame.len() - 2);
        let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
        let expected = crc16(body);
        if expected != received {
            return Err(ModbusError::Crc { expected, received });
        }
        if body[0] != unit_id {
            return Err(ModbusError::UnexpectedResponse(format!(
                "reply from unit {} while addressing unit {}",
                body[0], unit_id
            )));
        }

        let function = self.function_code();
        if body[1] == function | EXCEPTION_FLAG {
            return Err(ModbusError::Exception {
                function,
                code: ExceptionCode::from(body[2]),
            });
        }
        if body[1] != function {
            return Err(ModbusError::UnexpectedResponse(format!(
                "function 0x{:02X} answered with 0x{:02X}",
                function, body[1]
            )));
        }

        match *self {
            Request::ReadHoldingRegisters { count, .. } => {
                let byte_count = usize::from(body[2]);
                let data = &body[3..];
                if byte_count != usize::from(count) * 2 || data.len() != byte_count {
                    return Err(ModbusError::UnexpectedResponse(format!(
                        "expected {} data bytes, got {}",
                        usize::from(count) * 2,
                        data.len()
                    )));
                }
                Ok(data
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect())
            }
            Request::WriteSingleRegister { address, value } => {
                expect_echo(body, address, value)?;
                Ok(Vec::new())
            }
            Request::WriteMultipleRegisters { start, values } => {
                expect_echo(body, start, values.len() as u16)?;
                Ok(Vec::new())
            }
        }
    }
}

fn expect_echo(body: &[u8], first: u16, second: u16) -> Result<(), ModbusError> {
    if body.len() != 6 {
        return Err(ModbusError::UnexpectedResponse(format!(
            "write acknowledgement of {} bytes",
            body.len()
        )));
    }
    let echoed = (
        u16::from_be_bytes([body[2], body[3]]),
        u16::from_be_bytes([body[4], body[5]]),
    );
    if echoed != (first, second) {
        return Err(ModbusError::UnexpectedResponse(format!(
            "write acknowledged 0x{:04X}/{} instead of 0x{:04X}/{}",
            echoed.0, echoed.1, first, second
        )));
    }
    Ok(())
}

/// The silent interval that must separate RTU frames: 3.5 character times
/// of 11 bits, fixed at 1750us above 19200 baud.
pub fn inter_frame_delay(baud_rate: u32) -> Duration {
    if baud_rate == 0 || baud_rate > 19_200 {
        return Duration::from_micros(1_750);
    }
    Duration::from_micros(38_500_000 / u64::from(baud_rate))
}
