//! Error and warning types for clock synchronization.
//!
//! Encoding and connection errors abort a run before any register is
//! written. Everything that goes wrong after the link is open is reported
//! through [`Warning`] and lowers the confidence of the final status instead.

use std::io;

use thiserror::Error;

use crate::profile::Field;

/// A calendar field fell outside the range a controller register can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{field} value {value} is outside the encodable range {min}..={max}")]
pub struct EncodingRangeError {
    pub field: Field,
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

/// The transaction could not be started. Fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The port could not be opened or configured.
    #[error("failed to open serial port `{port}`: {reason}")]
    Open { port: String, reason: String },
    /// The link settings were rejected before opening.
    #[error("invalid serial setting {setting}: {reason}")]
    InvalidConfig { setting: &'static str, reason: String },
    /// The frame does not cover the profile's clock registers exactly.
    #[error("{profile} clock block is {expected} registers, frame has {actual}")]
    FrameSize {
        profile: &'static str,
        expected: u16,
        actual: usize,
    },
}

/// Modbus exception codes returned by a slave in place of a normal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    Other(u8),
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::SlaveDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::SlaveDeviceBusy,
            other => ExceptionCode::Other(other),
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExceptionCode::IllegalFunction => write!(f, "illegal function"),
            ExceptionCode::IllegalDataAddress => write!(f, "illegal data address"),
            ExceptionCode::IllegalDataValue => write!(f, "illegal data value"),
            ExceptionCode::SlaveDeviceFailure => write!(f, "slave device failure"),
            ExceptionCode::Acknowledge => write!(f, "acknowledge"),
            ExceptionCode::SlaveDeviceBusy => write!(f, "slave device busy"),
            ExceptionCode::Other(code) => write!(f, "exception 0x{:02X}", code),
        }
    }
}

/// A single Modbus transaction failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModbusError {
    /// The link is not open.
    #[error("serial link is not connected")]
    NotConnected,
    /// No complete response arrived within the per-call timeout.
    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// The port reported an I/O failure.
    #[error("serial I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },
    /// The response checksum did not match its contents.
    #[error("CRC mismatch: computed 0x{expected:04X}, received 0x{received:04X}")]
    Crc { expected: u16, received: u16 },
    /// The slave answered with an exception response.
    #[error("function 0x{function:02X} rejected: {code}")]
    Exception { function: u8, code: ExceptionCode },
    /// The response was well-formed but did not answer the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    /// The request itself cannot be expressed as one Modbus frame.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ModbusError {
    /// Maps a port I/O error, folding read timeouts into [`ModbusError::Timeout`].
    pub fn from_io(error: &io::Error, timeout_ms: u64) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                ModbusError::Timeout { timeout_ms }
            }
            kind => ModbusError::Io {
                kind,
                message: error.to_string(),
            },
        }
    }
}

/// A non-fatal problem recorded while writing or verifying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Warning {
    /// The write transaction errored; the controller may still have applied it.
    #[error("write at 0x{address:04X} did not complete cleanly: {error}")]
    Write { address: u16, error: ModbusError },
    /// Reopening the link before read-back failed, so nothing was read.
    #[error("reopening the link before read-back failed: {0}")]
    Reopen(TransportError),
    /// Every read-back attempt failed.
    #[error("read-back failed after {attempts} attempts: {last_error}")]
    ReadRetryExhausted { attempts: u32, last_error: ModbusError },
}

/// Errors that abort a synchronization run before any register is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Encoding(#[from] EncodingRangeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
