//! In-memory controller for exercising the executor without hardware.
//!
//! The mock keeps a register map that writes update and reads return, so
//! a clean run reads back exactly what was written. Failures are injected
//! per call through queues; each queued entry is consumed by one call.

use std::collections::{BTreeMap, VecDeque};

use super::ModbusTransport;
use crate::error::{ModbusError, TransportError};

/// One call made against the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    WriteMultiple { unit_id: u8, start: u16, values: Vec<u16> },
    WriteSingle { unit_id: u8, address: u16, value: u16 },
    Read { unit_id: u8, start: u16, count: u16 },
    Close,
}

/// What a queued write failure does to the register map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFault {
    /// The write is lost.
    Rejected(ModbusError),
    /// The controller stores the values but the response never arrives.
    AppliedThenFailed(ModbusError),
}

#[derive(Debug, Default)]
pub struct MockTransport {
    connected: bool,
    registers: BTreeMap<u16, u16>,
    calls: Vec<Call>,
    connects: usize,
    connect_faults: BTreeMap<usize, TransportError>,
    write_faults: VecDeque<WriteFault>,
    read_faults: VecDeque<ModbusError>,
    short_reads: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `connect` fails with `error`.
    pub fn fail_connect(&mut self, error: TransportError) -> &mut Self {
        self.fail_nth_connect(1, error)
    }

    /// The `n`th `connect` from now (1-based) fails with `error`.
    pub fn fail_nth_connect(&mut self, n: usize, error: TransportError) -> &mut Self {
        self.connect_faults.insert(self.connects + n, error);
        self
    }

    /// The next write call fails as described.
    pub fn fail_write(&mut self, fault: WriteFault) -> &mut Self {
        self.write_faults.push_back(fault);
        self
    }

    /// The next `times` read calls fail with `error`.
    pub fn fail_reads(&mut self, times: usize, error: ModbusError) -> &mut Self {
        self.read_faults
            .extend(std::iter::repeat(error).take(times));
        self
    }

    /// The next `times` reads return one register fewer than requested.
    pub fn truncate_reads(&mut self, times: usize) -> &mut Self {
        self.short_reads += times;
        self
    }

    /// Overwrites a register, as the controller firmware might after a write.
    pub fn set_register(&mut self, address: u16, value: u16) -> &mut Self {
        self.registers.insert(address, value);
        self
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.registers.get(&address).copied()
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn count_calls(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| matches(call)).count()
    }

    fn store(&mut self, start: u16, values: &[u16]) {
        for (address, &value) in (start..).zip(values) {
            self.registers.insert(address, value);
        }
    }

    fn write(&mut self, start: u16, values: &[u16]) -> Result<(), ModbusError> {
        if !self.connected {
            return Err(ModbusError::NotConnected);
        }
        match self.write_faults.pop_front() {
            None => {
                self.store(start, values);
                Ok(())
            }
            Some(WriteFault::Rejected(error)) => Err(error),
            Some(WriteFault::AppliedThenFailed(error)) => {
                self.store(start, values);
                Err(error)
            }
        }
    }
}

impl ModbusTransport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Connect);
        self.connects += 1;
        if let Some(error) = self.connect_faults.remove(&self.connects) {
            self.connected = false;
            return Err(error);
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn write_multiple_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        values: &[u16],
    ) -> Result<(), ModbusError> {
        self.calls.push(Call::WriteMultiple {
            unit_id,
            start,
            values: values.to_vec(),
        });
        self.write(start, values)
    }

    fn write_single_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ModbusError> {
        self.calls.push(Call::WriteSingle {
            unit_id,
            address,
            value,
        });
        self.write(address, &[value])
    }

    fn read_holding_registers(
        &mut self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        self.calls.push(Call::Read {
            unit_id,
            start,
            count,
        });
        if !self.connected {
            return Err(ModbusError::NotConnected);
        }
        if let Some(error) = self.read_faults.pop_front() {
            return Err(error);
        }
        let mut values: Vec<u16> = (start..start + count)
            .map(|address| self.registers.get(&address).copied().unwrap_or(0))
            .collect();
        if self.short_reads > 0 {
            self.short_reads -= 1;
            values.pop();
        }
        Ok(values)
    }

    fn close(&mut self) {
        self.calls.push(Call::Close);
        self.connected = false;
    }
}
