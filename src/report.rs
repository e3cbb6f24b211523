//! Classifying a write by comparing it with what was read back.

use std::fmt;

use crate::encoder::{decode, ControllerTime, RegisterFrame};
use crate::error::Warning;
use crate::profile::ControllerProfile;

/// How much confidence the read-back gives in the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The controller holds exactly the written values.
    Confirmed,
    /// The controller answered, but with different values.
    Mismatch,
    /// Nothing could be read back.
    Unverifiable,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Confirmed => "CONFIRMED",
            Status::Mismatch => "MISMATCH",
            Status::Unverifiable => "UNVERIFIABLE",
        };
        f.write_str(text)
    }
}

pub fn classify(written: &RegisterFrame, read_back: Option<&RegisterFrame>) -> Status {
    match read_back {
        None => Status::Unverifiable,
        Some(read_back) if read_back == written => Status::Confirmed,
        Some(_) => Status::Mismatch,
    }
}

/// One register whose read-back differs from what was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDiff {
    pub address: u16,
    pub written: Option<u16>,
    pub read_back: Option<u16>,
}

/// The terminal result of one write-and-verify transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub profile: ControllerProfile,
    pub written: RegisterFrame,
    pub read_back: Option<RegisterFrame>,
    pub status: Status,
    pub warnings: Vec<Warning>,
}

impl TransactionOutcome {
    pub fn new(
        profile: ControllerProfile,
        written: RegisterFrame,
        read_back: Option<RegisterFrame>,
        warnings: Vec<Warning>,
    ) -> Self {
        let status = classify(&written, read_back.as_ref());
        Self {
            profile,
            written,
            read_back,
            status,
            warnings,
        }
    }

    /// Registers that differ between the written and read-back frames.
    /// Empty unless the status is [`Status::Mismatch`].
    pub fn mismatches(&self) -> Vec<RegisterDiff> {
        let Some(read_back) = &self.read_back else {
            return Vec::new();
        };
        let written = self.written.values();
        let read = read_back.values();
        let span = written.len().max(read.len());
        let base = self.profile.register_base();

        (0..span)
            .filter_map(|i| {
                let diff = RegisterDiff {
                    address: base + i as u16,
                    written: written.get(i).copied(),
                    read_back: read.get(i).copied(),
                };
                (diff.written != diff.read_back).then_some(diff)
            })
            .collect()
    }

    pub fn written_time(&self) -> ControllerTime {
        decode(&self.written, &self.profile)
    }

    pub fn read_back_time(&self) -> Option<ControllerTime> {
        self.read_back
            .as_ref()
            .map(|frame| decode(frame, &self.profile))
    }
}

fn hex(value: Option<u16>) -> String {
    value.map_or_else(|| "------".to_string(), |v| format!("0x{:04X}", v))
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Controller: {}", self.profile)?;
        writeln!(f, "Written:    {}  {}", self.written, self.written_time())?;
        match (&self.read_back, self.read_back_time()) {
            (Some(frame), Some(time)) => writeln!(f, "Read back:  {}  {}", frame, time)?,
            _ => writeln!(f, "Read back:  (none)")?,
        }
        for diff in self.mismatches() {
            writeln!(
                f,
                "  register 0x{:04X}: wrote {}, read {}",
                diff.address,
                hex(diff.written),
                hex(diff.read_back)
            )?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {}", warning)?;
        }
        write!(f, "Result:     {}", self.status)
    }
}
