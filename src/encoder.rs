//! Packing calendar fields into controller clock registers.

use std::fmt;

use chrono::Weekday;

use crate::clock::TargetTimestamp;
use crate::error::EncodingRangeError;
use crate::profile::{ControllerProfile, Field, WeekdayEncoding};

/// The first year a year-of-century byte can represent.
pub const EPOCH_YEAR: i32 = 2000;

/// Register values in address order, one per register of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterFrame(Vec<u16>);

impl RegisterFrame {
    pub fn new(values: Vec<u16>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Each register split into `(high, low)` bytes.
    pub fn bytes(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.0.iter().map(|&value| unpack(value))
    }
}

impl From<Vec<u16>> for RegisterFrame {
    fn from(values: Vec<u16>) -> Self {
        Self(values)
    }
}

impl fmt::Display for RegisterFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "0x{:04X}", value)?;
        }
        write!(f, "]")
    }
}

pub fn pack(high: u8, low: u8) -> u16 {
    (u16::from(high) << 8) | u16::from(low)
}

pub fn unpack(value: u16) -> (u8, u8) {
    ((value >> 8) as u8, (value & 0xFF) as u8)
}

/// Sunday=0 .. Saturday=6.
pub fn sunday_zero_weekday(weekday: Weekday) -> u8 {
    ((weekday.num_days_from_monday() + 1) % 7) as u8
}

/// Sunday=1 .. Saturday=7.
pub fn sunday_one_weekday(weekday: Weekday) -> u8 {
    match weekday {
        Weekday::Sun => 1,
        other => (other.num_days_from_monday() + 2) as u8,
    }
}

fn weekday_code(weekday: Weekday, encoding: WeekdayEncoding) -> u8 {
    match encoding {
        WeekdayEncoding::Zeroed => 0,
        WeekdayEncoding::SundayZero => sunday_zero_weekday(weekday),
        WeekdayEncoding::SundayOne => sunday_one_weekday(weekday),
    }
}

fn checked(field: Field, value: i64, min: i64, max: i64) -> Result<u8, EncodingRangeError> {
    if (min..=max).contains(&value) {
        Ok(value as u8)
    } else {
        Err(EncodingRangeError {
            field,
            value,
            min,
            max,
        })
    }
}

fn field_byte(
    timestamp: &TargetTimestamp,
    field: Field,
    encoding: WeekdayEncoding,
) -> Result<u8, EncodingRangeError> {
    match field {
        Field::Hour => checked(field, timestamp.hour.into(), 0, 23),
        Field::Minute => checked(field, timestamp.minute.into(), 0, 59),
        Field::Second => checked(field, timestamp.second.into(), 0, 59),
        Field::Month => checked(field, timestamp.month.into(), 1, 12),
        Field::Day => checked(field, timestamp.day.into(), 1, 31),
        Field::Weekday => Ok(weekday_code(timestamp.weekday, encoding)),
        Field::YearOfCentury => {
            let year = i64::from(timestamp.year);
            let epoch = i64::from(EPOCH_YEAR);
            checked(field, year, epoch, epoch + 99).map(|_| (year - epoch) as u8)
        }
        Field::Reserved => Ok(0),
    }
}

/// Builds the register frame for `timestamp` under `profile`.
///
/// Every field is range-checked; nothing is masked into a byte.
pub fn encode(
    timestamp: &TargetTimestamp,
    profile: &ControllerProfile,
) -> Result<RegisterFrame, EncodingRangeError> {
    let encoding = profile.weekday_encoding();
    let values = profile
        .layout()
        .iter()
        .map(|&(high, low)| {
            Ok(pack(
                field_byte(timestamp, high, encoding)?,
                field_byte(timestamp, low, encoding)?,
            ))
        })
        .collect::<Result<Vec<_>, EncodingRangeError>>()?;
    Ok(RegisterFrame(values))
}

/// Clock fields as read out of a register frame. Fields the profile does
/// not carry are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerTime {
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub weekday_code: Option<u8>,
}

/// Splits `frame` back into named fields following `profile`'s layout.
/// Registers beyond the layout are ignored.
pub fn decode(frame: &RegisterFrame, profile: &ControllerProfile) -> ControllerTime {
    let mut time = ControllerTime::default();
    for (&(high, low), (high_byte, low_byte)) in profile.layout().iter().zip(frame.bytes()) {
        assign(&mut time, high, high_byte);
        assign(&mut time, low, low_byte);
    }
    time
}

fn assign(time: &mut ControllerTime, field: Field, byte: u8) {
    match field {
        Field::Hour => time.hour = Some(byte),
        Field::Minute => time.minute = Some(byte),
        Field::Second => time.second = Some(byte),
        Field::Month => time.month = Some(byte),
        Field::Day => time.day = Some(byte),
        Field::Weekday => time.weekday_code = Some(byte),
        Field::YearOfCentury => time.year = Some(EPOCH_YEAR + i32::from(byte)),
        Field::Reserved => {}
    }
}

impl fmt::Display for ControllerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let two = |v: Option<u8>| v.map_or_else(|| "--".to_string(), |v| format!("{:02}", v));
        write!(
            f,
            "{}-{}-{} {}:{}",
            self.year.map_or_else(|| "----".to_string(), |y| format!("{:04}", y)),
            two(self.month),
            two(self.day),
            two(self.hour),
            two(self.minute),
        )?;
        if let Some(second) = self.second {
            write!(f, ":{:02}", second)?;
        }
        if let Some(code) = self.weekday_code {
            write!(f, " (weekday code {})", code)?;
        }
        Ok(())
    }
}
