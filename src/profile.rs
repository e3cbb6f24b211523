//! Controller families and their clock register layouts.
//!
//! Each clock register is 16 bits wide and carries two 8-bit fields,
//! high byte first. A family is described by where its clock registers
//! start, which field sits in each byte, and how it numbers weekdays.

use std::fmt;

/// A byte-sized field inside a clock register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Hour,
    Minute,
    Second,
    Month,
    Day,
    Weekday,
    /// Years since 2000.
    YearOfCentury,
    /// Written as zero; its meaning on the controller is unknown.
    Reserved,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Hour => "hour",
            Field::Minute => "minute",
            Field::Second => "second",
            Field::Month => "month",
            Field::Day => "day",
            Field::Weekday => "weekday",
            Field::YearOfCentury => "year",
            Field::Reserved => "reserved",
        };
        f.write_str(name)
    }
}

/// `(high byte, low byte)` of one register.
pub type RegisterLayout = (Field, Field);

const EVOLUTION_LAYOUT: [RegisterLayout; 3] = [
    (Field::Hour, Field::Minute),
    (Field::Month, Field::Day),
    (Field::Weekday, Field::YearOfCentury),
];

const HPANEL_LAYOUT: [RegisterLayout; 4] = [
    (Field::Hour, Field::Minute),
    (Field::Second, Field::Weekday),
    (Field::Month, Field::Day),
    (Field::YearOfCentury, Field::Reserved),
];

/// How a controller numbers the day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekdayEncoding {
    /// Always 0, whatever the actual day.
    Zeroed,
    /// Sunday=0 .. Saturday=6.
    SundayZero,
    /// Sunday=1 .. Saturday=7.
    SundayOne,
}

/// Weekday handling for Evolution controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeekdayPolicy {
    /// Write 0 in the weekday byte, as the reference firmware tooling does.
    #[default]
    Zeroed,
    /// Write the true weekday, Sunday=0.
    Actual,
}

/// A supported controller family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerProfile {
    /// Evolution controllers: three registers from 14 (0x000E).
    Evolution { weekday: WeekdayPolicy },
    /// H-Panel controllers: four registers from 0x00E0.
    HPanel,
}

impl Default for ControllerProfile {
    fn default() -> Self {
        ControllerProfile::Evolution {
            weekday: WeekdayPolicy::default(),
        }
    }
}

impl ControllerProfile {
    pub fn register_base(&self) -> u16 {
        match self {
            ControllerProfile::Evolution { .. } => 0x000E,
            ControllerProfile::HPanel => 0x00E0,
        }
    }

    pub fn register_count(&self) -> u16 {
        self.layout().len() as u16
    }

    pub fn layout(&self) -> &'static [RegisterLayout] {
        match self {
            ControllerProfile::Evolution { .. } => &EVOLUTION_LAYOUT,
            ControllerProfile::HPanel => &HPANEL_LAYOUT,
        }
    }

    pub fn weekday_encoding(&self) -> WeekdayEncoding {
        match self {
            ControllerProfile::Evolution {
                weekday: WeekdayPolicy::Zeroed,
            } => WeekdayEncoding::Zeroed,
            ControllerProfile::Evolution {
                weekday: WeekdayPolicy::Actual,
            } => WeekdayEncoding::SundayZero,
            ControllerProfile::HPanel => WeekdayEncoding::SundayOne,
        }
    }

    /// Absolute register addresses covered by this profile, in layout order.
    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        let base = self.register_base();
        (0..self.register_count()).map(move |offset| base + offset)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControllerProfile::Evolution { .. } => "Evolution",
            ControllerProfile::HPanel => "H-Panel",
        }
    }
}

impl fmt::Display for ControllerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} registers at 0x{:04X})",
            self.name(),
            self.register_count(),
            self.register_base()
        )
    }
}
