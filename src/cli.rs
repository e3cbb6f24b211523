use std::time::Duration;

use clap::{Parser, ValueEnum};
use genclock::executor::{DEFAULT_READ_ATTEMPTS, DEFAULT_READ_BACKOFF};
use genclock::logging::DEFAULT_LEVEL;
use genclock::transport::{
    DataBits, Parity, StopBits, DEFAULT_BAUD_RATE, DEFAULT_PORT, DEFAULT_UNIT_ID,
};
use genclock::{
    AlignmentMode, ControllerProfile, ExecutorConfig, SerialConfig, WeekdayPolicy, WriteMode, Zone,
};

#[derive(Parser, Debug)]
#[command(
    name = "genclock",
    version,
    about = "Set a generator controller's clock over Modbus RTU"
)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = ProfileArg::Evolution, help = "Controller family")]
    pub profile: ProfileArg,
    #[arg(
        long,
        value_enum,
        default_value_t = WeekdayArg::Zeroed,
        help = "Weekday byte for Evolution controllers"
    )]
    pub weekday: WeekdayArg,
    #[arg(long, help = "eastern, central, mountain or pacific (prompts when omitted)")]
    pub zone: Option<Zone>,
    #[arg(long, default_value = DEFAULT_PORT)]
    pub port: String,
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    #[arg(long, value_enum, default_value_t = ParityArg::None)]
    pub parity: ParityArg,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub stop_bits: u8,
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(7..=8))]
    pub data_bits: u8,
    #[arg(long, default_value_t = 2000, help = "Per-request timeout in milliseconds")]
    pub timeout_ms: u64,
    #[arg(long, default_value_t = DEFAULT_UNIT_ID, help = "Modbus unit (slave) id")]
    pub unit_id: u8,
    #[arg(long, default_value_t = 10, help = "Seconds to wait between write and read-back")]
    pub settle_secs: u64,
    #[arg(long, help = "Close and reopen the port before reading back")]
    pub reopen_before_read: bool,
    #[arg(long, help = "Write immediately instead of waiting for the top of the minute")]
    pub no_align: bool,
    #[arg(long, value_enum, default_value_t = WriteModeArg::Block)]
    pub write_mode: WriteModeArg,
    #[arg(short, long, help = "Skip the confirmation prompt")]
    pub yes: bool,
    #[arg(long, help = "Show the register values without touching the port")]
    pub dry_run: bool,
    #[arg(long, help = "List available serial ports and exit")]
    pub list_ports: bool,
    #[arg(long, default_value = DEFAULT_LEVEL, help = "Log level or flexi_logger spec")]
    pub log_level: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Evolution,
    Hpanel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum WeekdayArg {
    Zeroed,
    Actual,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ParityArg {
    None,
    Odd,
    Even,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum WriteModeArg {
    Block,
    PerRegister,
}

impl Cli {
    pub fn profile(&self) -> ControllerProfile {
        match self.profile {
            ProfileArg::Evolution => ControllerProfile::Evolution {
                weekday: match self.weekday {
                    WeekdayArg::Zeroed => WeekdayPolicy::Zeroed,
                    WeekdayArg::Actual => WeekdayPolicy::Actual,
                },
            },
            ProfileArg::Hpanel => ControllerProfile::HPanel,
        }
    }

    pub fn alignment(&self) -> AlignmentMode {
        if self.no_align {
            AlignmentMode::Immediate
        } else {
            AlignmentMode::TopOfMinute
        }
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            port: self.port.clone(),
            baud_rate: self.baud,
            parity: match self.parity {
                ParityArg::None => Parity::None,
                ParityArg::Odd => Parity::Odd,
                ParityArg::Even => Parity::Even,
            },
            stop_bits: if self.stop_bits == 2 { StopBits::Two } else { StopBits::One },
            data_bits: if self.data_bits == 7 { DataBits::Seven } else { DataBits::Eight },
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            unit_id: self.unit_id,
            write_mode: match self.write_mode {
                WriteModeArg::Block => WriteMode::Block,
                WriteModeArg::PerRegister => WriteMode::PerRegister,
            },
            settle_delay: Duration::from_secs(self.settle_secs),
            reopen_before_read: self.reopen_before_read,
            read_attempts: DEFAULT_READ_ATTEMPTS,
            read_backoff: DEFAULT_READ_BACKOFF,
        }
    }
}
