//! # Generator Controller Clock Sync
//!
//! Sets the real-time clock of a standby-generator controller over an
//! RS-485 Modbus RTU link. A run takes the wall-clock time of one of the
//! supported US timezones, aligns it to the top of the minute, packs it into
//! the controller family's clock registers, writes them in one transaction
//! and reads them back to classify the result as confirmed, mismatched or
//! unverifiable.

pub mod clock;
pub mod encoder;
pub mod error;
pub mod executor;
pub mod logging;
pub mod modbus;
pub mod profile;
pub mod report;
pub mod sync;
pub mod timezone;
pub mod transport;

pub use clock::{align, AlignmentMode, Clock, SystemClock, TargetTimestamp};
pub use encoder::{decode, encode, ControllerTime, RegisterFrame};
pub use error::{EncodingRangeError, ModbusError, SyncError, TransportError, Warning};
pub use executor::{Executor, ExecutorConfig, WriteMode};
pub use profile::{ControllerProfile, WeekdayPolicy};
pub use report::{classify, RegisterDiff, Status, TransactionOutcome};
pub use sync::{prepare, run, PreparedWrite};
pub use timezone::Zone;
pub use transport::{ModbusTransport, SerialConfig, SerialModbus};
