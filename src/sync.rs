//! One synchronization run: align, encode, then write and verify.
//!
//! The run is split at the point where a caller may want to ask for
//! confirmation: [`prepare`] produces the exact values that would be
//! written, and [`PreparedWrite::apply`] puts them on the wire.

use log::info;

use crate::clock::{align, AlignmentMode, Clock, TargetTimestamp};
use crate::encoder::{encode, RegisterFrame};
use crate::error::{EncodingRangeError, SyncError, TransportError};
use crate::executor::Executor;
use crate::profile::ControllerProfile;
use crate::report::TransactionOutcome;
use crate::timezone::Zone;
use crate::transport::ModbusTransport;

/// A timestamp and the frame encoding it, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedWrite {
    pub target: TargetTimestamp,
    pub profile: ControllerProfile,
    pub frame: RegisterFrame,
}

impl PreparedWrite {
    /// Encodes an already-chosen timestamp.
    pub fn for_timestamp(
        target: TargetTimestamp,
        profile: ControllerProfile,
    ) -> Result<Self, EncodingRangeError> {
        let frame = encode(&target, &profile)?;
        Ok(Self {
            target,
            profile,
            frame,
        })
    }

    /// Samples `clock` again for the same zone and profile. Used when time
    /// has passed since this write was prepared, such as at a prompt.
    pub fn refresh(
        &self,
        clock: &dyn Clock,
        mode: AlignmentMode,
    ) -> Result<Self, EncodingRangeError> {
        prepare(clock, self.target.zone, self.profile, mode)
    }

    pub fn apply<T: ModbusTransport + ?Sized>(
        &self,
        executor: &Executor,
        transport: &mut T,
    ) -> Result<TransactionOutcome, TransportError> {
        info!(
            "event=apply profile={} unit={} target=\"{}\" frame=\"{}\"",
            self.profile.name(),
            executor.config().unit_id,
            self.target,
            self.frame
        );
        executor.write_and_verify(transport, &self.profile, &self.frame)
    }
}

/// Samples the clock in `zone`, aligned per `mode`, and encodes it.
pub fn prepare(
    clock: &dyn Clock,
    zone: Zone,
    profile: ControllerProfile,
    mode: AlignmentMode,
) -> Result<PreparedWrite, EncodingRangeError> {
    PreparedWrite::for_timestamp(align(clock, zone, mode), profile)
}

/// Runs every step without pausing for confirmation.
pub fn run<T: ModbusTransport + ?Sized>(
    clock: &dyn Clock,
    zone: Zone,
    profile: ControllerProfile,
    mode: AlignmentMode,
    executor: &Executor,
    transport: &mut T,
) -> Result<TransactionOutcome, SyncError> {
    let prepared = prepare(clock, zone, profile, mode)?;
    Ok(prepared.apply(executor, transport)?)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc, Weekday};

    use super::*;
    use crate::profile::Field;

    struct ManualClock(Cell<DateTime<Utc>>);

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.get()
        }

        fn sleep(&self, duration: Duration) {
            self.0.set(self.0.get() + chrono::Duration::from_std(duration).unwrap());
        }
    }

    #[test]
    fn refresh_resamples_the_clock() {
        // 2024-03-07 14:29:40 CST
        let clock = ManualClock(Cell::new(Utc.with_ymd_and_hms(2024, 3, 7, 20, 29, 40).unwrap()));
        let first = prepare(
            &clock,
            Zone::Central,
            ControllerProfile::HPanel,
            AlignmentMode::TopOfMinute,
        )
        .unwrap();
        assert_eq!((first.target.hour, first.target.minute), (14, 30));

        // A slow answer at the confirmation prompt.
        clock.sleep(Duration::from_secs(95));
        let second = first.refresh(&clock, AlignmentMode::TopOfMinute).unwrap();

        assert_eq!(second.profile, ControllerProfile::HPanel);
        assert_eq!(second.target.zone, Zone::Central);
        assert_eq!((second.target.hour, second.target.minute), (14, 32));
        assert_eq!(second.frame.values()[0], 0x0E20);
        assert_ne!(second.frame, first.frame);
    }

    #[test]
    fn out_of_range_timestamp_is_rejected_before_any_io() {
        let target = TargetTimestamp {
            year: 2100,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            weekday: Weekday::Fri,
            zone: Zone::Central,
        };
        let err = PreparedWrite::for_timestamp(target, ControllerProfile::HPanel).unwrap_err();
        assert_eq!(err.field, Field::YearOfCentury);
    }
}
