//! Wall-clock sampling and minute alignment.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use log::{debug, info};

use crate::timezone::Zone;

/// Source of the current time, and the means to wait for it to pass.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

/// The host's system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// The calendar fields to be written to a controller, in local wall-clock time.
///
/// Fields are kept as plain integers so that a value which no controller
/// register can hold is representable and rejected by the encoder rather
/// than by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetTimestamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub weekday: Weekday,
    pub zone: Zone,
}

impl TargetTimestamp {
    /// Takes the calendar fields of `local`, dropping sub-second precision.
    pub fn from_local(local: &DateTime<Tz>, zone: Zone) -> Self {
        Self {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
            second: local.second(),
            weekday: local.weekday(),
            zone,
        }
    }
}

impl fmt::Display for TargetTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} {} ({})",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.weekday,
            self.zone.label()
        )
    }
}

/// Whether to wait for the top of the minute before sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentMode {
    /// Block until the seconds field reads 0.
    #[default]
    TopOfMinute,
    /// Use the current time as-is, seconds included.
    Immediate,
}

/// Returns the current time in `zone`, aligned according to `mode`.
///
/// In [`AlignmentMode::TopOfMinute`] the clock is re-sampled after every
/// wait, since a sleep can overshoot past the boundary it aimed for.
pub fn align(clock: &dyn Clock, zone: Zone, mode: AlignmentMode) -> TargetTimestamp {
    let tz = zone.tz();
    let mut now = clock.now().with_timezone(&tz);

    if mode == AlignmentMode::TopOfMinute {
        while now.second() != 0 {
            let wait = until_next_minute(&now);
            debug!(
                "event=align_wait zone={} second={} wait_ms={}",
                zone.label(),
                now.second(),
                wait.as_millis()
            );
            clock.sleep(wait);
            now = clock.now().with_timezone(&tz);
        }
    }

    let target = TargetTimestamp::from_local(&now, zone);
    info!("event=align status=ok mode={:?} target=\"{}\"", mode, target);
    target
}

fn until_next_minute(now: &DateTime<Tz>) -> Duration {
    let elapsed = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(60).saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::{Cell, RefCell};

    /// Advances by the requested sleep, plus the next queued overshoot if any.
    struct SteppingClock {
        now: Cell<DateTime<Utc>>,
        overshoots: RefCell<Vec<Duration>>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl SteppingClock {
        fn at(now: DateTime<Utc>) -> Self {
            Self::overshooting(now, Vec::new())
        }

        fn overshooting(now: DateTime<Utc>, overshoots: Vec<Duration>) -> Self {
            Self {
                now: Cell::new(now),
                overshoots: RefCell::new(overshoots),
                sleeps: RefCell::new(Vec::new()),
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            self.now.get()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
            let mut overshoots = self.overshoots.borrow_mut();
            let extra = if overshoots.is_empty() { Duration::ZERO } else { overshoots.remove(0) };
            let step = chrono::Duration::from_std(duration + extra).unwrap();
            self.now.set(self.now.get() + step);
        }
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, h, m, s).unwrap()
    }

    #[test]
    fn already_aligned_returns_without_sleeping() {
        let clock = SteppingClock::at(utc(20, 30, 0));
        let target = align(&clock, Zone::Central, AlignmentMode::TopOfMinute);
        assert!(clock.sleeps.borrow().is_empty());
        assert_eq!((target.hour, target.minute, target.second), (14, 30, 0));
    }

    #[test]
    fn waits_until_the_next_minute() {
        let clock = SteppingClock::at(utc(20, 29, 45));
        let target = align(&clock, Zone::Central, AlignmentMode::TopOfMinute);
        assert_eq!(*clock.sleeps.borrow(), vec![Duration::from_secs(15)]);
        assert_eq!((target.hour, target.minute, target.second), (14, 30, 0));
        assert_eq!(target.weekday, Weekday::Thu);
    }

    #[test]
    fn resamples_when_a_sleep_overshoots_the_boundary() {
        let clock = SteppingClock::overshooting(utc(20, 29, 45), vec![Duration::from_secs(1)]);
        let target = align(&clock, Zone::Central, AlignmentMode::TopOfMinute);
        assert_eq!(
            *clock.sleeps.borrow(),
            vec![Duration::from_secs(15), Duration::from_secs(59)]
        );
        assert_eq!((target.hour, target.minute, target.second), (14, 31, 0));
    }

    #[test]
    fn sub_second_offsets_are_included_in_the_wait() {
        let start = utc(20, 29, 59) + chrono::Duration::milliseconds(250);
        let clock = SteppingClock::at(start);
        let target = align(&clock, Zone::Central, AlignmentMode::TopOfMinute);
        assert_eq!(*clock.sleeps.borrow(), vec![Duration::from_millis(750)]);
        assert_eq!(target.second, 0);
    }

    #[test]
    fn immediate_mode_keeps_seconds() {
        let clock = SteppingClock::at(utc(20, 29, 45));
        let target = align(&clock, Zone::Eastern, AlignmentMode::Immediate);
        assert!(clock.sleeps.borrow().is_empty());
        assert_eq!((target.hour, target.minute, target.second), (15, 29, 45));
    }

    #[test]
    fn uses_daylight_time_after_the_spring_change() {
        // 2024-03-10 is the US spring-forward date.
        let clock = SteppingClock::at(Utc.with_ymd_and_hms(2024, 3, 11, 18, 0, 0).unwrap());
        let target = align(&clock, Zone::Pacific, AlignmentMode::TopOfMinute);
        assert_eq!(target.hour, 11);
    }
}
