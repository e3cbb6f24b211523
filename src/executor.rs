//! Writing a register frame and verifying it by read-back.
//!
//! Only a failure to open the link aborts. After that point every failure
//! is recorded as a [`Warning`] and the transaction runs to a classified
//! [`TransactionOutcome`]: a write that timed out may still have been
//! applied, and a read-back that never succeeds says nothing about the
//! write itself.

use std::time::Duration;

use log::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::encoder::RegisterFrame;
use crate::error::{ModbusError, TransportError, Warning};
use crate::profile::ControllerProfile;
use crate::report::TransactionOutcome;
use crate::transport::{ModbusTransport, DEFAULT_UNIT_ID};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_ATTEMPTS: u32 = 3;
pub const DEFAULT_READ_BACKOFF: Duration = Duration::from_millis(500);

/// How the frame is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// One write-multiple-registers transaction covering the whole frame.
    #[default]
    Block,
    /// One write-single-register transaction per register.
    PerRegister,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub unit_id: u8,
    pub write_mode: WriteMode,
    /// Pause between the write and the first read-back attempt.
    pub settle_delay: Duration,
    /// Close and reopen the link before reading back. Some USB-serial
    /// adapters stop answering after a write until they are reopened.
    pub reopen_before_read: bool,
    pub read_attempts: u32,
    pub read_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            unit_id: DEFAULT_UNIT_ID,
            write_mode: WriteMode::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            reopen_before_read: false,
            read_attempts: DEFAULT_READ_ATTEMPTS,
            read_backoff: DEFAULT_READ_BACKOFF,
        }
    }
}

/// Holds the link open for one transaction and closes it when dropped.
struct OpenLink<'a, T: ModbusTransport + ?Sized> {
    transport: &'a mut T,
}

impl<'a, T: ModbusTransport + ?Sized> OpenLink<'a, T> {
    fn open(transport: &'a mut T) -> Result<Self, TransportError> {
        transport.connect()?;
        Ok(Self { transport })
    }

    fn reopen(&mut self) -> Result<(), TransportError> {
        self.transport.close();
        self.transport.connect()
    }
}

impl<T: ModbusTransport + ?Sized> Drop for OpenLink<'_, T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

pub struct Executor {
    config: ExecutorConfig,
    clock: Box<dyn Clock>,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Waits out the settle delay and read backoff on `clock`.
    pub fn with_clock(config: ExecutorConfig, clock: impl Clock + 'static) -> Self {
        Self {
            config,
            clock: Box::new(clock),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Writes `frame` to `profile`'s clock registers and reads it back.
    ///
    /// Returns `Err` only when `frame` does not span the profile's clock
    /// registers or the link cannot be opened. Nothing is written in either
    /// case.
    pub fn write_and_verify<T: ModbusTransport + ?Sized>(
        &self,
        transport: &mut T,
        profile: &ControllerProfile,
        frame: &RegisterFrame,
    ) -> Result<TransactionOutcome, TransportError> {
        let start = profile.register_base();
        let count = profile.register_count();
        if frame.len() != usize::from(count) {
            let error = TransportError::FrameSize {
                profile: profile.name(),
                expected: count,
                actual: frame.len(),
            };
            warn!("event=write status=rejected error=\"{}\"", error);
            return Err(error);
        }

        let mut link = OpenLink::open(transport).map_err(|e| {
            warn!("event=connect status=error error=\"{}\"", e);
            e
        })?;
        let mut warnings = Vec::new();

        warnings.extend(self.write(&mut link, start, frame));

        if !self.config.settle_delay.is_zero() {
            debug!("event=settle delay_ms={}", self.config.settle_delay.as_millis());
            self.clock.sleep(self.config.settle_delay);
        }

        let mut link_usable = true;
        if self.config.reopen_before_read {
            if let Err(e) = link.reopen() {
                warn!("event=reopen status=error error=\"{}\"", e);
                warnings.push(Warning::Reopen(e));
                link_usable = false;
            }
        }

        let read_back = if link_usable {
            match self.read_back(&mut link, start, count) {
                Ok(frame) => Some(frame),
                Err(warning) => {
                    warnings.push(warning);
                    None
                }
            }
        } else {
            None
        };
        drop(link);

        let outcome = TransactionOutcome::new(*profile, frame.clone(), read_back, warnings);
        info!(
            "event=verify status={:?} written=\"{}\" warnings={}",
            outcome.status,
            outcome.written,
            outcome.warnings.len()
        );
        Ok(outcome)
    }

    fn write<T: ModbusTransport + ?Sized>(
        &self,
        link: &mut OpenLink<'_, T>,
        start: u16,
        frame: &RegisterFrame,
    ) -> Vec<Warning> {
        let unit_id = self.config.unit_id;
        let results: Vec<(u16, Result<(), ModbusError>)> = match self.config.write_mode {
            WriteMode::Block => vec![(
                start,
                link.transport
                    .write_multiple_registers(unit_id, start, frame.values()),
            )],
            WriteMode::PerRegister => (start..)
                .zip(frame.values())
                .map(|(address, &value)| {
                    (
                        address,
                        link.transport.write_single_register(unit_id, address, value),
                    )
                })
                .collect(),
        };

        results
            .into_iter()
            .filter_map(|(address, result)| match result {
                Ok(()) => {
                    debug!("event=write status=ok unit={} address=0x{:04X}", unit_id, address);
                    None
                }
                Err(error) => {
                    warn!(
                        "event=write status=error unit={} address=0x{:04X} error=\"{}\"",
                        unit_id, address, error
                    );
                    Some(Warning::Write { address, error })
                }
            })
            .collect()
    }

    fn read_back<T: ModbusTransport + ?Sized>(
        &self,
        link: &mut OpenLink<'_, T>,
        start: u16,
        count: u16,
    ) -> Result<RegisterFrame, Warning> {
        let unit_id = self.config.unit_id;
        let attempts = self.config.read_attempts.max(1);
        let mut last_error = ModbusError::NotConnected;

        for attempt in 1..=attempts {
            let result = link
                .transport
                .read_holding_registers(unit_id, start, count)
                .and_then(|values| {
                    if values.len() == usize::from(count) {
                        Ok(values)
                    } else {
                        Err(ModbusError::UnexpectedResponse(format!(
                            "read {} registers, expected {}",
                            values.len(),
                            count
                        )))
                    }
                });

            match result {
                Ok(values) => {
                    debug!("event=read status=ok attempt={} unit={}", attempt, unit_id);
                    return Ok(RegisterFrame::new(values));
                }
                Err(error) => {
                    warn!(
                        "event=read status=error attempt={}/{} unit={} error=\"{}\"",
                        attempt, attempts, unit_id, error
                    );
                    last_error = error;
                }
            }

            if attempt < attempts && !self.config.read_backoff.is_zero() {
                self.clock.sleep(self.config.read_backoff);
            }
        }

        Err(Warning::ReadRetryExhausted {
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::report::Status;
    use crate::transport::mock::{Call, MockTransport, WriteFault};

    fn fast() -> Executor {
        Executor::new(ExecutorConfig {
            settle_delay: Duration::ZERO,
            read_backoff: Duration::ZERO,
            ..ExecutorConfig::default()
        })
    }

    fn evolution_frame() -> RegisterFrame {
        RegisterFrame::new(vec![0x0E1E, 0x0307, 0x0018])
    }

    const TIMEOUT: ModbusError = ModbusError::Timeout { timeout_ms: 2000 };

    #[test]
    fn clean_run_is_confirmed_with_a_single_read() {
        let mut mock = MockTransport::new();
        let outcome = fast()
            .write_and_verify(&mut mock, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Confirmed);
        assert!(outcome.warnings.is_empty());
        assert_eq!(
            mock.calls(),
            &[
                Call::Connect,
                Call::WriteMultiple {
                    unit_id: 157,
                    start: 14,
                    values: vec![0x0E1E, 0x0307, 0x0018]
                },
                Call::Read {
                    unit_id: 157,
                    start: 14,
                    count: 3
                },
                Call::Close,
            ]
        );
    }

    #[test]
    fn connect_failure_aborts_before_writing() {
        let mut mock = MockTransport::new();
        mock.fail_connect(TransportError::Open {
            port: "/dev/USB232".to_string(),
            reason: "No such file or directory".to_string(),
        });
        let result =
            fast().write_and_verify(&mut mock, &ControllerProfile::default(), &evolution_frame());

        assert!(matches!(result, Err(TransportError::Open { .. })));
        assert_eq!(mock.calls(), &[Call::Connect]);
    }

    #[test]
    fn write_timeout_still_verifies() {
        let mut mock = MockTransport::new();
        mock.fail_write(WriteFault::AppliedThenFailed(TIMEOUT));
        let outcome = fast()
            .write_and_verify(&mut mock, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Confirmed);
        assert_eq!(
            outcome.warnings,
            vec![Warning::Write {
                address: 14,
                error: TIMEOUT
            }]
        );
    }

    #[test]
    fn lost_write_reads_back_as_mismatch() {
        let mut mock = MockTransport::new();
        mock.set_register(14, 0x0A1E)
            .set_register(15, 0x0601)
            .set_register(16, 0x0017)
            .fail_write(WriteFault::Rejected(TIMEOUT));
        let outcome = fast()
            .write_and_verify(&mut mock, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Mismatch);
        assert_eq!(outcome.mismatches().len(), 3);
    }

    #[test]
    fn read_retries_stop_at_first_success() {
        let mut mock = MockTransport::new();
        mock.fail_reads(2, TIMEOUT);
        let outcome = fast()
            .write_and_verify(&mut mock, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Confirmed);
        assert_eq!(mock.count_calls(|c| matches!(c, Call::Read { .. })), 3);
    }

    #[test]
    fn exhausted_reads_are_unverifiable_and_close_the_link() {
        let mut mock = MockTransport::new();
        mock.fail_reads(5, TIMEOUT);
        let outcome = fast()
            .write_and_verify(&mut mock, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Unverifiable);
        assert!(outcome.read_back.is_none());
        assert_eq!(
            outcome.warnings,
            vec![Warning::ReadRetryExhausted {
                attempts: 3,
                last_error: TIMEOUT
            }]
        );
        assert_eq!(mock.count_calls(|c| matches!(c, Call::Read { .. })), 3);
        assert_eq!(mock.calls().last(), Some(&Call::Close));
        assert!(!mock.is_connected());
    }

    #[test]
    fn short_reads_count_as_failed_attempts() {
        let mut mock = MockTransport::new();
        mock.truncate_reads(1);
        let outcome = fast()
            .write_and_verify(&mut mock, &ControllerProfile::HPanel, &RegisterFrame::new(vec![1, 2, 3, 4]))
            .unwrap();

        assert_eq!(outcome.status, Status::Confirmed);
        assert_eq!(mock.count_calls(|c| matches!(c, Call::Read { .. })), 2);
    }

    #[test]
    fn reopen_cycles_the_link_before_reading() {
        let mut mock = MockTransport::new();
        let executor = Executor::new(ExecutorConfig {
            reopen_before_read: true,
            ..fast().config().clone()
        });
        let outcome = executor
            .write_and_verify(&mut mock, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Confirmed);
        let kinds: Vec<&str> = mock
            .calls()
            .iter()
            .map(|c| match c {
                Call::Connect => "connect",
                Call::WriteMultiple { .. } | Call::WriteSingle { .. } => "write",
                Call::Read { .. } => "read",
                Call::Close => "close",
            })
            .collect();
        assert_eq!(kinds, vec!["connect", "write", "close", "connect", "read", "close"]);
    }

    #[test]
    fn failed_reopen_skips_read_back() {
        let mut mock = MockTransport::new();
        mock.fail_nth_connect(
            2,
            TransportError::Open {
                port: "/dev/USB232".to_string(),
                reason: "device busy".to_string(),
            },
        );
        let executor = Executor::new(ExecutorConfig {
            reopen_before_read: true,
            ..fast().config().clone()
        });
        let outcome = executor
            .write_and_verify(&mut mock, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Unverifiable);
        assert!(matches!(outcome.warnings.as_slice(), [Warning::Reopen(_)]));
        assert_eq!(mock.count_calls(|c| matches!(c, Call::Read { .. })), 0);
        assert_eq!(mock.calls().last(), Some(&Call::Close));
    }

    #[test]
    fn per_register_mode_writes_each_register() {
        let mut mock = MockTransport::new();
        let executor = Executor::new(ExecutorConfig {
            write_mode: WriteMode::PerRegister,
            ..fast().config().clone()
        });
        mock.fail_write(WriteFault::Rejected(TIMEOUT));
        let frame = RegisterFrame::new(vec![0x0E1E, 0x0005, 0x0307, 0x1800]);
        let outcome = executor
            .write_and_verify(&mut mock, &ControllerProfile::HPanel, &frame)
            .unwrap();

        assert_eq!(mock.count_calls(|c| matches!(c, Call::WriteSingle { .. })), 4);
        assert_eq!(
            outcome.warnings,
            vec![Warning::Write {
                address: 0x00E0,
                error: TIMEOUT
            }]
        );
        assert_eq!(outcome.status, Status::Mismatch);
        assert_eq!(outcome.mismatches()[0].address, 0x00E0);
    }

    #[test]
    fn frame_of_wrong_length_is_rejected_before_connecting() {
        let mut mock = MockTransport::new();
        let result = fast().write_and_verify(
            &mut mock,
            &ControllerProfile::HPanel,
            &RegisterFrame::new(vec![1, 2, 3]),
        );

        assert_eq!(
            result.unwrap_err(),
            TransportError::FrameSize {
                profile: "H-Panel",
                expected: 4,
                actual: 3
            }
        );
        assert!(mock.calls().is_empty());
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Connect,
        Write,
        Read,
        Close,
        Sleep(Duration),
    }

    type Timeline = Rc<RefCell<Vec<Step>>>;

    struct TimelineClock(Timeline);

    impl Clock for TimelineClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 3, 7, 20, 30, 0).unwrap()
        }

        fn sleep(&self, duration: Duration) {
            self.0.borrow_mut().push(Step::Sleep(duration));
        }
    }

    struct TimelineLink {
        inner: MockTransport,
        timeline: Timeline,
    }

    impl TimelineLink {
        fn record(&self, step: Step) {
            self.timeline.borrow_mut().push(step);
        }
    }

    impl ModbusTransport for TimelineLink {
        fn connect(&mut self) -> Result<(), TransportError> {
            self.record(Step::Connect);
            self.inner.connect()
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        fn write_multiple_registers(
            &mut self,
            unit_id: u8,
            start: u16,
            values: &[u16],
        ) -> Result<(), ModbusError> {
            self.record(Step::Write);
            self.inner.write_multiple_registers(unit_id, start, values)
        }

        fn write_single_register(
            &mut self,
            unit_id: u8,
            address: u16,
            value: u16,
        ) -> Result<(), ModbusError> {
            self.record(Step::Write);
            self.inner.write_single_register(unit_id, address, value)
        }

        fn read_holding_registers(
            &mut self,
            unit_id: u8,
            start: u16,
            count: u16,
        ) -> Result<Vec<u16>, ModbusError> {
            self.record(Step::Read);
            self.inner.read_holding_registers(unit_id, start, count)
        }

        fn close(&mut self) {
            if self.inner.is_connected() {
                self.record(Step::Close);
            }
            self.inner.close();
        }
    }

    fn timed(failed_reads: usize) -> (Executor, TimelineLink, Timeline) {
        let timeline = Timeline::default();
        let executor = Executor::with_clock(
            ExecutorConfig {
                settle_delay: Duration::from_secs(10),
                read_backoff: Duration::from_millis(500),
                ..ExecutorConfig::default()
            },
            TimelineClock(Rc::clone(&timeline)),
        );
        let mut inner = MockTransport::new();
        if failed_reads > 0 {
            inner.fail_reads(failed_reads, TIMEOUT);
        }
        let link = TimelineLink {
            inner,
            timeline: Rc::clone(&timeline),
        };
        (executor, link, timeline)
    }

    #[test]
    fn settle_delay_separates_write_from_read_back() {
        let (executor, mut link, timeline) = timed(0);
        let outcome = executor
            .write_and_verify(&mut link, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Confirmed);
        assert_eq!(
            *timeline.borrow(),
            vec![
                Step::Connect,
                Step::Write,
                Step::Sleep(Duration::from_secs(10)),
                Step::Read,
                Step::Close,
            ]
        );
    }

    #[test]
    fn backoff_only_between_failed_attempts() {
        let (executor, mut link, timeline) = timed(2);
        let outcome = executor
            .write_and_verify(&mut link, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Confirmed);
        let backoff = Step::Sleep(Duration::from_millis(500));
        assert_eq!(
            *timeline.borrow(),
            vec![
                Step::Connect,
                Step::Write,
                Step::Sleep(Duration::from_secs(10)),
                Step::Read,
                backoff,
                Step::Read,
                backoff,
                Step::Read,
                Step::Close,
            ]
        );
    }

    #[test]
    fn no_backoff_after_the_last_attempt() {
        let (executor, mut link, timeline) = timed(5);
        let outcome = executor
            .write_and_verify(&mut link, &ControllerProfile::default(), &evolution_frame())
            .unwrap();

        assert_eq!(outcome.status, Status::Unverifiable);
        let steps = timeline.borrow();
        assert_eq!(steps.iter().filter(|s| **s == Step::Read).count(), 3);
        assert_eq!(
            steps
                .iter()
                .filter(|s| **s == Step::Sleep(Duration::from_millis(500)))
                .count(),
            2
        );
        assert_eq!(&steps[steps.len() - 2..], &[Step::Read, Step::Close]);
    }
}
