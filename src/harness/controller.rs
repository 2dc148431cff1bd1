// Run lifecycle, reporting and termination
// (c) 2024 Ross Younger

use std::io::Write;
use std::num::NonZeroU32;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::accounting::Accounting;
use super::events::{LoopServices, StreamEvents, Timer};
use super::format::format_size;

/// How a run decides it is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Stop after this many report ticks
    TimeLimited {
        /// Run duration
        runtime_seconds: NonZeroU32,
    },
    /// Stop once strictly more than this many bytes have arrived
    ByteLimited {
        /// Byte target
        max_bytes: u64,
    },
    /// Stop as soon as the first byte arrives
    FirstByteOnly,
}

/// Immutable parameters of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Termination mode
    pub mode: RunMode,
}

impl RunConfig {
    /// Default run duration, in seconds
    pub const DEFAULT_RUNTIME: u32 = 10;

    /// A run that stops after a number of seconds
    #[must_use]
    pub fn time_limited(runtime_seconds: NonZeroU32) -> Self {
        Self {
            mode: RunMode::TimeLimited { runtime_seconds },
        }
    }
    /// A run that stops after a number of bytes
    #[must_use]
    pub fn byte_limited(max_bytes: u64) -> Self {
        Self {
            mode: RunMode::ByteLimited { max_bytes },
        }
    }
    /// A run that only measures latency to the first byte
    #[must_use]
    pub fn first_byte_only() -> Self {
        Self {
            mode: RunMode::FirstByteOnly,
        }
    }

    /// Is byte-count termination in force?
    #[must_use]
    pub fn is_byte_limited(&self) -> bool {
        matches!(self.mode, RunMode::ByteLimited { .. })
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::time_limited(NonZeroU32::new(Self::DEFAULT_RUNTIME).unwrap_or(NonZeroU32::MIN))
    }
}

/// Lifecycle of a run. `Terminating` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    /// Not yet started
    Idle,
    /// Connected, no data yet
    AwaitingFirstByte,
    /// Data is flowing and timers are armed
    Measuring,
    /// Shutdown has been requested
    Terminating,
}

/// Owns all mutable state of a measurement run.
///
/// Every method is called from the single loop task, so nothing here needs a lock.
/// Report lines are written to `out`.
#[derive(Debug)]
pub struct RunController<W: Write> {
    config: RunConfig,
    state: RunState,
    accounting: Accounting,
    first_byte_seen: bool,
    exiting: bool,
    elapsed_seconds: u64,
    shutdown: CancellationToken,
    out: W,
}

impl<W: Write> RunController<W> {
    /// Creates an idle controller writing its report to `out`
    pub fn new(out: W) -> Self {
        Self {
            config: RunConfig::default(),
            state: RunState::Idle,
            accounting: Accounting::default(),
            first_byte_seen: false,
            exiting: false,
            elapsed_seconds: 0,
            shutdown: CancellationToken::new(),
            out,
        }
    }

    /// Begins the run. Call once, after the connection is established.
    pub fn start(&mut self, config: RunConfig) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.state == RunState::Idle,
            "run cannot be started from state {}",
            self.state
        );
        debug!("starting run: {config:?}");
        self.config = config;
        self.state = RunState::AwaitingFirstByte;
        Ok(())
    }

    /// Requests loop shutdown.
    ///
    /// Only the first call has any effect; returns whether this was it.
    pub fn stop(&mut self) -> bool {
        if self.state == RunState::Terminating {
            return false;
        }
        debug!("stop requested in state {}", self.state);
        self.state = RunState::Terminating;
        self.shutdown.cancel();
        true
    }

    /// Has any data arrived yet?
    #[must_use]
    pub fn is_first_byte_seen(&self) -> bool {
        self.first_byte_seen
    }

    /// Token that is cancelled when the run stops. The event loop watches this.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }
    /// Active configuration
    #[must_use]
    pub fn config(&self) -> RunConfig {
        self.config
    }
    /// Read access to the byte counters
    #[must_use]
    pub fn accounting(&self) -> &Accounting {
        &self.accounting
    }
    /// Number of report ticks so far
    #[must_use]
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    /// Consumes the controller, returning the report sink
    pub fn into_output(self) -> W {
        self.out
    }

    /// Periodic report: print the window, advance the clock, check the time limit.
    pub fn on_report_tick(&mut self) -> std::io::Result<()> {
        let window = self.accounting.take_window();
        #[allow(clippy::cast_precision_loss)]
        let rate = format_size(window as f64);
        writeln!(
            self.out,
            "second {}: {rate} ({window} bytes received)",
            self.elapsed_seconds
        )?;
        self.out.flush()?;
        self.elapsed_seconds += 1;

        if let RunMode::TimeLimited { runtime_seconds } = self.config.mode {
            if self.elapsed_seconds >= u64::from(runtime_seconds.get()) {
                let _ = self.stop();
            }
        }
        Ok(())
    }

    /// Byte limit and milestone check. `now_ms` is wall-clock time since the Unix epoch.
    pub fn on_threshold_tick(&mut self, now_ms: u128) -> std::io::Result<()> {
        let RunMode::ByteLimited { max_bytes } = self.config.mode else {
            return Ok(());
        };
        let total = self.accounting.total_bytes();
        if total > max_bytes {
            if !self.exiting {
                writeln!(self.out, "exiting after {total} bytes received")?;
                self.exiting = true;
            }
            let _ = self.stop();
        }
        if let Some(total) = self.accounting.cross_threshold() {
            writeln!(self.out, "byteslog: {now_ms}, {total}")?;
        }
        self.out.flush()
    }
}

impl<W: Write> StreamEvents for RunController<W> {
    fn on_data(
        &mut self,
        payload: &[u8],
        services: &mut dyn LoopServices,
    ) -> std::io::Result<()> {
        assert_ne!(
            self.state,
            RunState::Idle,
            "stream data arrived before the run started"
        );
        if payload.is_empty() {
            trace!("empty data event");
            return Ok(());
        }

        if !self.first_byte_seen {
            self.first_byte_seen = true;
            let _ = self.accounting.take_window();
            if self.state == RunState::AwaitingFirstByte {
                self.state = RunState::Measuring;
            }
            if self.config.mode == RunMode::FirstByteOnly {
                // Measuring lasts only until this stop
                services.first_byte()?;
                let _ = self.stop();
            } else {
                services.arm(Timer::Report);
                if self.config.is_byte_limited() {
                    services.arm(Timer::Threshold);
                }
                services.first_byte()?;
            }
        }

        let len = payload.len() as u64;
        self.accounting.record(len);
        services.consume(len);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::num::NonZeroU32;

    use assertables::{assert_contains, assert_not_contains};

    use super::{RunConfig, RunController, RunState};
    use crate::harness::events::{LoopServices, StreamEvents, Timer};

    /// Records what the controller asked of the loop
    #[derive(Debug, Default)]
    pub(crate) struct RecordingServices {
        pub(crate) armed: Vec<Timer>,
        pub(crate) consumed: Vec<u64>,
        pub(crate) first_bytes: usize,
    }

    impl LoopServices for RecordingServices {
        fn arm(&mut self, timer: Timer) {
            self.armed.push(timer);
        }
        fn consume(&mut self, len: u64) {
            self.consumed.push(len);
        }
        fn first_byte(&mut self) -> std::io::Result<()> {
            self.first_bytes += 1;
            Ok(())
        }
    }

    fn started(config: RunConfig) -> RunController<Vec<u8>> {
        let mut uut = RunController::new(Vec::new());
        uut.start(config).unwrap();
        uut
    }

    fn output(uut: RunController<Vec<u8>>) -> String {
        String::from_utf8(uut.into_output()).unwrap()
    }

    fn seconds(n: u32) -> RunConfig {
        RunConfig::time_limited(NonZeroU32::new(n).unwrap())
    }

    #[test]
    fn lifecycle() {
        let mut uut = RunController::new(Vec::new());
        assert_eq!(uut.state(), RunState::Idle);
        uut.start(seconds(3)).unwrap();
        assert_eq!(uut.state(), RunState::AwaitingFirstByte);
        let _ = uut.start(seconds(3)).unwrap_err();

        let mut svc = RecordingServices::default();
        uut.on_data(&[0; 10], &mut svc).unwrap();
        assert_eq!(uut.state(), RunState::Measuring);
        assert!(uut.stop());
        assert_eq!(uut.state(), RunState::Terminating);
        assert!(uut.shutdown_token().is_cancelled());
    }

    #[test]
    #[should_panic(expected = "before the run started")]
    fn data_before_start_is_fatal() {
        let mut uut = RunController::new(Vec::new());
        let mut svc = RecordingServices::default();
        let _ = uut.on_data(&[1], &mut svc);
    }

    #[test]
    fn totals_are_the_sum_of_lengths() {
        let mut uut = started(seconds(10));
        let mut svc = RecordingServices::default();
        let lengths = [1usize, 1200, 0, 65536, 3, 0, 17];
        let mut previous = 0;
        for len in lengths {
            uut.on_data(&vec![0u8; len], &mut svc).unwrap();
            assert!(uut.accounting().total_bytes() >= previous);
            previous = uut.accounting().total_bytes();
        }
        let sum: u64 = lengths.iter().map(|l| *l as u64).sum();
        assert_eq!(uut.accounting().total_bytes(), sum);
        // one acknowledgement per non-empty event, with the exact length
        assert_eq!(svc.consumed, vec![1, 1200, 65536, 3, 17]);
    }

    #[test]
    fn empty_data_changes_nothing() {
        let mut uut = started(RunConfig::byte_limited(100));
        let mut svc = RecordingServices::default();
        uut.on_data(&[], &mut svc).unwrap();
        assert!(!uut.is_first_byte_seen());
        assert_eq!(uut.state(), RunState::AwaitingFirstByte);
        assert!(svc.armed.is_empty());
        assert!(svc.consumed.is_empty());

        uut.on_data(&[0; 5], &mut svc).unwrap();
        let before = *uut.accounting();
        uut.on_data(&[], &mut svc).unwrap();
        assert_eq!(*uut.accounting(), before);
    }

    #[test]
    fn timers_armed_once() {
        let mut uut = started(seconds(10));
        let mut svc = RecordingServices::default();
        for _ in 0..50 {
            uut.on_data(&[0; 1000], &mut svc).unwrap();
        }
        assert!(uut.is_first_byte_seen());
        assert_eq!(svc.armed, vec![Timer::Report]);
        assert_eq!(svc.first_bytes, 1);
    }

    #[test]
    fn byte_limited_arms_threshold_monitor() {
        let mut uut = started(RunConfig::byte_limited(1_000));
        let mut svc = RecordingServices::default();
        uut.on_data(&[0; 10], &mut svc).unwrap();
        uut.on_data(&[0; 10], &mut svc).unwrap();
        assert_eq!(svc.armed, vec![Timer::Report, Timer::Threshold]);
    }

    #[test]
    fn report_line_format() {
        let mut uut = started(seconds(10));
        let mut svc = RecordingServices::default();
        uut.on_data(&[0; 192], &mut svc).unwrap();
        uut.on_report_tick().unwrap();
        uut.on_report_tick().unwrap();
        assert_eq!(uut.accounting().window_bytes(), 0);
        assert_eq!(uut.accounting().total_bytes(), 192);
        assert_eq!(
            output(uut),
            "second 0: 1.5 kbit/s (192 bytes received)\nsecond 1: 0 bit/s (0 bytes received)\n"
        );
    }

    #[test]
    fn time_limit_stops_at_tenth_tick() {
        let mut uut = started(seconds(10));
        let token = uut.shutdown_token();
        let mut svc = RecordingServices::default();
        uut.on_data(&[0; 4096], &mut svc).unwrap();
        for tick in 1..=10 {
            assert!(!token.is_cancelled(), "stopped early at tick {tick}");
            assert_eq!(uut.state(), RunState::Measuring);
            uut.on_data(&[0; 4096], &mut svc).unwrap();
            uut.on_report_tick().unwrap();
        }
        assert!(token.is_cancelled());
        assert_eq!(uut.state(), RunState::Terminating);
        assert_eq!(uut.elapsed_seconds(), 10);

        // the tenth tick was the one effective stop
        assert!(!uut.stop());
        uut.on_report_tick().unwrap();
        assert!(!uut.stop());
        assert_eq!(uut.state(), RunState::Terminating);
        assert_eq!(output(uut).lines().count(), 11);
    }

    #[test]
    fn stream_control_frames_change_nothing() {
        let mut uut = started(RunConfig::byte_limited(10_000));
        let mut svc = RecordingServices::default();
        uut.on_send_stop(7);
        uut.on_reset(7);
        assert_eq!(uut.state(), RunState::AwaitingFirstByte);
        assert!(!uut.is_first_byte_seen());

        uut.on_data(&[0; 300], &mut svc).unwrap();
        let accounting = *uut.accounting();
        uut.on_reset(0);
        uut.on_send_stop(0);
        assert_eq!(*uut.accounting(), accounting);
        assert_eq!(uut.state(), RunState::Measuring);
        assert!(!uut.shutdown_token().is_cancelled());

        // data still counts after a reset
        uut.on_data(&[0; 200], &mut svc).unwrap();
        assert_eq!(uut.accounting().total_bytes(), 500);
        assert_eq!(svc.armed, vec![Timer::Report, Timer::Threshold]);
    }

    #[test]
    fn byte_limit_milestones_and_termination() {
        let mut uut = started(RunConfig::byte_limited(5_000_000));
        let mut svc = RecordingServices::default();
        let chunk = vec![0u8; 100_000];
        let mut now = 1_700_000_000_000u128;
        while uut.accounting().total_bytes() < 5_500_000 {
            uut.on_data(&chunk, &mut svc).unwrap();
            uut.on_threshold_tick(now).unwrap();
            now += 5;
        }
        // a few more ticks before the loop would actually halt
        for _ in 0..3 {
            uut.on_threshold_tick(now).unwrap();
        }
        assert_eq!(uut.state(), RunState::Terminating);
        let out = output(uut);
        let milestones: Vec<_> = out.lines().filter(|l| l.starts_with("byteslog: ")).collect();
        assert_eq!(milestones.len(), 5);
        assert!(milestones[0].ends_with(", 1100000"));
        assert!(milestones[4].ends_with(", 5100000"));
        assert_eq!(out.matches("exiting after").count(), 1);
        assert_contains!(out, "exiting after 5100000 bytes received\n");
    }

    #[test]
    fn byte_limited_report_does_not_stop() {
        let mut uut = started(RunConfig::byte_limited(u64::MAX));
        let mut svc = RecordingServices::default();
        uut.on_data(&[0; 10], &mut svc).unwrap();
        for _ in 0..100 {
            uut.on_report_tick().unwrap();
        }
        assert_eq!(uut.state(), RunState::Measuring);
    }

    #[test]
    fn threshold_tick_ignored_when_not_byte_limited() {
        let mut uut = started(seconds(1));
        let mut svc = RecordingServices::default();
        uut.on_data(&vec![0; 2_000_000], &mut svc).unwrap();
        uut.on_threshold_tick(1).unwrap();
        assert_not_contains!(output(uut), "byteslog");
    }

    #[test]
    fn repeated_stop_is_a_no_op() {
        let mut uut = started(seconds(10));
        let token = uut.shutdown_token();
        assert!(uut.stop());
        assert!(!uut.stop());
        assert!(!uut.stop());
        assert!(token.is_cancelled());
        assert_eq!(uut.state(), RunState::Terminating);
    }

    #[test]
    fn first_byte_only_terminates_immediately() {
        let mut uut = started(RunConfig::first_byte_only());
        let mut svc = RecordingServices::default();
        uut.on_data(&[], &mut svc).unwrap();
        assert_eq!(uut.state(), RunState::AwaitingFirstByte);
        uut.on_data(&[42], &mut svc).unwrap();
        assert_eq!(uut.state(), RunState::Terminating);
        assert!(uut.shutdown_token().is_cancelled());
        assert!(svc.armed.is_empty());
        assert_eq!(svc.first_bytes, 1);
        assert_eq!(output(uut), "");
    }
}
