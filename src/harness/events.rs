// Stream event interfaces between the transport loop and the harness
// (c) 2024 Ross Younger

use std::time::Duration;

use tracing::warn;

/// The timers a run may arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Timer {
    /// Per-second throughput report
    Report,
    /// Byte limit and milestone checks
    Threshold,
}

impl Timer {
    /// Firing cadence. The first firing is one period after arming.
    #[must_use]
    pub const fn period(self) -> Duration {
        match self {
            Timer::Report => Duration::from_secs(1),
            Timer::Threshold => Duration::from_millis(5),
        }
    }
}

/// Services the event loop offers to stream callbacks.
pub trait LoopServices {
    /// Schedules a repeating timer. The loop must not see the same timer armed twice.
    fn arm(&mut self, timer: Timer);
    /// Acknowledges that `len` bytes of stream data have been consumed, releasing flow-control credit.
    fn consume(&mut self, len: u64);
    /// First application byte notification, for latency measurement
    fn first_byte(&mut self) -> std::io::Result<()>;
}

/// Callbacks the transport invokes on a receiving stream
pub trait StreamEvents {
    /// Stream data has arrived. `payload` may be empty.
    fn on_data(&mut self, payload: &[u8], services: &mut dyn LoopServices)
        -> std::io::Result<()>;
    /// The peer asked us to stop sending (`STOP_SENDING`)
    fn on_send_stop(&mut self, error_code: u64) {
        log_send_stop(error_code);
    }
    /// The peer abandoned its sending side (`RESET_STREAM`)
    fn on_reset(&mut self, error_code: u64) {
        log_reset(error_code);
    }
}

/// Diagnostic for a `STOP_SENDING` frame. Not an error.
fn log_send_stop(error_code: u64) {
    warn!("received STOP_SENDING: {error_code}");
}

/// Diagnostic for a `RESET_STREAM` frame. Not an error.
fn log_reset(error_code: u64) {
    warn!("received RESET_STREAM: {error_code}");
}
