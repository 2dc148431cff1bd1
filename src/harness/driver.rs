// The measurement event loop
// (c) 2024 Ross Younger

use std::io::Write;

use quinn::{ReadError, RecvStream, SendStream};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::controller::RunController;
use super::events::{LoopServices, StreamEvents as _, Timer};
use super::latency::Latency;
use crate::util::time::unix_millis;

/// Largest chunk we ask quinn for in one read
const READ_CHUNK_SIZE: usize = 1 << 20;

/// What the loop hands to stream callbacks.
/// Timers live here so that arming them from a callback takes effect on the next loop iteration.
struct Services<'a, L: Write> {
    report: &'a mut Option<Interval>,
    threshold: &'a mut Option<Interval>,
    consumed: &'a mut u64,
    latency: &'a mut Latency<L>,
}

impl<L: Write> LoopServices for Services<'_, L> {
    fn arm(&mut self, timer: Timer) {
        let slot = match timer {
            Timer::Report => &mut *self.report,
            Timer::Threshold => &mut *self.threshold,
        };
        assert!(slot.is_none(), "{timer} timer armed twice");
        let period = timer.period();
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        *slot = Some(interval);
        debug!("armed {timer} timer, period {period:?}");
    }

    fn consume(&mut self, len: u64) {
        // quinn releases flow-control credit as soon as a chunk is read; we only keep the tally
        *self.consumed += len;
    }

    fn first_byte(&mut self) -> std::io::Result<()> {
        self.latency.first_byte()
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            let _ = i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Runs the measurement on an open request stream until the controller stops.
///
/// The controller must already have been started.
/// Returns the number of payload bytes consumed from the stream.
pub(crate) async fn drive<W: Write, L: Write>(
    controller: &mut RunController<W>,
    latency: &mut Latency<L>,
    send: &mut SendStream,
    recv: &mut RecvStream,
) -> anyhow::Result<u64> {
    let shutdown = controller.shutdown_token();
    let mut report = None;
    let mut threshold = None;
    let mut consumed = 0u64;
    let mut recv_open = true;
    let mut send_open = true;
    let mut interrupted = false;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    // Branch order matters: the shutdown intent is checked first,
    // then stream data is processed ahead of any timer that is also due.
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            chunk = recv.read_chunk(READ_CHUNK_SIZE, true), if recv_open => match chunk {
                Ok(Some(chunk)) => {
                    let mut services = Services {
                        report: &mut report,
                        threshold: &mut threshold,
                        consumed: &mut consumed,
                        latency: &mut *latency,
                    };
                    controller.on_data(&chunk.bytes, &mut services)?;
                }
                Ok(None) => {
                    info!("server finished the data stream");
                    recv_open = false;
                    let _ = controller.stop();
                }
                Err(ReadError::Reset(code)) => {
                    controller.on_reset(code.into_inner());
                    recv_open = false;
                }
                Err(ReadError::ConnectionLost(e)) => {
                    warn!("connection lost: {e}");
                    recv_open = false;
                    let _ = controller.stop();
                }
                Err(e) => return Err(e.into()),
            },
            stopped = send.stopped(), if send_open => {
                send_open = false;
                match stopped {
                    Ok(Some(code)) => controller.on_send_stop(code.into_inner()),
                    Ok(None) => trace!("request fully acknowledged"),
                    Err(e) => debug!("request stream: {e}"),
                }
            },
            () = tick(&mut report) => controller.on_report_tick()?,
            () = tick(&mut threshold) => controller.on_threshold_tick(unix_millis())?,
            result = &mut interrupt, if !interrupted => {
                interrupted = true;
                result?;
                info!("interrupted");
                let _ = controller.stop();
            },
        }
    }
    trace!("measurement loop finished, {consumed} bytes consumed");
    Ok(consumed)
}
