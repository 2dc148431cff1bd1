// Connection establishment and time-to-first-byte measurement
// (c) 2024 Ross Younger

use std::io::Write;
use std::time::{Duration, Instant};

/// Measures latency milestones relative to the moment the client began connecting.
///
/// Each milestone is reported once.
#[derive(Debug)]
pub struct Latency<W: Write> {
    origin: Instant,
    connected: Option<Duration>,
    first_byte: Option<Duration>,
    out: W,
}

impl<W: Write> Latency<W> {
    /// Starts the clock now
    pub fn new(out: W) -> Self {
        Self::with_origin(Instant::now(), out)
    }

    /// Starts the clock at a given instant
    pub fn with_origin(origin: Instant, out: W) -> Self {
        Self {
            origin,
            connected: None,
            first_byte: None,
            out,
        }
    }

    /// The handshake has completed
    pub fn connected(&mut self) -> std::io::Result<()> {
        if self.connected.is_some() {
            return Ok(());
        }
        let elapsed = self.origin.elapsed();
        self.connected = Some(elapsed);
        writeln!(self.out, "connection established in {} ms", elapsed.as_millis())?;
        self.out.flush()
    }

    /// The first application byte has arrived
    pub fn first_byte(&mut self) -> std::io::Result<()> {
        if self.first_byte.is_some() {
            return Ok(());
        }
        let elapsed = self.origin.elapsed();
        self.first_byte = Some(elapsed);
        writeln!(self.out, "time to first byte: {} ms", elapsed.as_millis())?;
        self.out.flush()
    }

    /// Handshake time, if known
    #[must_use]
    pub fn connect_time(&self) -> Option<Duration> {
        self.connected
    }

    /// Time to first byte, if known
    #[must_use]
    pub fn time_to_first_byte(&self) -> Option<Duration> {
        self.first_byte
    }

    /// Consumes the measurement, returning the sink
    pub fn into_output(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use assertables::assert_starts_with;

    use super::Latency;

    #[test]
    fn reports_each_milestone_once() {
        let origin = Instant::now().checked_sub(Duration::from_millis(20)).unwrap();
        let mut uut = Latency::with_origin(origin, Vec::new());
        assert!(uut.time_to_first_byte().is_none());
        uut.connected().unwrap();
        uut.first_byte().unwrap();
        uut.first_byte().unwrap();
        uut.connected().unwrap();

        assert!(uut.connect_time().unwrap() >= Duration::from_millis(20));
        assert!(uut.time_to_first_byte().unwrap() >= uut.connect_time().unwrap());

        let out = String::from_utf8(uut.into_output()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_starts_with!(lines[0], "connection established in ");
        assert_starts_with!(lines[1], "time to first byte: ");
        assert!(lines[1].ends_with(" ms"));
    }
}
