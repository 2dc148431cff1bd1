//! Time utilities
// (c) 2024 Ross Younger

use std::{
    cmp::max,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use human_repr::HumanDuration;

/// Wall-clock time in milliseconds since the Unix epoch.
///
/// A clock set before 1970 reads as zero.
#[must_use]
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
}

#[derive(Debug, Default, Clone)]
/// A simple named stopwatch.
/// This stopwatch does not support resuming or splits.
pub struct Stopwatch {
    /// Phase name
    pub name: String,
    start_: Option<Instant>,
    stop_: Option<Instant>,
}

impl Stopwatch {
    /// Creates a running stopwatch.
    /// If you wanted a stopped stopwatch, use `::default()`
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            start_: Some(Instant::now()),
            stop_: None,
        }
    }

    /// Stops this stopwatch, returning its elapsed time if it was ever started.
    /// Panics: It is a logic error to call stop more than once.
    pub fn stop(&mut self) -> Option<Duration> {
        assert!(self.stop_.is_none(), "Stopwatch already stopped");
        self.stop_ = Some(Instant::now());
        self.elapsed()
    }

    /// Elapsed time, once stopped
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        Some(self.stop_? - self.start_?)
    }

    /// Stops this stopwatch, starts a new one where it left off
    fn chain(&mut self, new_name: &str) -> Self {
        let _ = self.stop();
        Self {
            name: new_name.to_string(),
            start_: self.stop_,
            stop_: None,
        }
    }

    fn fmt_ln(&self, f: &mut std::fmt::Formatter<'_>, width: usize) -> std::fmt::Result {
        match self.elapsed() {
            Some(t) => writeln!(f, "  {:width$}: {}", self.name, t.human_duration()),
            None => writeln!(f, "  {:width$}: None", self.name),
        }
    }
}

/// A chain of stopwatches, for the `--profile` breakdown of run phases.
#[derive(Debug, Default, Clone)]
pub struct StopwatchChain {
    watches: Vec<Stopwatch>,
}

impl StopwatchChain {
    /// Creates a chain with its first stopwatch running
    #[must_use]
    pub fn new_running(name: &str) -> Self {
        Self {
            watches: vec![Stopwatch::new(name)],
        }
    }

    /// Stops the current stopwatch (if there is one), adds a new stopwatch to the chain and starts it.
    pub fn next(&mut self, name: &str) {
        let new1 = match self.watches.last_mut() {
            None => Stopwatch::new(name),
            Some(latest) => latest.chain(name),
        };
        self.watches.push(new1);
    }

    /// Stops the chain. This is final, you cannot restart or call next().
    pub fn stop(&mut self) {
        let _ = self.watches.last_mut().map(Stopwatch::stop);
    }

    /// Extracts a single stopwatch by name, if it was present
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Stopwatch> {
        self.watches.iter().find(|&sw| sw.name == name)
    }
}

impl std::fmt::Display for StopwatchChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .watches
            .iter()
            .fold(0usize, |acc, sw| max(acc, sw.name.len()));
        for sw in &self.watches {
            sw.fmt_ln(f, width)?;
        }
        Ok(())
    }
}
