// (c) 2024 Ross Younger
//! # Measurement harness
//!
//! This is the heart of quicperf. The client's event loop feeds stream events into a
//! [`RunController`], which keeps the byte accounting, prints the per-second report,
//! logs byte milestones and decides when the run is over.
//!
//! Everything runs on a single task. Stream data is dispatched before any timer that
//! fell due in the same loop iteration, and a stop request is seen before the next dispatch.
//!
//! ## Output
//!
//! These lines are written to stdout and are intended to be machine-readable:
//!
//! ```text
//! second 0: 953.7 mbit/s (125000000 bytes received)
//! byteslog: 1733400000123, 1000512
//! exiting after 5000960 bytes received
//! ```

mod accounting;
pub use accounting::{Accounting, THRESHOLD_INCREMENT};

mod controller;
pub use controller::{RunConfig, RunController, RunMode, RunState};

pub(crate) mod driver;

mod events;
pub use events::{LoopServices, StreamEvents, Timer};

mod format;
pub use format::format_size;

mod latency;
pub use latency::Latency;
