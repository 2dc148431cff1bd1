//! # quicperf
// (c) 2024 Ross Younger
//!
//! A QUIC throughput and latency measurement harness.
//!
//! Run a server on one host and a client on another:
//!
//! ```text
//! server$ quicperf -s
//! client$ quicperf -c server.example.com -t 5 --cc cubic
//! connection established in 2 ms
//! time to first byte: 3 ms
//! second 0: 953.7 mbit/s (125000000 bytes received)
//! second 1: 954.1 mbit/s (125052416 bytes received)
//! ...
//! ```
//!
//! The server streams data on request; the client measures it.
//! A run ends after a fixed time (`-t`), after a byte count (`-n`),
//! or as soon as the first byte arrives (`-e`).
//!
//! The measurement logic lives in [`harness`]; see there for the output format.
//! Runtime options are described in [`config`].

/// X509 certificate helpers and TLS setup
pub mod cert;
mod cli;
pub use cli::cli;
/// quicperf client
pub mod client;
pub mod config;
pub mod harness;
pub mod protocol;
/// quicperf server
pub mod server;
/// QUIC transport configuration
pub mod transport;
/// Utilities
pub mod util;
