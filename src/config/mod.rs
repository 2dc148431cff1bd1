// (c) 2024 Ross Younger
//! # Configuration management
//!
//! quicperf obtains run-time configuration from the following sources, in order of increasing priority:
//! 1. Hard-wired defaults
//! 1. The system-wide configuration file (`/etc/quicperf.toml`)
//! 1. The user's configuration file (`~/.quicperf.toml`)
//! 1. Environment variables named `QUICPERF_<FIELD>`, e.g. `QUICPERF_CONGESTION=cubic`
//! 1. A file named with `--config`
//! 1. Command-line options
//!
//! To see which files apply for the current user, run `quicperf --config-files`.
//!
//! ## File format
//!
//! Configuration files are TOML. Algorithm names are case-insensitive.
//!
//! ```toml
//! port = 4433
//! congestion = "cubic"
//! slow_start = "search10"
//! search_exit = true
//! initial_window = 32
//! max_window = 64
//! ```
//!
//! The full list of supported fields is defined by [Configuration].
//! Unknown fields are an error.

mod structure;
pub use structure::{Configuration, Overrides};

mod manager;
pub use manager::{Manager, ENV_PREFIX};
