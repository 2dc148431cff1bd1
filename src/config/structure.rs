//! Configuration structure
// (c) 2024 Ross Younger

use std::time::Duration;

use anyhow::ensure;
use clap::Args;
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Metadata, Profile, Provider,
};
use human_repr::HumanCount as _;
use serde::{Deserialize, Serialize};

use crate::transport::{CongestionControllerType, MaxDataGrowth, SlowStartType, INITIAL_MTU};

/// The set of configurable options supported by quicperf.
///
/// **Note:** The implementation of `default()` for this struct returns the hard-wired configuration defaults.
///
/// Every field may be set in a configuration file or the environment.
/// The command line equivalents live in [`Overrides`].
// Maintainer note: None of the members of this struct should be Option<anything>; absence is expressed by Overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// UDP port the server listens on, and the client connects to
    pub port: u16,
    /// Run time for a time-limited measurement, in seconds
    pub time: u32,
    /// Congestion control algorithm
    pub congestion: CongestionControllerType,
    /// Slow start algorithm
    pub slow_start: SlowStartType,
    /// Whether SEARCH slow start may exit early
    pub search_exit: bool,
    /// Client-side max data growth scaling
    pub client_max_data_growth: MaxDataGrowth,
    /// Initial congestion window, in packets
    pub initial_window: u32,
    /// Maximum flow control window, in megabytes
    pub max_window: u32,
    /// Generic segmentation offload (Linux only)
    pub gso: bool,
    /// Connection and shutdown timeout, in seconds
    pub timeout: u16,
    /// Server certificate chain (PEM)
    pub cert: String,
    /// Server private key (PEM)
    pub key: String,
}

impl Default for Configuration {
    /// **(Unusual!)**
    /// Returns the hard-wired configuration defaults.
    fn default() -> Self {
        Self {
            port: 18080,
            time: 10,
            congestion: CongestionControllerType::Reno,
            slow_start: SlowStartType::Rfc2001,
            search_exit: false,
            client_max_data_growth: MaxDataGrowth::None,
            initial_window: 10,
            max_window: 16,
            gso: false,
            timeout: 5,
            cert: "server.crt".into(),
            key: "server.key".into(),
        }
    }
}

impl Configuration {
    /// Field names, as they appear in configuration files and (upper-cased) in the environment
    pub const FIELDS: &[&str] = &[
        "port",
        "time",
        "congestion",
        "slow_start",
        "search_exit",
        "client_max_data_growth",
        "initial_window",
        "max_window",
        "gso",
        "timeout",
        "cert",
        "key",
    ];

    /// Checks values the type system cannot
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.time >= 1, "run time must be at least 1 second");
        ensure!(
            self.initial_window >= 1,
            "initial window must be at least 1 packet"
        );
        ensure!(self.max_window >= 1, "max window must be at least 1 MB");
        ensure!(self.timeout >= 1, "timeout must be at least 1 second");
        ensure!(
            !self.gso || cfg!(target_os = "linux"),
            "generic segmentation offload is only available on Linux"
        );
        Ok(())
    }

    /// Initial congestion window in bytes
    #[must_use]
    pub fn initial_window_bytes(&self) -> u64 {
        u64::from(self.initial_window) * INITIAL_MTU
    }

    /// Flow control window in bytes
    #[must_use]
    pub fn max_window_bytes(&self) -> u64 {
        u64::from(self.max_window) * 1024 * 1024
    }

    /// Accessor for `timeout`, as a Duration
    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout.into())
    }

    /// Formats the transport-related options for display
    #[must_use]
    pub fn format_transport_config(&self) -> String {
        format!(
            "congestion {cc} with slow start {ss} (search exit {se}), max data growth {mdg}, initial window {iw} packets ({iwb}), max window {mwb}, gso {gso}",
            cc = self.congestion,
            ss = self.slow_start,
            se = self.search_exit,
            mdg = self.client_max_data_growth,
            iw = self.initial_window,
            iwb = self.initial_window_bytes().human_count_bytes(),
            mwb = self.max_window_bytes().human_count_bytes(),
            gso = self.gso,
        )
    }
}

fn parse_search_exit(s: &str) -> Result<bool, String> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(format!("expected 0 or 1, not `{s}`")),
    }
}

/// Command-line overrides for [`Configuration`].
///
/// Anything left unset here falls through to the lower-priority sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args, Serialize)]
pub struct Overrides {
    /// UDP port to listen on, or to connect to [default: 18080]
    #[arg(short = 'p', long, value_name = "port", help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Measurement run time in seconds [default: 10]
    #[arg(short = 't', long, value_name = "secs", value_parser = clap::value_parser!(u32).range(1..), help_heading("Run"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u32>,

    /// Congestion control algorithm [default: reno]
    #[arg(long = "cc", value_name = "alg", value_enum, help_heading("Transport"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub congestion: Option<CongestionControllerType>,

    /// Slow start algorithm [default: rfc2001]
    #[arg(long = "ss", value_name = "alg", value_enum, help_heading("Transport"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_start: Option<SlowStartType>,

    /// Whether SEARCH slow start may exit early [default: 0]
    #[arg(long = "searchexit", value_name = "0|1", value_parser = parse_search_exit, help_heading("Transport"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_exit: Option<bool>,

    /// Client max data growth scaling [default: none]
    #[arg(long = "cmdg", value_name = "alg", value_enum, help_heading("Transport"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_max_data_growth: Option<MaxDataGrowth>,

    /// Initial congestion window, in packets [default: 10]
    #[arg(long = "iw", value_name = "packets", value_parser = clap::value_parser!(u32).range(1..), help_heading("Transport"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_window: Option<u32>,

    /// Maximum flow control window, in megabytes [default: 16]
    #[arg(long = "mw", value_name = "MB", value_parser = clap::value_parser!(u32).range(1..), help_heading("Transport"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_window: Option<u32>,

    /// Enables generic segmentation offload (Linux only)
    #[arg(short = 'g', long, help_heading("Transport"))]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub gso: bool,

    /// Connection and shutdown timeout in seconds [default: 5]
    #[arg(long, value_name = "secs", value_parser = clap::value_parser!(u16).range(1..), help_heading("Connection"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u16>,

    /// Server certificate chain, PEM format [default: server.crt]
    ///
    /// If neither this nor the key exists, the server generates a self-signed certificate.
    #[arg(long, value_name = "FILE", help_heading("TLS"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,

    /// Server private key, PEM format [default: server.key]
    #[arg(long, value_name = "FILE", help_heading("TLS"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Overrides {
    const META_NAME: &str = "command line";
}

impl Provider for Overrides {
    fn metadata(&self) -> Metadata {
        Metadata::named(Self::META_NAME)
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}

#[cfg(test)]
mod test {
    use super::{Configuration, Overrides};
    use crate::transport::CongestionControllerType;

    #[test]
    fn defaults_are_valid() {
        let c = Configuration::default();
        c.validate().unwrap();
        assert_eq!(c.initial_window_bytes(), 12_000);
        assert_eq!(c.max_window_bytes(), 16 * 1024 * 1024);
        assert_eq!(c.timeout_duration().as_secs(), 5);
    }

    #[test]
    fn field_list_is_complete() {
        let j: serde_json::Value = serde_json::to_value(Configuration::default()).unwrap();
        let keys = j.as_object().unwrap();
        assert_eq!(keys.len(), Configuration::FIELDS.len());
        for f in Configuration::FIELDS {
            assert!(keys.contains_key(*f), "{f}");
        }
    }

    #[test]
    fn invalid_values() {
        for c in [
            Configuration {
                time: 0,
                ..Default::default()
            },
            Configuration {
                initial_window: 0,
                ..Default::default()
            },
            Configuration {
                max_window: 0,
                ..Default::default()
            },
            Configuration {
                timeout: 0,
                ..Default::default()
            },
        ] {
            let _ = c.validate().unwrap_err();
        }
    }

    #[test]
    fn unset_overrides_serialize_to_nothing() {
        let j = serde_json::to_string(&Overrides::default()).unwrap();
        assert_eq!(j, "{}");
        let o = Overrides {
            congestion: Some(CongestionControllerType::Cubic),
            gso: true,
            ..Default::default()
        };
        let j = serde_json::to_string(&o).unwrap();
        assert_eq!(j, r#"{"congestion":"cubic","gso":true}"#);
    }

    #[test]
    fn search_exit_flag() {
        assert_eq!(super::parse_search_exit("1"), Ok(true));
        assert_eq!(super::parse_search_exit("0"), Ok(false));
        assert!(super::parse_search_exit("yes").is_err());
    }
}
