//! QUIC transport configuration
// (c) 2024 Ross Younger

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::Result;
use human_repr::HumanCount as _;
use quinn::{
    congestion::{CubicConfig, NewRenoConfig},
    TransportConfig,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use strum::VariantNames;
use tracing::{debug, warn};

use crate::config::Configuration;

/// Keepalive interval for the QUIC connection
pub const PROTOCOL_KEEPALIVE: Duration = Duration::from_secs(5);

/// The smallest datagram every QUIC path must carry; congestion windows are specified in these units.
pub const INITIAL_MTU: u64 = 1200;

/// Which end of the connection we are configuring
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum Role {
    /// Receives the data and measures
    Client,
    /// Sends the data
    Server,
}

/// Selects the congestion control algorithm to use
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase")] // N.B. this applies to EnumString, not Display
#[serde(rename_all = "lowercase")]
pub enum CongestionControllerType {
    /// NewReno, the classic loss-based algorithm
    Reno,
    /// CUBIC, as used by most TCP stacks
    Cubic,
}

/// Selects the slow start algorithm.
///
/// These identifiers are passed through to the transport unchanged.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum SlowStartType {
    /// Exponential growth until loss (RFC 2001)
    Rfc2001,
    /// SEARCH, exiting on a 10-bin delivery rate plateau
    Search10,
    /// SEARCH with interpolated bins
    Search10Interp,
    /// SEARCH driven by delivered bytes
    Search10Delv,
    /// Hybla-style RTT-compensated growth
    Hybla,
}

impl SlowStartType {
    /// Is this one of the SEARCH family?
    #[must_use]
    pub fn is_search(self) -> bool {
        matches!(
            self,
            Self::Search10 | Self::Search10Interp | Self::Search10Delv
        )
    }
}

/// Client-side scaling of the flow-control (max data) window growth
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MaxDataGrowth {
    /// Grow the window as the transport sees fit
    None,
    /// Scale growth relative to a reference RTT, in the manner of Hybla
    Hybla,
}

/// Case-insensitive deserialization for our algorithm selectors
fn deserialize_lowercase<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + VariantNames,
{
    let s = String::deserialize(deserializer)?;
    let lower = s.to_ascii_lowercase();
    // requires strum::EnumString && strum::VariantNames && #[strum(serialize_all = "lowercase")]
    T::from_str(&lower).map_err(|_| de::Error::unknown_variant(&s, T::VARIANTS))
}

macro_rules! lowercase_deserialize {
    ($($t:ty),+) => {
        $(
            impl<'de> Deserialize<'de> for $t {
                fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
                where
                    D: Deserializer<'de>,
                {
                    deserialize_lowercase(deserializer)
                }
            }
        )+
    };
}

lowercase_deserialize!(CongestionControllerType, SlowStartType, MaxDataGrowth);

/// Tells the operator about selections the quinn transport cannot honour
fn report_unavailable(params: &Configuration, role: Role) {
    if params.slow_start != SlowStartType::Rfc2001 {
        warn!(
            "slow start algorithm {} is not available in this transport; using rfc2001",
            params.slow_start
        );
    }
    if params.search_exit && !params.slow_start.is_search() {
        debug!(
            "search exit has no effect with slow start {}",
            params.slow_start
        );
    }
    if role == Role::Client && params.client_max_data_growth != MaxDataGrowth::None {
        warn!(
            "max data growth scaling {} is not available in this transport; using none",
            params.client_max_data_growth
        );
    }
}

/// Creates a `quinn::TransportConfig` for the endpoint setup
pub fn create_config(params: &Configuration, role: Role) -> Result<Arc<TransportConfig>> {
    let mut config = TransportConfig::default();
    let _ = config
        .max_concurrent_bidi_streams(1u8.into())
        .max_concurrent_uni_streams(0u8.into())
        .keep_alive_interval(Some(PROTOCOL_KEEPALIVE))
        .allow_spin(true);

    let window = params.max_window_bytes();
    let _ = config
        .receive_window(window.try_into()?)
        .stream_receive_window(window.try_into()?)
        .send_window(window)
        .enable_segmentation_offload(params.gso);

    let initial_window = params.initial_window_bytes();
    match params.congestion {
        CongestionControllerType::Reno => {
            let mut reno = NewRenoConfig::default();
            let _ = reno.initial_window(initial_window);
            let _ = config.congestion_controller_factory(Arc::new(reno));
        }
        CongestionControllerType::Cubic => {
            let mut cubic = CubicConfig::default();
            let _ = cubic.initial_window(initial_window);
            let _ = config.congestion_controller_factory(Arc::new(cubic));
        }
    }
    report_unavailable(params, role);

    debug!(
        "{role} network configuration: {}",
        params.format_transport_config()
    );
    debug!(
        "Windows: initial congestion {iw}, flow control {fc}",
        iw = initial_window.human_count_bytes(),
        fc = window.human_count_bytes(),
    );

    Ok(config.into())
}
