//! Statistics processing and output
// (c) 2024 Ross Younger

use human_repr::{HumanCount, HumanDuration, HumanThroughput};
use quinn::ConnectionStats;
use std::{fmt::Display, time::Duration};
use tracing::{info, warn};

/// Human friendly output helper
#[derive(Debug, Clone, Copy)]
pub struct DataRate {
    /// Bytes per second; if None, we were unable to compute a rate.
    rate: Option<f64>,
}

impl DataRate {
    /// Computes the average rate of a transfer
    #[must_use]
    pub fn new(bytes: u64, time: Option<Duration>) -> Self {
        match time {
            None => Self { rate: None },
            Some(time) if time.is_zero() => Self { rate: None }, // divide by zero is not meaningful
            #[allow(clippy::cast_precision_loss)]
            Some(time) => Self {
                rate: Some((bytes as f64) / time.as_secs_f64()),
            },
        }
    }
    /// Bytes per second, if known
    #[must_use]
    pub fn byte_rate(&self) -> Option<f64> {
        self.rate
    }
}

impl Display for DataRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.byte_rate() {
            None => f.write_str("unknown"),
            Some(rate) => rate.human_throughput_bytes().fmt(f),
        }
    }
}

/// Logs the payload summary, and optionally the QUIC path statistics.
///
/// `verb` describes what this side did with the payload ("Received", "Sent").
pub(crate) fn output_statistics(
    verb: &str,
    stats: &ConnectionStats,
    payload_bytes: u64,
    transport_time: Option<Duration>,
    detailed: bool,
) {
    if stats.path.congestion_events > 0 {
        warn!(
            "Congestion events: {}",
            stats.path.congestion_events.human_count_bare()
        );
    }
    if stats.path.lost_packets > 0 {
        warn!(
            "Lost packets: {} ({})",
            stats.path.lost_packets.human_count_bare(),
            stats.path.lost_bytes.human_count_bytes()
        );
    }
    if detailed {
        info!(
            "Sent packets: {}; final congestion window {}",
            stats.path.sent_packets.human_count_bare(),
            stats.path.cwnd.human_count_bytes()
        );
        info!(
            "Path MTU {}, round-trip time {}",
            stats.path.current_mtu,
            stats.path.rtt.human_duration()
        );
        info!(
            "{} datagrams sent, {} received",
            stats.udp_tx.datagrams.human_count_bare(),
            stats.udp_rx.datagrams.human_count_bare()
        );
        let total_bytes = stats.udp_tx.bytes + stats.udp_rx.bytes;
        if payload_bytes != 0 {
            #[allow(clippy::cast_precision_loss)]
            let overhead_pct =
                100. * (total_bytes.saturating_sub(payload_bytes)) as f64 / payload_bytes as f64;
            info!(
                "{total_bytes} total bytes on the wire for {payload_bytes} bytes payload ({overhead_pct:.2}% overhead)"
            );
        }
    }
    let size = payload_bytes.human_count_bytes();
    let rate = DataRate::new(payload_bytes, transport_time);
    let transport_time_str = transport_time
        .map(|d| d.human_duration().to_string())
        .unwrap_or("unknown".to_string());
    info!("{verb} {size} in {transport_time_str}; average {rate}");
}
