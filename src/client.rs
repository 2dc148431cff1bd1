// quicperf client
// (c) 2024 Ross Younger

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{ConnectionStats, EndpointConfig};
use tokio::time::timeout;
use tracing::{debug, info, trace, trace_span, warn, Instrument as _};

use crate::cert::client_tls_config;
use crate::config::Configuration;
use crate::harness::{driver, Latency, RunConfig, RunController, RunMode, RunState};
use crate::protocol::Request;
use crate::transport::{create_config, Role};
use crate::util::{
    lookup_host_by_family, socket::bind_unspecified_for, stats::output_statistics,
    time::StopwatchChain, AddressFamily, SecretLog,
};

const TRANSFER: &str = "transfer";

/// What the client has been asked to do
#[derive(Debug, Clone)]
pub struct Job {
    /// Server host name or address
    pub host: String,
    /// Restricts name resolution to an address family
    pub family: AddressFamily,
    /// When to stop measuring
    pub run: RunConfig,
    /// NSS key log destination
    pub keylog: Option<PathBuf>,
}

impl Job {
    /// The byte count to put in the request
    #[must_use]
    pub fn requested_bytes(&self) -> u64 {
        match self.run.mode {
            RunMode::ByteLimited { max_bytes } => max_bytes,
            RunMode::TimeLimited { .. } | RunMode::FirstByteOnly => 0,
        }
    }
}

/// The results of a completed measurement
#[derive(Debug)]
pub struct Outcome<W> {
    /// Where the controller ended up
    pub state: RunState,
    /// Payload bytes received
    pub total_bytes: u64,
    /// Per-second reports printed
    pub elapsed_seconds: u64,
    /// Handshake completion, relative to the start of the connection attempt
    pub connect_time: Option<Duration>,
    /// First payload byte, relative to the start of the connection attempt
    pub time_to_first_byte: Option<Duration>,
    /// Time spent in the measurement loop
    pub transfer_time: Option<Duration>,
    /// QUIC statistics, as of connection close
    pub stats: ConnectionStats,
    /// Phase breakdown
    pub timers: StopwatchChain,
    /// The report sink, handed back
    pub report: W,
    /// The latency sink, handed back
    pub latency: W,
}

/// Creates the client QUIC endpoint for reaching the given server
pub(crate) fn create_endpoint(
    config: &Configuration,
    server: &SocketAddr,
    keylog: Option<&Path>,
) -> Result<quinn::Endpoint> {
    let tls = client_tls_config(SecretLog::open_optional(keylog)?)?;
    let mut client_config = quinn::ClientConfig::new(Arc::new(QuicClientConfig::try_from(tls)?));
    let _ = client_config.transport_config(create_config(config, Role::Client)?);

    let socket = bind_unspecified_for(server)?;
    let runtime =
        quinn::default_runtime().ok_or_else(|| anyhow::anyhow!("no async runtime found"))?;
    let mut endpoint = quinn::Endpoint::new(EndpointConfig::default(), None, socket, runtime)?;
    endpoint.set_default_client_config(client_config);
    Ok(endpoint)
}

/// Connects to the server, runs one measurement and closes down.
///
/// Report lines go to `report`; connection and first-byte latency lines go to `latency`.
pub async fn measure<W: Write>(
    config: &Configuration,
    job: &Job,
    report: W,
    latency: W,
) -> Result<Outcome<W>> {
    let mut timers = StopwatchChain::new_running("setup");
    let ip = lookup_host_by_family(&job.host, job.family)?;
    let server = SocketAddr::new(ip, config.port);
    let endpoint = create_endpoint(config, &server, job.keylog.as_deref())?;
    debug!("Local endpoint address is {}", endpoint.local_addr()?);

    timers.next("connect");
    let mut latency = Latency::new(latency);
    debug!("Opening QUIC connection to {server}");
    let connection = timeout(
        config.timeout_duration(),
        endpoint.connect(server, &job.host)?,
    )
    .await
    .with_context(|| "UDP connection to QUIC endpoint timed out")??;
    latency.connected()?;
    info!("connected to {server}");

    let mut controller = RunController::new(report);
    controller.start(job.run)?;

    timers.next(TRANSFER);
    let (mut send, mut recv) = connection.open_bi().await?;
    let request = Request::new(job.requested_bytes());
    send.write_all(&request.encode()).await?;
    send.finish()?;
    trace!("sent {request:?}");

    let result = driver::drive(&mut controller, &mut latency, &mut send, &mut recv)
        .instrument(trace_span!("measure"))
        .await;

    timers.next("shutdown");
    // Tell the server to stop sending, then tear down the connection.
    let _ = recv.stop(0u32.into());
    connection.close(0u32.into(), b"finished");
    let _ = timeout(config.timeout_duration(), endpoint.wait_idle())
        .await
        .inspect_err(|_| warn!("QUIC shutdown timed out")); // otherwise ignore errors
    timers.stop();

    let consumed = result?;
    let total_bytes = controller.accounting().total_bytes();
    debug_assert_eq!(consumed, total_bytes);

    Ok(Outcome {
        state: controller.state(),
        total_bytes,
        elapsed_seconds: controller.elapsed_seconds(),
        connect_time: latency.connect_time(),
        time_to_first_byte: latency.time_to_first_byte(),
        transfer_time: timers.find(TRANSFER).and_then(crate::util::time::Stopwatch::elapsed),
        stats: connection.stats(),
        timers,
        report: controller.into_output(),
        latency: latency.into_output(),
    })
}

/// Client entrypoint: runs the measurement with output to stdout
pub(crate) async fn client_main(
    config: &Configuration,
    job: &Job,
    statistics: bool,
    profile: bool,
) -> Result<bool> {
    let outcome = measure(config, job, anstream::stdout(), anstream::stdout()).await?;
    output_statistics(
        "Received",
        &outcome.stats,
        outcome.total_bytes,
        outcome.transfer_time,
        statistics,
    );
    if profile {
        info!("Elapsed time by phase:\n{}", outcome.timers);
    }
    Ok(outcome.state == RunState::Terminating)
}
