//! quicperf server
// (c) 2024 Ross Younger

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use quinn::crypto::rustls::QuicServerConfig;
use quinn::{ConnectionError, EndpointConfig, SendStream, WriteError};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument as _};

use crate::cert::{server_tls_config, Credentials};
use crate::config::Configuration;
use crate::protocol::Request;
use crate::transport::{create_config, Role};
use crate::util::{socket::bind_server, stats::output_statistics, SecretLog};

const PAYLOAD_CHUNK: usize = 64 * 1024;
static PAYLOAD: [u8; PAYLOAD_CHUNK] = [0; PAYLOAD_CHUNK];

/// Creates the server QUIC endpoint, listening on the configured port
pub fn create_endpoint(config: &Configuration, keylog: Option<&Path>) -> Result<quinn::Endpoint> {
    let credentials = Credentials::for_server(Path::new(&config.cert), Path::new(&config.key))?;
    let tls = server_tls_config(&credentials, SecretLog::open_optional(keylog)?)?;
    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(QuicServerConfig::try_from(tls)?));
    let _ = server_config.transport_config(create_config(config, Role::Server)?);

    let socket = bind_server(config.port)?;
    let runtime =
        quinn::default_runtime().ok_or_else(|| anyhow::anyhow!("no async runtime found"))?;
    Ok(quinn::Endpoint::new(
        EndpointConfig::default(),
        Some(server_config),
        socket,
        runtime,
    )?)
}

/// Server entrypoint: serves until interrupted
pub(crate) async fn server_main(config: &Configuration, keylog: Option<&Path>) -> Result<()> {
    let endpoint = create_endpoint(config, keylog)?;
    info!("listening on UDP {}", endpoint.local_addr()?);

    let shutdown = CancellationToken::new();
    let watcher = shutdown.clone();
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            watcher.cancel();
        }
    });
    serve(endpoint, shutdown).await
}

/// Accepts and serves connections until the endpoint closes or `shutdown` is cancelled
pub async fn serve(endpoint: quinn::Endpoint, shutdown: CancellationToken) -> Result<()> {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            incoming = endpoint.accept() => {
                let Some(incoming) = incoming else {
                    debug!("endpoint closed");
                    break;
                };
                let span = info_span!("conn", peer = %incoming.remote_address());
                let _ = tasks.spawn(
                    async move {
                        if let Err(e) = handle_connection(incoming).await {
                            warn!("connection failed: {e:#}");
                        }
                    }
                    .instrument(span),
                );
            }
        }
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                warn!("connection task failed: {e}");
            }
        }
    }

    trace!("closing down");
    endpoint.close(0u32.into(), b"server shutting down");
    tasks.shutdown().await;
    endpoint.wait_idle().await;
    Ok(())
}

async fn handle_connection(incoming: quinn::Incoming) -> Result<()> {
    let connection = incoming.await?;
    info!("connection established");
    let started = Instant::now();
    let mut sent = 0u64;

    loop {
        let (mut send, mut recv) = match connection.accept_bi().await {
            Ok(s) => s,
            Err(
                ConnectionError::ApplicationClosed(_)
                | ConnectionError::ConnectionClosed(_)
                | ConnectionError::LocallyClosed,
            ) => {
                debug!("connection closed");
                break;
            }
            Err(e) => {
                warn!("connection error: {e}");
                break;
            }
        };
        let request = Request::read(&mut recv).await?;
        debug!("client requested {} bytes", request.max_bytes);
        sent += send_payload(&mut send).await?;
    }

    output_statistics(
        "Sent",
        &connection.stats(),
        sent,
        Some(started.elapsed()),
        false,
    );
    Ok(())
}

/// Streams zeroes until the client stops the stream or goes away.
/// Returns the number of payload bytes sent.
async fn send_payload(send: &mut SendStream) -> Result<u64> {
    let chunk = Bytes::from_static(&PAYLOAD);
    let mut sent = 0u64;
    loop {
        match send.write_chunk(chunk.clone()).await {
            Ok(()) => sent += PAYLOAD_CHUNK as u64,
            Err(WriteError::Stopped(code)) => {
                debug!("client stopped the stream (code {code}) after {sent} bytes");
                return Ok(sent);
            }
            Err(WriteError::ConnectionLost(e)) => {
                debug!("connection lost after {sent} bytes: {e}");
                return Ok(sent);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
