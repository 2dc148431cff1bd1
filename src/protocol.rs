//! On-the-wire request format
// (c) 2024 Ross Younger
//!
//! The client opens a single bidirectional stream and sends one [`Request`],
//! then finishes its side of the stream.
//! The server answers with a stream of payload bytes that runs until the client stops it
//! (with `STOP_SENDING`) or closes the connection.
//!
//! ```text
//! +--------+--------+--------+--------+-----------------------------+
//! |  'Q'   |  'P'   |  'R'   |  'F'   |  requested bytes (u64, BE)   |
//! +--------+--------+--------+--------+-----------------------------+
//! ```
//!
//! A requested byte count of 0 means "no limit".

use anyhow::ensure;
use bytes::{Buf as _, BufMut as _, Bytes, BytesMut};
use quinn::RecvStream;

/// ALPN protocol identifier negotiated during the TLS handshake
pub const ALPN: &[u8] = b"quicperf";

const MAGIC: &[u8; 4] = b"QPRF";

/// A measurement request, sent from client to server
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Request {
    /// The number of bytes the client intends to receive (0 for no limit)
    pub max_bytes: u64,
}

impl Request {
    /// Encoded length of every request
    pub const WIRE_LENGTH: usize = 12;

    /// Constructor
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Serializes this request
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::WIRE_LENGTH);
        buf.put_slice(MAGIC);
        buf.put_u64(self.max_bytes);
        buf.freeze()
    }

    /// Deserializes a request
    pub fn decode(mut buf: &[u8]) -> anyhow::Result<Self> {
        ensure!(
            buf.len() == Self::WIRE_LENGTH,
            "request has wrong length {}",
            buf.len()
        );
        ensure!(buf.starts_with(MAGIC), "request has wrong magic number");
        buf.advance(MAGIC.len());
        Ok(Self {
            max_bytes: buf.get_u64(),
        })
    }

    /// Reads a request from the stream
    pub async fn read(recv: &mut RecvStream) -> anyhow::Result<Self> {
        let mut buf = [0u8; Self::WIRE_LENGTH];
        recv.read_exact(&mut buf).await?;
        Self::decode(&buf)
    }
}
