use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Side names one end of a relayed tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

/// RelayStats summarises a finished relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes forwarded from the client to the upstream
    pub from_client: u64,
    /// Bytes forwarded from the upstream to the client
    pub from_upstream: u64,
    /// The side whose end-of-stream ended the relay
    pub closed_by: Side,
}

/// Relay pumps bytes between an established client connection and its
/// upstream connection.
///
/// The first side to reach end-of-stream or fail ends the relay, and both
/// connections are shut down. Writes always complete in full: a slow
/// receiver stalls its pump instead of losing data.
pub struct Relay<C, U> {
    client: C,
    upstream: U,
    pending: Bytes,
}

impl<C, U> Relay<C, U>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    /// new is a constructor for the Relay type
    pub fn new(client: C, upstream: U) -> Self {
        Self {
            client,
            upstream,
            pending: Bytes::new(),
        }
    }

    /// with_pending queues client bytes that arrived before the relay started.
    /// They reach the upstream ahead of anything read afterwards
    pub fn with_pending(mut self, pending: Bytes) -> Self {
        self.pending = pending;
        self
    }

    /// run relays until either side closes, then tears down both
    pub async fn run(self) -> io::Result<RelayStats> {
        let Relay {
            client,
            upstream,
            pending,
        } = self;

        let (mut client_rx, mut client_tx) = tokio::io::split(client);
        let (mut upstream_rx, mut upstream_tx) = tokio::io::split(upstream);

        let mut from_client = 0u64;
        let mut from_upstream = 0u64;

        if !pending.is_empty() {
            debug!("forwarding {} early bytes upstream", pending.len());
            upstream_tx.write_all(&pending).await?;
            upstream_tx.flush().await?;
            from_client += pending.len() as u64;
        }

        let finished = tokio::select! {
            res = pump(&mut client_rx, &mut upstream_tx, &mut from_client) => res.map(|()| Side::Client),
            res = pump(&mut upstream_rx, &mut client_tx, &mut from_upstream) => res.map(|()| Side::Upstream),
        };

        // Tear down both directions whichever side finished
        let _ = client_tx.shutdown().await;
        let _ = upstream_tx.shutdown().await;

        let closed_by = finished?;
        debug!("relay closed by {:?}", closed_by);

        Ok(RelayStats {
            from_client,
            from_upstream,
            closed_by,
        })
    }
}

/// pump copies from `reader` to `writer` until end-of-stream, counting
/// every byte the writer accepted
async fn pump<R, W>(reader: &mut R, writer: &mut W, total: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *total += n as u64;
    }
}
