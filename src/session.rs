use crate::auth::parse_greeting;
use crate::commands::{ParsedRequest, parse_request};
use crate::connector::Connector;
use crate::error::ProtocolError;
use crate::protocol::{AuthMethod, ReplyCode};
use crate::relay::Relay;
use crate::reply::{Reply, method_selection};
use anyhow::{Result, anyhow};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

// Upper bound on client bytes buffered while the upstream connect is in flight
const MAX_EARLY_DATA: usize = 64 * 1024;

/// State is the protocol phase of a session. It only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum State {
    Greeting,
    Request,
    Relay,
}

/// Session drives one accepted client connection through the SOCKS5
/// greeting and request, then hands both sockets to the [`Relay`].
///
/// Client bytes accumulate in an owned buffer and a message is only parsed
/// once the buffer holds all of it, however the transport split it up.
/// Each message is consumed exactly; surplus bytes carry over to the next
/// state and are never parsed twice.
pub struct Session<S> {
    client: S,
    state: State,
    buffer: BytesMut,
    connector: Connector,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// new is a constructor for the Session type
    pub fn new(client: S, connector: Connector) -> Self {
        Self {
            client,
            state: State::Greeting,
            buffer: BytesMut::with_capacity(512),
            connector,
        }
    }

    #[cfg(test)]
    fn state(&self) -> State {
        self.state
    }

    /// run handles the full client/server SOCKS5 protocol flow. It returns
    /// once the tunnel is closed or the session failed; either way both
    /// connections are released
    pub async fn run(mut self) -> Result<()> {
        // Greeting
        let greeting = match self.read_message(parse_greeting).await {
            Ok(Some(greeting)) => greeting,
            Ok(None) => {
                debug!("client closed during greeting");
                return Ok(());
            }
            Err(e) => return Err(self.fail(None, e).await),
        };

        let method = greeting.selected_method();
        self.write_flush(&method_selection(method)).await?;
        if method == AuthMethod::NoAcceptable {
            return Err(self.fail(None, ProtocolError::NoAcceptableMethod.into()).await);
        }
        self.transition(State::Request);

        // Request
        let request = match self.read_message(parse_request).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("client closed during request");
                return Ok(());
            }
            Err(e) => {
                let code = e
                    .downcast_ref::<ProtocolError>()
                    .and_then(ProtocolError::reply_code);
                return Err(self.fail(code, e).await);
            }
        };
        debug!("CONNECT {}", request.target);

        let Some(upstream) = self.connect(&request).await? else {
            return Ok(());
        };

        let bound_addr = match upstream.local_addr() {
            Ok(addr) => addr,
            Err(e) => return Err(self.fail(Some(ReplyCode::ServerFailure), e.into()).await),
        };
        self.write_flush(&Reply::success(bound_addr).encode()).await?;
        info!("tunnel established to {} from {}", request.target, bound_addr);
        self.transition(State::Relay);

        // Relay
        let pending = self.buffer.split().freeze();
        let stats = Relay::new(self.client, upstream)
            .with_pending(pending)
            .run()
            .await?;

        info!(
            "connection closed by {:?}: {} bytes from client, {} bytes from server",
            stats.closed_by, stats.from_client, stats.from_upstream
        );

        Ok(())
    }

    /// connect opens the upstream connection for `request` while watching the
    /// client. Returns None when the session ended without a tunnel and
    /// without an error worth reporting
    async fn connect(&mut self, request: &ParsedRequest) -> Result<Option<TcpStream>> {
        let connector = self.connector;
        let connect = connector.connect(&request.target);
        tokio::pin!(connect);

        let outcome = loop {
            tokio::select! {
                outcome = &mut connect => break outcome,
                read = self.client.read_buf(&mut self.buffer) => {
                    // Returning drops the connect future, cancelling it
                    match read? {
                        0 => {
                            debug!("client closed while connecting to {}", request.target);
                            return Ok(None);
                        }
                        n => debug!("buffered {} early bytes", n),
                    }
                    if self.buffer.len() > MAX_EARLY_DATA {
                        let err = anyhow!(
                            "client sent more than {} bytes before the tunnel was established",
                            MAX_EARLY_DATA
                        );
                        return Err(self.fail(None, err).await);
                    }
                }
            }
        };

        match outcome {
            Ok(upstream) => Ok(Some(upstream)),
            Err(e) => match e.reply_code() {
                Some(code) => Err(self.fail(Some(code), anyhow!(e)).await),
                None => {
                    debug!("dropping client after transient connect failure: {}", e);
                    let _ = self.client.shutdown().await;
                    Ok(None)
                }
            },
        }
    }

    /// read_message reads from the client until `parse` recognises a complete
    /// message at the front of the buffer, then consumes exactly that message.
    /// Returns None if the client closes first
    async fn read_message<T, F>(&mut self, parse: F) -> Result<Option<T>>
    where
        F: Fn(&[u8]) -> Result<Option<(T, usize)>, ProtocolError>,
    {
        loop {
            if let Some((message, used)) = parse(&self.buffer[..])? {
                self.buffer.advance(used);
                return Ok(Some(message));
            }

            if self.client.read_buf(&mut self.buffer).await? == 0 {
                return Ok(None);
            }
        }
    }

    /// fail sends a failure reply when one is owed, closes the client and
    /// hands back the error for the caller to return
    async fn fail(&mut self, code: Option<ReplyCode>, err: anyhow::Error) -> anyhow::Error {
        if let Some(code) = code {
            if let Err(e) = self.write_flush(&Reply::failure(code).encode()).await {
                debug!("failed to send {:?} reply: {}", code, e);
            }
        }
        let _ = self.client.shutdown().await;

        err
    }

    async fn write_flush(&mut self, bytes: &[u8]) -> Result<()> {
        self.client.write_all(bytes).await?;
        self.client.flush().await?;
        Ok(())
    }

    fn transition(&mut self, next: State) {
        debug_assert!(next > self.state, "session state moved backwards");
        debug!("state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
