use crate::connector::Connector;
use crate::session::Session;
use anyhow::{Result, bail};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span, warn};

// Pause after a failed accept so descriptor exhaustion does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Socks5Server represents a SOCKS5 server and houses related
/// configuration data
pub struct Socks5Server {
    pub listen_addr: SocketAddr,
    connector: Connector,
    listener: Option<TcpListener>,
}

impl Socks5Server {
    /// new is a constructor for the Socks5Server type
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            connector: Connector::new(),
            listener: None,
        }
    }

    /// with_connect_timeout bounds how long a request may spend resolving
    /// and connecting to its destination
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connector = self.connector.with_connect_timeout(timeout);
        self
    }

    /// bind to the listen address and return the address actually bound
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            bail!("[ERR] server is already bound to {}", self.listen_addr);
        }

        let listener = TcpListener::bind(self.listen_addr).await?;
        let addr = listener.local_addr()?;

        info!("SOCKS5 proxy listening on {}", addr);

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run accepts connections forever, one session task per client
    pub async fn run(mut self) -> Result<()> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => {
                self.bind().await?;
                match self.listener.take() {
                    Some(listener) => listener,
                    None => bail!("[ERR] listener missing after bind"),
                }
            }
        };

        loop {
            let (inbound, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let session = Session::new(inbound, self.connector);
            let span = info_span!("session", peer = %peer_addr);

            tokio::spawn(
                async move {
                    info!("new client");

                    if let Err(e) = session.run().await {
                        warn!("session failed: {:#}", e);
                    }
                }
                .instrument(span),
            );
        }
    }
}
