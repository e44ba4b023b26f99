//! Upstream connection setup and the connect-error to reply-code table.
//!
//! Operation-canceled and already-in-progress errors are recognised by their
//! errno values, so only on unix. Elsewhere they reply GENERAL_ERROR.

use crate::address::Address;
use crate::protocol::ReplyCode;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, lookup_host};
use tracing::debug;

/// ConnectError describes why an upstream connection could not be opened
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to resolve {host}: {source}")]
    Resolve { host: String, source: io::Error },

    #[error("no addresses found for {0}")]
    Unresolved(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },

    #[error("connect timed out after {0:?}")]
    TimedOut(Duration),
}

impl ConnectError {
    /// reply_code returns the reply to send to the client, or None when the
    /// failure is transient and the connection is dropped without one
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            ConnectError::Resolve { .. } | ConnectError::Unresolved(_) => {
                Some(ReplyCode::HostUnreachable)
            }
            ConnectError::Connect { source, .. } => reply_code_for(source),
            ConnectError::TimedOut(_) => Some(ReplyCode::TtlExpired),
        }
    }
}

/// reply_code_for maps a connect-time socket error to a SOCKS5 reply code.
/// Returns None for conditions that are not reported to the client
pub fn reply_code_for(err: &io::Error) -> Option<ReplyCode> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => Some(ReplyCode::ConnectionRefused),
        io::ErrorKind::HostUnreachable => Some(ReplyCode::HostUnreachable),
        io::ErrorKind::NetworkUnreachable => Some(ReplyCode::NetworkUnreachable),
        _ if is_transient(err) => None,
        _ => Some(ReplyCode::ServerFailure),
    }
}

/// is_transient reports operation-canceled and already-in-progress errors
#[cfg(unix)]
fn is_transient(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EALREADY) | Some(libc::ECANCELED))
}

#[cfg(not(unix))]
fn is_transient(_err: &io::Error) -> bool {
    false
}

/// Connector opens the outbound TCP connection for a CONNECT request
#[derive(Debug, Clone, Copy, Default)]
pub struct Connector {
    connect_timeout: Option<Duration>,
}

impl Connector {
    /// new is a constructor for the Connector type
    pub fn new() -> Self {
        Self::default()
    }

    /// with_connect_timeout bounds resolution and connect together
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// connect resolves `target` if needed and opens a TCP connection to it
    pub async fn connect(&self, target: &Address) -> Result<TcpStream, ConnectError> {
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, resolve_and_connect(target))
                .await
                .map_err(|_| ConnectError::TimedOut(limit))?,
            None => resolve_and_connect(target).await,
        }
    }
}

/// resolve turns a target into the socket addresses to try, in order
pub async fn resolve(target: &Address) -> Result<Vec<SocketAddr>, ConnectError> {
    match target {
        Address::IPv4(ip, port) => Ok(vec![SocketAddr::from((*ip, *port))]),
        Address::IPv6(ip, port) => Ok(vec![SocketAddr::from((*ip, *port))]),
        Address::DomainName(host, port) => {
            let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), *port))
                .await
                .map_err(|source| ConnectError::Resolve {
                    host: host.clone(),
                    source,
                })?
                .collect();

            if addrs.is_empty() {
                return Err(ConnectError::Unresolved(host.clone()));
            }

            debug!("resolved {} to {:?}", host, addrs);
            Ok(addrs)
        }
    }
}

/// resolve_and_connect tries each resolved address until one accepts.
/// The last failure is reported when none does
async fn resolve_and_connect(target: &Address) -> Result<TcpStream, ConnectError> {
    let mut last_err = None;

    for addr in resolve(target).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(source) => {
                debug!("connect to {} failed: {}", addr, source);
                last_err = Some(ConnectError::Connect { addr, source });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ConnectError::Unresolved(target.to_string())))
}
