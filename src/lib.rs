//! A lightweight asynchronous SOCKS5 proxy library
//!
//! ## SOCKS5 Implementation
//!
//! - Features:
//!     - CONNECT over IPv4, IPv6 and domain name destinations
//!     - No Authentication
//!     - One tokio task per client, no state shared between clients
//!     - Length-gated reassembly of handshake messages split across reads
//!     - BIND and UDP ASSOCIATE answered with "command not supported"
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//!
//! # Example
//! ```no_run
//! use socks5d::Socks5Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Socks5Server::new("127.0.0.1:1080".parse()?);
//!     server.run().await
//! }
//! ```

pub mod address;
pub mod auth;
pub mod commands;
pub mod connector;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod reply;
pub mod server;
pub mod session;

// Re-export main types at crate root for convenience
pub use address::Address;
pub use connector::Connector;
pub use error::ProtocolError;
pub use protocol::{AddressType, AuthMethod, Command, ReplyCode, Version};
pub use server::Socks5Server;
pub use session::Session;
