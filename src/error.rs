use crate::protocol::ReplyCode;
use thiserror::Error;

/// ProtocolError is a violation of the SOCKS5 handshake or request
/// format detected while parsing client bytes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("not SOCKS5: version byte 0x{0:02x}")]
    InvalidVersion(u8),

    #[error("no acceptable authentication method offered")]
    NoAcceptableMethod,

    #[error("reserved byte is not zero: 0x{0:02x}")]
    NonZeroReserved(u8),

    #[error("command not supported: 0x{0:02x}")]
    UnsupportedCommand(u8),

    #[error("address type not supported: 0x{0:02x}")]
    UnsupportedAddressType(u8),

    #[error("invalid domain name: {0}")]
    InvalidDomain(&'static str),
}

impl ProtocolError {
    /// reply_code returns the reply the client is owed for this violation,
    /// or None when the connection is closed without one
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            // The client has not been told to expect a reply yet
            ProtocolError::InvalidVersion(_) => None,
            // Already answered with the NO ACCEPTABLE METHODS selection
            ProtocolError::NoAcceptableMethod => None,
            ProtocolError::NonZeroReserved(_) | ProtocolError::UnsupportedCommand(_) => {
                Some(ReplyCode::CommandNotSupported)
            }
            ProtocolError::UnsupportedAddressType(_) => Some(ReplyCode::AddrTypeUnsupported),
            ProtocolError::InvalidDomain(_) => Some(ReplyCode::HostUnreachable),
        }
    }
}
