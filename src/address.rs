use crate::error::ProtocolError;
use crate::protocol::AddressType;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

// Fixed DST.ADDR + DST.PORT sizes
const IPV4_FIELD_LEN: usize = 4 + 2;
const IPV6_FIELD_LEN: usize = 16 + 2;

/// Address represents a SOCKS5 destination together with its port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IPv4(Ipv4Addr, u16),
    IPv6(Ipv6Addr, u16),
    DomainName(String, u16),
}

impl Address {
    /// decode parses an address field (address followed by a big-endian port)
    /// of the given type from the front of `buf`.
    ///
    /// Returns `Ok(None)` while `buf` does not yet hold the complete field,
    /// otherwise the address and the number of bytes it occupied. Bytes past
    /// the field are left untouched.
    pub fn decode(
        addr_type: AddressType,
        buf: &[u8],
    ) -> Result<Option<(Address, usize)>, ProtocolError> {
        match addr_type {
            AddressType::IPv4 => {
                if buf.len() < IPV4_FIELD_LEN {
                    return Ok(None);
                }
                let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
                let port = u16::from_be_bytes([buf[4], buf[5]]);

                Ok(Some((Address::IPv4(ip, port), IPV4_FIELD_LEN)))
            }
            AddressType::IPv6 => {
                if buf.len() < IPV6_FIELD_LEN {
                    return Ok(None);
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[..16]);
                let port = u16::from_be_bytes([buf[16], buf[17]]);

                Ok(Some((Address::IPv6(Ipv6Addr::from(octets), port), IPV6_FIELD_LEN)))
            }
            AddressType::DomainName => {
                // First octet contains the number of octets to follow
                let Some(&len) = buf.first() else {
                    return Ok(None);
                };
                let len = len as usize;
                let field_len = 1 + len + 2;
                if buf.len() < field_len {
                    return Ok(None);
                }

                if len == 0 {
                    return Err(ProtocolError::InvalidDomain("empty"));
                }
                let host = std::str::from_utf8(&buf[1..1 + len])
                    .map_err(|_| ProtocolError::InvalidDomain("not valid UTF-8"))?;
                let port = u16::from_be_bytes([buf[1 + len], buf[2 + len]]);

                Ok(Some((Address::DomainName(host.to_owned(), port), field_len)))
            }
        }
    }
}

/// encode_socket_addr writes ATYP, the IP octets and the port of a bound
/// socket address. The address family picks the field width
pub fn encode_socket_addr(addr: &SocketAddr, out: &mut BytesMut) {
    match addr {
        SocketAddr::V4(addr) => {
            out.put_u8(AddressType::IPv4 as u8);
            out.put_slice(&addr.ip().octets());
            out.put_u16(addr.port());
        }
        SocketAddr::V6(addr) => {
            out.put_u8(AddressType::IPv6 as u8);
            out.put_slice(&addr.ip().octets());
            out.put_u16(addr.port());
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::IPv4(ip, port) => write!(f, "{ip}:{port}"),
            Address::IPv6(ip, port) => write!(f, "[{ip}]:{port}"),
            Address::DomainName(host, port) => write!(f, "{host}:{port}"),
        }
    }
}
