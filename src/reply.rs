use crate::address::encode_socket_addr;
use crate::protocol::{AuthMethod, RSV, ReplyCode, Version};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::{Ipv4Addr, SocketAddr};

/// method_selection builds the server's answer to a client greeting
pub fn method_selection(method: AuthMethod) -> [u8; 2] {
    // ServerChoice method selection reply format
    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    [Version::SOCKS5 as u8, method as u8]
}

/// Reply is the server's answer to a client request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub code: ReplyCode,
    pub bound_addr: SocketAddr,
}

impl Reply {
    /// success carries the local address of the outbound socket
    pub fn success(bound_addr: SocketAddr) -> Self {
        Self {
            code: ReplyCode::Succeeded,
            bound_addr,
        }
    }

    /// failure carries an all-zero IPv4 bound address
    pub fn failure(code: ReplyCode) -> Self {
        Self {
            code,
            bound_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        }
    }

    /// encode serializes the reply for the wire
    pub fn encode(&self) -> Bytes {
        // SOCKS5 reply format
        // +----+-----+-------+------+----------+----------+
        // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        let mut reply = BytesMut::with_capacity(4 + 16 + 2);
        reply.put_u8(Version::SOCKS5 as u8);
        reply.put_u8(self.code as u8);
        reply.put_u8(RSV);
        encode_socket_addr(&self.bound_addr, &mut reply);

        reply.freeze()
    }
}
