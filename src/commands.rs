use crate::address::Address;
use crate::error::ProtocolError;
use crate::protocol::{AddressType, Command, RSV, Version};

// VER, CMD, RSV, ATYP
const REQUEST_HEADER_LEN: usize = 4;

/// ParsedRequest is a validated client request. Only CONNECT requests
/// make it this far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub command: Command,
    pub target: Address,
}

/// parse_request parses a client request from the front of `buf`.
///
/// The fixed header is validated as soon as it is complete, so an
/// unsupported command or address type is rejected without waiting for
/// the address field. Returns `Ok(None)` while more bytes are needed.
pub fn parse_request(buf: &[u8]) -> Result<Option<(ParsedRequest, usize)>, ProtocolError> {
    // SOCKS5 request format
    // +----+-----+-------+------+----------+----------+
    // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    if buf.len() < REQUEST_HEADER_LEN {
        return Ok(None);
    }
    let (version, command, reserved, atyp) = (buf[0], buf[1], buf[2], buf[3]);

    // Ensure version is 0x05 -> SOCKS5
    if version != Version::SOCKS5 as u8 {
        return Err(ProtocolError::InvalidVersion(version));
    }

    if reserved != RSV {
        return Err(ProtocolError::NonZeroReserved(reserved));
    }

    // BIND and UDP ASSOCIATE are recognised but not served
    let command = match Command::from_byte(command) {
        Some(Command::Connect) => Command::Connect,
        _ => return Err(ProtocolError::UnsupportedCommand(command)),
    };

    let addr_type =
        AddressType::from_byte(atyp).ok_or(ProtocolError::UnsupportedAddressType(atyp))?;

    let Some((target, used)) = Address::decode(addr_type, &buf[REQUEST_HEADER_LEN..])? else {
        return Ok(None);
    };

    Ok(Some((ParsedRequest { command, target }, REQUEST_HEADER_LEN + used)))
}
