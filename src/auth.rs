use crate::error::ProtocolError;
use crate::protocol::{AuthMethod, Version};

/// Greeting is the client's method-selection message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Authentication methods offered by the client, in its order
    pub methods: Vec<u8>,
}

impl Greeting {
    /// selected_method picks the method the server answers with
    pub fn selected_method(&self) -> AuthMethod {
        select_auth_method(&self.methods)
    }
}

/// parse_greeting parses a client greeting from the front of `buf`.
///
/// Returns `Ok(None)` until all `2 + NMETHODS` bytes are present, then the
/// greeting and the number of bytes it used.
pub fn parse_greeting(buf: &[u8]) -> Result<Option<(Greeting, usize)>, ProtocolError> {
    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+
    let Some(&version) = buf.first() else {
        return Ok(None);
    };

    // Ensure version is 0x05 -> SOCKS5
    if version != Version::SOCKS5 as u8 {
        return Err(ProtocolError::InvalidVersion(version));
    }

    let Some(&n_methods) = buf.get(1) else {
        return Ok(None);
    };
    let len = 2 + n_methods as usize;
    if buf.len() < len {
        return Ok(None);
    }

    let greeting = Greeting {
        methods: buf[2..len].to_vec(),
    };

    Ok(Some((greeting, len)))
}

/// select_auth_method takes the auth methods offered by the socks client
/// and returns the one the server will use
fn select_auth_method(client_methods: &[u8]) -> AuthMethod {
    // Preferred auth method order
    const PREFERRED_METHODS: &[AuthMethod] = &[AuthMethod::NoAuth];

    for &preferred in PREFERRED_METHODS {
        if client_methods.contains(&(preferred as u8)) {
            return preferred;
        }
    }

    AuthMethod::NoAcceptable
}
