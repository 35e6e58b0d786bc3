//! Discovery datagram layout shared by the server responder and the client scanner
//!
//! A scan is a single request datagram holding the literal `Marco`. Every
//! advertising server answers with:
//!
//! ```text
//! +--------+-----------------+---------------------------+
//! | "Polo" | game port (BE)  | server name bytes ...     |
//! | 4 B    | 2 B             | datagram len - 6 B        |
//! +--------+-----------------+---------------------------+
//! ```
//!
//! The name carries no length field and no terminator. Receivers derive its
//! length from the datagram size and cut it to their own name capacity.

/// Literal payload of a discovery request datagram
pub const DISCOVERY_REQUEST: &[u8] = b"Marco";

/// Magic prefix every discovery response starts with
pub const RESPONSE_MAGIC: &[u8] = b"Polo";

/// Longest server name, in bytes, carried in an advertisement
pub const MAX_NAME_LEN: usize = 64;

const PORT_LEN: usize = 2;

/// Self-description a server puts into every discovery response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    name: String,
    game_port: u16,
}

impl ServerDescriptor {
    /// Creates a descriptor, cutting the name to [`MAX_NAME_LEN`] bytes
    ///
    /// The cut never splits a UTF-8 sequence, so the stored name may be a few
    /// bytes shorter than the limit.
    pub fn new(name: &str, game_port: u16) -> Self {
        let mut end = name.len().min(MAX_NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        Self {
            name: name[..end].to_string(),
            game_port,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn game_port(&self) -> u16 {
        self.game_port
    }

    /// Builds the complete response datagram for this descriptor
    pub fn encode_response(&self) -> Vec<u8> {
        let mut datagram =
            Vec::with_capacity(RESPONSE_MAGIC.len() + PORT_LEN + self.name.len());
        datagram.extend_from_slice(RESPONSE_MAGIC);
        datagram.extend_from_slice(&self.game_port.to_be_bytes());
        datagram.extend_from_slice(self.name.as_bytes());
        datagram
    }
}

/// Returns true if the datagram is exactly a discovery request
pub fn is_discovery_request(datagram: &[u8]) -> bool {
    datagram == DISCOVERY_REQUEST
}

/// Parses a discovery response
///
/// Returns `None` for anything that does not start with [`RESPONSE_MAGIC`]
/// or is too short to carry a port. The name is cut to `name_capacity`
/// bytes and ends at the first NUL byte if a sender padded it.
pub fn decode_response(datagram: &[u8], name_capacity: usize) -> Option<ServerDescriptor> {
    let rest = datagram.strip_prefix(RESPONSE_MAGIC)?;
    if rest.len() < PORT_LEN {
        return None;
    }

    let (port, name) = rest.split_at(PORT_LEN);
    let game_port = u16::from_be_bytes([port[0], port[1]]);

    let name = &name[..name.len().min(name_capacity)];
    let name = match name.iter().position(|&b| b == 0) {
        Some(nul) => &name[..nul],
        None => name,
    };

    Some(ServerDescriptor {
        name: String::from_utf8_lossy(name).into_owned(),
        game_port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_layout() {
        let descriptor = ServerDescriptor::new("SuperServer", 6001);
        let datagram = descriptor.encode_response();

        assert_eq!(&datagram[..4], b"Polo");
        assert_eq!(&datagram[4..6], &[0x17, 0x71]);
        assert_eq!(&datagram[6..], b"SuperServer");
    }

    #[test]
    fn test_decode_response() {
        let datagram = ServerDescriptor::new("SuperServer", 6001).encode_response();
        let decoded = decode_response(&datagram, MAX_NAME_LEN).unwrap();

        assert_eq!(decoded.name(), "SuperServer");
        assert_eq!(decoded.game_port(), 6001);
    }

    #[test]
    fn test_decode_rejects_wrong_magic() {
        assert!(decode_response(b"Pola\x17\x71SuperServer", MAX_NAME_LEN).is_none());
        assert!(decode_response(b"Marco", MAX_NAME_LEN).is_none());
        assert!(decode_response(b"", MAX_NAME_LEN).is_none());
    }

    #[test]
    fn test_decode_rejects_missing_port() {
        assert!(decode_response(b"Polo", MAX_NAME_LEN).is_none());
        assert!(decode_response(b"Polo\x17", MAX_NAME_LEN).is_none());
    }

    #[test]
    fn test_decode_empty_name() {
        let decoded = decode_response(b"Polo\x00\x50", MAX_NAME_LEN).unwrap();
        assert_eq!(decoded.name(), "");
        assert_eq!(decoded.game_port(), 80);
    }

    #[test]
    fn test_decode_truncates_to_capacity() {
        let decoded = decode_response(b"Polo\x00\x01abcdefgh", 3).unwrap();
        assert_eq!(decoded.name(), "abc");
    }

    #[test]
    fn test_decode_stops_at_nul_padding() {
        let decoded = decode_response(b"Polo\x00\x01abc\0\0\0\0", MAX_NAME_LEN).unwrap();
        assert_eq!(decoded.name(), "abc");
    }

    #[test]
    fn test_descriptor_name_is_bounded() {
        let long_name = "x".repeat(MAX_NAME_LEN * 2);
        let descriptor = ServerDescriptor::new(&long_name, 1);
        assert_eq!(descriptor.name().len(), MAX_NAME_LEN);

        // 'é' is two bytes; 63 ASCII bytes plus one 'é' must not be split
        let multibyte = format!("{}é", "a".repeat(MAX_NAME_LEN - 1));
        let descriptor = ServerDescriptor::new(&multibyte, 1);
        assert_eq!(descriptor.name().len(), MAX_NAME_LEN - 1);
    }

    #[test]
    fn test_discovery_request_must_match_exactly() {
        assert!(is_discovery_request(b"Marco"));
        assert!(!is_discovery_request(b"Marco\0"));
        assert!(!is_discovery_request(b"Marc"));
        assert!(!is_discovery_request(b"Polo"));
    }
}
