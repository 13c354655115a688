//! Packet type tags.
//!
//! Every chunk starts with a four-character ASCII tag. Unknown tags are
//! carried through as [`PacketType::Unknown`] instead of failing, so an
//! unrecognised client message never tears down the connection.

use std::fmt;

// ── PacketType ───────────────────────────────────────────────────

/// All chunk types understood by the VConsole protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Application info block (server → client, handshake 1/3).
    Ainf,
    /// Add-on / server name (server → client, handshake 2/3).
    Adon,
    /// Channel list (server → client, handshake 3/3).
    Chan,
    /// Console command text (client → server).
    Cmnd,
    /// Console output line (server → client).
    Prnt,
    /// Any tag this implementation does not know.
    Unknown([u8; 4]),
}

impl PacketType {
    pub const AINF: [u8; 4] = *b"AINF";
    pub const ADON: [u8; 4] = *b"ADON";
    pub const CHAN: [u8; 4] = *b"CHAN";
    pub const CMND: [u8; 4] = *b"CMND";
    pub const PRNT: [u8; 4] = *b"PRNT";

    /// The four tag bytes as they appear on the wire.
    pub fn tag(&self) -> [u8; 4] {
        match self {
            PacketType::Ainf => Self::AINF,
            PacketType::Adon => Self::ADON,
            PacketType::Chan => Self::CHAN,
            PacketType::Cmnd => Self::CMND,
            PacketType::Prnt => Self::PRNT,
            PacketType::Unknown(tag) => *tag,
        }
    }

    /// Returns `true` for the types a server sends and never expects back.
    pub fn is_server_to_client(&self) -> bool {
        matches!(
            self,
            PacketType::Ainf | PacketType::Adon | PacketType::Chan | PacketType::Prnt
        )
    }
}

impl From<[u8; 4]> for PacketType {
    fn from(tag: [u8; 4]) -> Self {
        match tag {
            Self::AINF => PacketType::Ainf,
            Self::ADON => PacketType::Adon,
            Self::CHAN => PacketType::Chan,
            Self::CMND => PacketType::Cmnd,
            Self::PRNT => PacketType::Prnt,
            other => PacketType::Unknown(other),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tags are ASCII on a well-behaved peer; anything else is escaped.
        for b in self.tag() {
            write!(f, "{}", std::ascii::escape_default(b))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_roundtrip() {
        for ty in [
            PacketType::Ainf,
            PacketType::Adon,
            PacketType::Chan,
            PacketType::Cmnd,
            PacketType::Prnt,
        ] {
            assert_eq!(PacketType::from(ty.tag()), ty);
        }
    }

    #[test]
    fn unknown_tag_is_preserved() {
        let ty = PacketType::from(*b"XXXX");
        assert_eq!(ty, PacketType::Unknown(*b"XXXX"));
        assert_eq!(ty.tag(), *b"XXXX");
        assert_eq!(ty.to_string(), "XXXX");
    }

    #[test]
    fn display_escapes_binary_tags() {
        let ty = PacketType::from([0x00, b'A', 0xFF, b'B']);
        assert_eq!(ty.to_string(), "\\x00A\\xffB");
    }

    #[test]
    fn direction() {
        assert!(PacketType::Prnt.is_server_to_client());
        assert!(!PacketType::Cmnd.is_server_to_client());
        assert!(!PacketType::Unknown(*b"XXXX").is_server_to_client());
    }
}
