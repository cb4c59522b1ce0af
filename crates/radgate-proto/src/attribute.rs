//! RADIUS attributes

use std::net::Ipv4Addr;

/// Standard attribute types this core reads or writes.
///
/// The codec itself carries any type octet; this enum names the ones
/// the handlers care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttributeType {
    /// User-Name
    UserName = 1,
    /// User-Password (encrypted on the wire)
    UserPassword = 2,
    /// NAS-IP-Address
    NasIpAddress = 4,
    /// Service-Type
    ServiceType = 6,
    /// Framed-IP-Address
    FramedIpAddress = 8,
    /// Reply-Message
    ReplyMessage = 18,
    /// Session-Timeout
    SessionTimeout = 27,
    /// Called-Station-Id
    CalledStationId = 30,
    /// Calling-Station-Id (subscriber MAC on hotspot NASes)
    CallingStationId = 31,
    /// NAS-Identifier
    NasIdentifier = 32,
    /// Acct-Status-Type
    AcctStatusType = 40,
    /// Acct-Delay-Time
    AcctDelayTime = 41,
    /// Acct-Input-Octets
    AcctInputOctets = 42,
    /// Acct-Output-Octets
    AcctOutputOctets = 43,
    /// Acct-Session-Id
    AcctSessionId = 44,
    /// Acct-Session-Time
    AcctSessionTime = 46,
    /// Acct-Terminate-Cause
    AcctTerminateCause = 49,
    /// Acct-Input-Gigawords
    AcctInputGigawords = 52,
    /// Acct-Output-Gigawords
    AcctOutputGigawords = 53,
    /// Event-Timestamp
    EventTimestamp = 55,
}

/// A single attribute: type octet plus raw value.
///
/// Values are capped at 253 bytes by the wire format (one-byte length
/// that includes the two-byte header).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute type octet
    pub typ: u8,
    /// Raw value bytes
    pub value: Vec<u8>,
}

/// Attribute construction error
#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    /// Value exceeds the 253-byte wire limit
    #[error("attribute value too long: {0} bytes")]
    TooLong(usize),
}

impl Attribute {
    /// New attribute from raw bytes
    pub fn new(typ: u8, value: Vec<u8>) -> Result<Self, AttributeError> {
        if value.len() > 253 {
            return Err(AttributeError::TooLong(value.len()));
        }
        Ok(Self { typ, value })
    }

    /// Text attribute
    pub fn string(typ: AttributeType, s: &str) -> Result<Self, AttributeError> {
        Self::new(typ as u8, s.as_bytes().to_vec())
    }

    /// 32-bit integer attribute (network byte order)
    pub fn u32(typ: AttributeType, v: u32) -> Self {
        Self {
            typ: typ as u8,
            value: v.to_be_bytes().to_vec(),
        }
    }

    /// IPv4 address attribute
    pub fn ipv4(typ: AttributeType, addr: Ipv4Addr) -> Self {
        Self {
            typ: typ as u8,
            value: addr.octets().to_vec(),
        }
    }

    /// Value as UTF-8 text, if it is any
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// Value as a 32-bit network-order integer
    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Value as an IPv4 address
    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().ok()?;
        Some(Ipv4Addr::from(bytes))
    }

    /// Wire length including the two-byte header
    pub fn wire_len(&self) -> usize {
        2 + self.value.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let a = Attribute::string(AttributeType::UserName, "alice").unwrap();
        assert_eq!(a.as_str(), Some("alice"));

        let t = Attribute::u32(AttributeType::SessionTimeout, 3600);
        assert_eq!(t.as_u32(), Some(3600));

        // 0x80 in the high byte is not valid UTF-8
        let big = Attribute::u32(AttributeType::AcctInputOctets, 0x8000_0000);
        assert_eq!(big.as_str(), None);

        let ip = Attribute::ipv4(AttributeType::NasIpAddress, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(ip.as_ipv4(), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_too_long_rejected() {
        assert!(Attribute::new(26, vec![0u8; 254]).is_err());
        assert!(Attribute::new(26, vec![0u8; 253]).is_ok());
    }
}
