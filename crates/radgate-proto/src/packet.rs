//! RADIUS packet encoding and decoding

use crate::acct::AcctStatusType;
use crate::attribute::{Attribute, AttributeType};
use bytes::{BufMut, BytesMut};
use std::net::Ipv4Addr;

/// RADIUS header length: code, id, length, authenticator
pub const HEADER_LEN: usize = 20;
/// Largest packet we will emit or accept (RFC 2865 §3)
pub const MAX_PACKET_LEN: usize = 4096;

/// Packet code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Code {
    /// Access-Request
    AccessRequest = 1,
    /// Access-Accept
    AccessAccept = 2,
    /// Access-Reject
    AccessReject = 3,
    /// Accounting-Request
    AccountingRequest = 4,
    /// Accounting-Response
    AccountingResponse = 5,
    /// Disconnect-Request (RFC 5176)
    DisconnectRequest = 40,
    /// Disconnect-ACK
    DisconnectAck = 41,
    /// Disconnect-NAK
    DisconnectNak = 42,
}

impl Code {
    /// Parse a code octet
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::AccessRequest),
            2 => Some(Self::AccessAccept),
            3 => Some(Self::AccessReject),
            4 => Some(Self::AccountingRequest),
            5 => Some(Self::AccountingResponse),
            40 => Some(Self::DisconnectRequest),
            41 => Some(Self::DisconnectAck),
            42 => Some(Self::DisconnectNak),
            _ => None,
        }
    }
}

/// Wire format errors
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// Packet shorter than its header or declared length
    #[error("truncated packet: {0} bytes")]
    Truncated(usize),
    /// Declared length out of bounds
    #[error("invalid length field: {0}")]
    InvalidLength(usize),
    /// Unknown packet code
    #[error("unknown packet code: {0}")]
    UnknownCode(u8),
    /// Attribute ran past the end of the packet
    #[error("attribute overrun at offset {0}")]
    AttributeOverrun(usize),
    /// Packet would exceed the wire maximum
    #[error("packet too large: {0} bytes")]
    TooLarge(usize),
}

/// A decoded RADIUS packet
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet code
    pub code: Code,
    /// Identifier for request/response matching
    pub identifier: u8,
    /// 16-byte authenticator field
    pub authenticator: [u8; 16],
    /// Attributes in wire order
    pub attributes: Vec<Attribute>,
}

impl Packet {
    /// New packet with no attributes
    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Self {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    /// Append an attribute
    pub fn add_attribute(&mut self, attr: Attribute) {
        self.attributes.push(attr);
    }

    /// Decode from wire bytes.
    ///
    /// The declared length wins: trailing bytes beyond it are ignored
    /// (RFC 2865 treats them as padding), but a buffer shorter than
    /// the declared length is an error.
    pub fn decode(data: &[u8]) -> Result<Self, ProtoError> {
        if data.len() < HEADER_LEN {
            return Err(ProtoError::Truncated(data.len()));
        }
        let code = Code::from_u8(data[0]).ok_or(ProtoError::UnknownCode(data[0]))?;
        let identifier = data[1];
        let declared = u16::from_be_bytes([data[2], data[3]]) as usize;
        if declared < HEADER_LEN || declared > MAX_PACKET_LEN {
            return Err(ProtoError::InvalidLength(declared));
        }
        if data.len() < declared {
            return Err(ProtoError::Truncated(data.len()));
        }

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..20]);

        let mut attributes = Vec::new();
        let mut off = HEADER_LEN;
        while off < declared {
            if declared - off < 2 {
                return Err(ProtoError::AttributeOverrun(off));
            }
            let typ = data[off];
            let len = data[off + 1] as usize;
            if len < 2 || off + len > declared {
                return Err(ProtoError::AttributeOverrun(off));
            }
            attributes.push(Attribute {
                typ,
                value: data[off + 2..off + len].to_vec(),
            });
            off += len;
        }

        Ok(Self {
            code,
            identifier,
            authenticator,
            attributes,
        })
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        let total = HEADER_LEN + self.attributes.iter().map(|a| a.wire_len()).sum::<usize>();
        if total > MAX_PACKET_LEN {
            return Err(ProtoError::TooLarge(total));
        }
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(self.code as u8);
        buf.put_u8(self.identifier);
        buf.put_u16(total as u16);
        buf.put_slice(&self.authenticator);
        for attr in &self.attributes {
            buf.put_u8(attr.typ);
            buf.put_u8(attr.wire_len() as u8);
            buf.put_slice(&attr.value);
        }
        Ok(buf.to_vec())
    }

    /// First attribute of the given type
    pub fn attribute(&self, typ: AttributeType) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.typ == typ as u8)
    }

    /// User-Name, if present and textual
    pub fn user_name(&self) -> Option<&str> {
        self.attribute(AttributeType::UserName)?.as_str()
    }

    /// Raw (encrypted) User-Password value
    pub fn user_password(&self) -> Option<&[u8]> {
        self.attribute(AttributeType::UserPassword)
            .map(|a| a.value.as_slice())
    }

    /// Acct-Status-Type, if present and valid
    pub fn acct_status_type(&self) -> Option<AcctStatusType> {
        AcctStatusType::from_u32(self.attribute(AttributeType::AcctStatusType)?.as_u32()?)
    }

    /// Acct-Session-Id
    pub fn acct_session_id(&self) -> Option<&str> {
        self.attribute(AttributeType::AcctSessionId)?.as_str()
    }

    /// NAS-IP-Address
    pub fn nas_ip(&self) -> Option<Ipv4Addr> {
        self.attribute(AttributeType::NasIpAddress)?.as_ipv4()
    }

    /// Framed-IP-Address
    pub fn framed_ip(&self) -> Option<Ipv4Addr> {
        self.attribute(AttributeType::FramedIpAddress)?.as_ipv4()
    }

    /// A u32 attribute by type
    pub fn u32_attribute(&self, typ: AttributeType) -> Option<u32> {
        self.attribute(typ)?.as_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Packet {
        let mut p = Packet::new(Code::AccessRequest, 7, [0xab; 16]);
        p.add_attribute(Attribute::string(AttributeType::UserName, "alice").unwrap());
        p.add_attribute(Attribute::u32(AttributeType::SessionTimeout, 3600));
        p.add_attribute(Attribute::ipv4(
            AttributeType::NasIpAddress,
            Ipv4Addr::new(192, 168, 1, 1),
        ));
        p
    }

    #[test]
    fn test_encode_decode() {
        let p = sample_request();
        let wire = p.encode().unwrap();
        assert_eq!(wire[0], 1);
        assert_eq!(wire[1], 7);

        let back = Packet::decode(&wire).unwrap();
        assert_eq!(back.code, Code::AccessRequest);
        assert_eq!(back.identifier, 7);
        assert_eq!(back.authenticator, [0xab; 16]);
        assert_eq!(back.user_name(), Some("alice"));
        assert_eq!(back.u32_attribute(AttributeType::SessionTimeout), Some(3600));
        assert_eq!(back.nas_ip(), Some(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn test_known_wire_decodes() {
        // Access-Request, id 1, zero authenticator, User-Name "bob"
        let wire =
            hex::decode("01010019000000000000000000000000000000000105626f62").unwrap();
        let p = Packet::decode(&wire).unwrap();
        assert_eq!(p.code, Code::AccessRequest);
        assert_eq!(p.identifier, 1);
        assert_eq!(p.user_name(), Some("bob"));
        assert_eq!(p.encode().unwrap(), wire);
    }

    #[test]
    fn test_runt_rejected() {
        assert!(matches!(
            Packet::decode(&[1, 0, 0]),
            Err(ProtoError::Truncated(3))
        ));
    }

    #[test]
    fn test_declared_length_wins() {
        let p = sample_request();
        let mut wire = p.encode().unwrap();
        // Trailing garbage beyond the declared length is padding
        wire.extend_from_slice(&[0xff; 8]);
        let back = Packet::decode(&wire).unwrap();
        assert_eq!(back.attributes.len(), 3);
    }

    #[test]
    fn test_attribute_overrun_rejected() {
        let p = Packet::new(Code::AccessRequest, 1, [0; 16]);
        let mut wire = p.encode().unwrap();
        // Claim an attribute that runs past the declared end
        wire.extend_from_slice(&[1, 30, b'x']);
        let total = wire.len() as u16;
        wire[2..4].copy_from_slice(&total.to_be_bytes());
        assert!(matches!(
            Packet::decode(&wire),
            Err(ProtoError::AttributeOverrun(_))
        ));
    }

    #[test]
    fn test_unknown_attribute_preserved() {
        let mut p = Packet::new(Code::AccessRequest, 1, [0; 16]);
        // Vendor-Specific (26), opaque payload
        p.add_attribute(Attribute::new(26, vec![1, 2, 3, 4]).unwrap());
        let back = Packet::decode(&p.encode().unwrap()).unwrap();
        assert_eq!(back.attributes[0].typ, 26);
        assert_eq!(back.attributes[0].value, vec![1, 2, 3, 4]);
    }
}
