//! RADIUS protocol codec
//!
//! Packet encoding and decoding for RFC 2865 (authentication) and
//! RFC 2866 (accounting), plus the authenticator and User-Password
//! crypto the protocol hangs off MD5.
//!
//! The codec is strict on lengths (a runt or overrunning attribute is
//! an error, never a panic) and transparent on content: attribute
//! types it does not know are carried opaquely so vendor extensions
//! survive a round trip.

#![warn(missing_docs)]

pub mod acct;
pub mod attribute;
pub mod auth;
pub mod packet;

pub use acct::{AcctStatusType, AcctTerminateCause};
pub use attribute::{Attribute, AttributeType};
pub use auth::{
    accounting_request_authenticator, decrypt_user_password, encrypt_user_password,
    generate_request_authenticator, response_authenticator, seal_response,
};
pub use packet::{Code, Packet, ProtoError};

/// Merge 32-bit octet counters with their gigawords extension into a
/// single 64-bit count (RFC 2869 §5.1).
pub fn merge_gigawords(octets: u32, gigawords: Option<u32>) -> u64 {
    ((gigawords.unwrap_or(0) as u64) << 32) | octets as u64
}
