//! Authenticators and User-Password crypt (RFC 2865 §3, §5.2)

use crate::packet::{Code, Packet};
use md5::{Digest, Md5};
use rand::RngCore;

/// Random request authenticator for client-originated requests
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut auth = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut auth);
    auth
}

/// Encrypt a User-Password for the wire.
///
/// RFC 2865 §5.2: the password is NUL-padded to a 16-byte multiple,
/// then each block is xored with MD5(secret + previous ciphertext
/// block), seeded with the request authenticator.
pub fn encrypt_user_password(password: &str, secret: &[u8], req_auth: &[u8; 16]) -> Vec<u8> {
    let mut padded = password.as_bytes().to_vec();
    let rem = padded.len() % 16;
    if rem != 0 || padded.is_empty() {
        padded.resize(padded.len() + 16 - rem, 0);
    }

    let mut out = Vec::with_capacity(padded.len());
    let mut prev: [u8; 16] = *req_auth;
    for block in padded.chunks(16) {
        let mut hasher = Md5::new();
        hasher.update(secret);
        hasher.update(prev);
        let digest = hasher.finalize();
        let mut cipher = [0u8; 16];
        for (i, (p, d)) in block.iter().zip(digest.iter()).enumerate() {
            cipher[i] = p ^ d;
        }
        out.extend_from_slice(&cipher);
        prev = cipher;
    }
    out
}

/// Decrypt a wire User-Password back to cleartext.
///
/// Returns `None` if the ciphertext is not a 16-byte multiple or the
/// plaintext is not valid UTF-8 after NUL-strip.
pub fn decrypt_user_password(cipher: &[u8], secret: &[u8], req_auth: &[u8; 16]) -> Option<String> {
    if cipher.is_empty() || cipher.len() % 16 != 0 {
        return None;
    }

    let mut plain = Vec::with_capacity(cipher.len());
    let mut prev: [u8; 16] = *req_auth;
    for block in cipher.chunks(16) {
        let mut hasher = Md5::new();
        hasher.update(secret);
        hasher.update(prev);
        let digest = hasher.finalize();
        for (c, d) in block.iter().zip(digest.iter()) {
            plain.push(c ^ d);
        }
        prev.copy_from_slice(block);
    }

    while plain.last() == Some(&0) {
        plain.pop();
    }
    String::from_utf8(plain).ok()
}

/// Response authenticator: MD5 over the response header with the
/// request authenticator in the authenticator field, the response
/// attributes, and the shared secret (RFC 2865 §3).
pub fn response_authenticator(
    code: Code,
    identifier: u8,
    req_auth: &[u8; 16],
    attributes_wire: &[u8],
    secret: &[u8],
) -> [u8; 16] {
    let length = (crate::packet::HEADER_LEN + attributes_wire.len()) as u16;
    let mut hasher = Md5::new();
    hasher.update([code as u8, identifier]);
    hasher.update(length.to_be_bytes());
    hasher.update(req_auth);
    hasher.update(attributes_wire);
    hasher.update(secret);
    hasher.finalize().into()
}

/// Accounting-Request authenticator: MD5 over the packet with a
/// zeroed authenticator field plus the shared secret (RFC 2866 §3).
pub fn accounting_request_authenticator(packet: &Packet, secret: &[u8]) -> [u8; 16] {
    let mut zeroed = packet.clone();
    zeroed.authenticator = [0u8; 16];
    // Encoding a decoded packet cannot exceed the wire maximum.
    let wire = zeroed.encode().expect("re-encoding decoded packet");
    let mut hasher = Md5::new();
    hasher.update(&wire);
    hasher.update(secret);
    hasher.finalize().into()
}

/// Seal a response packet: encode it with the correct response
/// authenticator computed against the originating request.
pub fn seal_response(
    response: &mut Packet,
    req_auth: &[u8; 16],
    secret: &[u8],
) -> Result<Vec<u8>, crate::ProtoError> {
    let mut attrs_wire = Vec::new();
    for attr in &response.attributes {
        attrs_wire.push(attr.typ);
        attrs_wire.push(attr.wire_len() as u8);
        attrs_wire.extend_from_slice(&attr.value);
    }
    response.authenticator =
        response_authenticator(response.code, response.identifier, req_auth, &attrs_wire, secret);
    response.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeType};

    #[test]
    fn test_password_roundtrip() {
        let req_auth = generate_request_authenticator();
        let secret = b"testing123";
        for pw in ["pw", "exactly16bytes!!", "a much longer password than one block"] {
            let cipher = encrypt_user_password(pw, secret, &req_auth);
            assert_eq!(cipher.len() % 16, 0);
            assert_eq!(
                decrypt_user_password(&cipher, secret, &req_auth).as_deref(),
                Some(pw)
            );
        }
    }

    #[test]
    fn test_wrong_secret_garbles() {
        let req_auth = generate_request_authenticator();
        let cipher = encrypt_user_password("hunter2", b"right", &req_auth);
        let wrong = decrypt_user_password(&cipher, b"wrong", &req_auth);
        assert_ne!(wrong.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_accounting_authenticator_verifies() {
        let secret = b"testing123";
        let mut p = Packet::new(Code::AccountingRequest, 3, [0u8; 16]);
        p.add_attribute(Attribute::string(AttributeType::UserName, "alice").unwrap());
        p.add_attribute(Attribute::u32(AttributeType::AcctStatusType, 1));
        p.authenticator = accounting_request_authenticator(&p, secret);

        let computed = accounting_request_authenticator(&p, secret);
        assert_eq!(computed, p.authenticator);
        assert_ne!(accounting_request_authenticator(&p, b"other"), p.authenticator);
    }

    #[test]
    fn test_seal_response_sets_authenticator() {
        let req_auth = [7u8; 16];
        let mut resp = Packet::new(Code::AccessAccept, 9, [0u8; 16]);
        resp.add_attribute(Attribute::u32(AttributeType::SessionTimeout, 3600));
        let wire = seal_response(&mut resp, &req_auth, b"testing123").unwrap();
        assert_ne!(resp.authenticator, [0u8; 16]);
        assert_eq!(&wire[4..20], &resp.authenticator);
    }
}
