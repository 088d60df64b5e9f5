//! Request authentication primitives.
//!
//! Cloud requests carry a SHA1withDSA signature over a big-endian packing of the
//! request arguments. Local device requests carry a SHA-1 digest of the
//! concatenated ASCII arguments in an `Authorization: Basic` header.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use dsa::SigningKey;
use pkcs8::DecodePrivateKey;
use sha1::{Digest, Sha1};
use signature::{DigestSigner, SignatureEncoding};

use crate::{Error, Result};

/// One argument of a signed request, packed big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignPart<'a> {
    Long(i64),
    Int(i32),
    /// Packed as UTF-16 code units, two bytes each.
    Str(&'a str),
    Byte(u8),
    Bytes(&'a [u8]),
}

impl From<i64> for SignPart<'_> {
    fn from(v: i64) -> Self {
        SignPart::Long(v)
    }
}

impl From<i32> for SignPart<'_> {
    fn from(v: i32) -> Self {
        SignPart::Int(v)
    }
}

impl<'a> From<&'a str> for SignPart<'a> {
    fn from(v: &'a str) -> Self {
        SignPart::Str(v)
    }
}

impl From<u8> for SignPart<'_> {
    fn from(v: u8) -> Self {
        SignPart::Byte(v)
    }
}

impl<'a> From<&'a [u8]> for SignPart<'a> {
    fn from(v: &'a [u8]) -> Self {
        SignPart::Bytes(v)
    }
}

pub fn encode_big_endian(parts: &[SignPart<'_>]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(parts.iter().map(packed_len).sum());
    for part in parts {
        match part {
            SignPart::Long(v) => buf.extend_from_slice(&v.to_be_bytes()),
            SignPart::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
            SignPart::Str(s) => {
                for unit in s.encode_utf16() {
                    buf.extend_from_slice(&unit.to_be_bytes());
                }
            }
            SignPart::Byte(v) => buf.push(*v),
            SignPart::Bytes(bytes) => buf.extend_from_slice(bytes),
        }
    }
    buf
}

fn packed_len(part: &SignPart<'_>) -> usize {
    match part {
        SignPart::Long(_) => 8,
        SignPart::Int(_) => 4,
        SignPart::Str(s) => s.encode_utf16().count() * 2,
        SignPart::Byte(_) => 1,
        SignPart::Bytes(bytes) => bytes.len(),
    }
}

/// Decode a hex private key; colon separators between octets are accepted.
pub fn decode_key_hex(private_key_hex: &str) -> Result<Vec<u8>> {
    let compact: String = private_key_hex
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(Error::Signing("private key is empty".to_string()));
    }
    hex::decode(&compact).map_err(|e| Error::Signing(format!("private key is not hex: {e}")))
}

/// Uppercase hex with a colon between octets, e.g. `30:2C:02:14`.
pub fn to_colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// A parsed DSA private key able to sign request arguments.
#[derive(Clone)]
pub struct RequestSigner {
    key: SigningKey,
}

impl RequestSigner {
    /// Parse a hex-encoded PKCS#8 DSA private key.
    pub fn from_hex(private_key_hex: &str) -> Result<Self> {
        let der = decode_key_hex(private_key_hex)?;
        let key = SigningKey::from_pkcs8_der(&der)
            .map_err(|e| Error::Signing(format!("not a PKCS#8 DSA key: {e}")))?;
        Ok(Self { key })
    }

    pub fn sign(&self, parts: &[SignPart<'_>]) -> Result<String> {
        let payload = encode_big_endian(parts);
        let signature: dsa::Signature = self
            .key
            .try_sign_digest(Sha1::new_with_prefix(&payload))
            .map_err(|e| Error::Signing(e.to_string()))?;
        Ok(to_colon_hex(&signature.to_bytes()))
    }

    pub fn verifying_key(&self) -> &dsa::VerifyingKey {
        self.key.verifying_key()
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

/// SHA1withDSA over `parts`, returned as colon-delimited uppercase hex.
pub fn sign(private_key_hex: &str, parts: &[SignPart<'_>]) -> Result<String> {
    RequestSigner::from_hex(private_key_hex)?.sign(parts)
}

pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// SHA-1 of the ASCII concatenation of `parts`.
pub fn sha1_ascii(parts: &[&str]) -> Result<[u8; 20]> {
    let joined = parts.concat();
    if !joined.is_ascii() {
        return Err(Error::Encoding(
            "local request arguments must be ASCII".to_string(),
        ));
    }
    Ok(sha1(joined.as_bytes()))
}

/// Value for the device's `Authorization: Basic` header.
pub fn basic_auth_digest(parts: &[&str]) -> Result<String> {
    Ok(STANDARD.encode(sha1_ascii(parts)?))
}
