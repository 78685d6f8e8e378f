//! Built-in encoders.
//!
//! The hash family is tagged `hashes` so a dictionary configured with that
//! single name fans out across all of them.

use super::{Encoder, PluginRegistry};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256, Sha512};
use std::sync::Arc;

pub(super) fn register(registry: &mut PluginRegistry) {
    registry.register_encoder(Arc::new(NoneEncoder));
    registry.register_encoder(Arc::new(UrlEncoder));
    registry.register_encoder(Arc::new(Base64Encoder));
    registry.register_encoder(Arc::new(HexEncoder));
    registry.register_encoder(Arc::new(Sha256Encoder));
    registry.register_encoder(Arc::new(Sha512Encoder));
    registry.register_encoder(Arc::new(UppercaseEncoder));
    registry.register_encoder(Arc::new(LowercaseEncoder));
}

/// Identity; keeps a dictionary slot un-encoded inside a multi-encoder list.
pub struct NoneEncoder;

impl Encoder for NoneEncoder {
    fn name(&self) -> &'static str {
        "none"
    }

    fn encode(&self, input: &str) -> String {
        input.to_string()
    }
}

/// Percent-encode everything that is not alphanumeric.
pub struct UrlEncoder;

impl Encoder for UrlEncoder {
    fn name(&self) -> &'static str {
        "urlencode"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["url"]
    }

    fn encode(&self, input: &str) -> String {
        utf8_percent_encode(input, NON_ALPHANUMERIC).to_string()
    }
}

/// Standard base64.
pub struct Base64Encoder;

impl Encoder for Base64Encoder {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn encode(&self, input: &str) -> String {
        BASE64.encode(input.as_bytes())
    }
}

/// Lowercase hex of the raw bytes.
pub struct HexEncoder;

impl Encoder for HexEncoder {
    fn name(&self) -> &'static str {
        "hexlify"
    }

    fn encode(&self, input: &str) -> String {
        hex::encode(input.as_bytes())
    }
}

/// SHA-256 digest, hex encoded.
pub struct Sha256Encoder;

impl Encoder for Sha256Encoder {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["hashes"]
    }

    fn encode(&self, input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }
}

/// SHA-512 digest, hex encoded.
pub struct Sha512Encoder;

impl Encoder for Sha512Encoder {
    fn name(&self) -> &'static str {
        "sha512"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["hashes"]
    }

    fn encode(&self, input: &str) -> String {
        hex::encode(Sha512::digest(input.as_bytes()))
    }
}

pub struct UppercaseEncoder;

impl Encoder for UppercaseEncoder {
    fn name(&self) -> &'static str {
        "uppercase"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["case"]
    }

    fn encode(&self, input: &str) -> String {
        input.to_uppercase()
    }
}

pub struct LowercaseEncoder;

impl Encoder for LowercaseEncoder {
    fn name(&self) -> &'static str {
        "lowercase"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["case"]
    }

    fn encode(&self, input: &str) -> String {
        input.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode() {
        assert_eq!(UrlEncoder.encode("a b/c"), "a%20b%2Fc");
        assert_eq!(UrlEncoder.encode("abc123"), "abc123");
    }

    #[test]
    fn test_base64() {
        assert_eq!(Base64Encoder.encode("hi"), "aGk=");
    }

    #[test]
    fn test_hexlify() {
        assert_eq!(HexEncoder.encode("AB"), "4142");
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            Sha256Encoder.encode("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_case_encoders() {
        assert_eq!(UppercaseEncoder.encode("aBc"), "ABC");
        assert_eq!(LowercaseEncoder.encode("aBc"), "abc");
    }

    #[test]
    fn test_hashes_tag_expansion() {
        let registry = PluginRegistry::with_defaults();
        let family = registry.encoders_matching("hashes");
        let names: Vec<_> = family.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["sha256", "sha512"]);
    }
}
