//! VAPID application server key handling.
//!
//! The host hands us the key as base64url text (as printed by most VAPID
//! tooling, usually without padding). The push manager wants raw bytes.

use crate::error::{PushError, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;

/// Length of an uncompressed P-256 public point.
pub const P256_UNCOMPRESSED_LEN: usize = 65;

/// Lenient decoder: padding optional, trailing bits tolerated.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode base64url text into bytes.
///
/// Whitespace around the value is ignored, standard-alphabet `+` and `/` are
/// accepted as `-` and `_`, and any trailing `=` padding is dropped before
/// decoding. Pure: no side effects.
pub fn decode_base64url(input: &str) -> Result<Vec<u8>> {
    let normalized: String = input
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    LENIENT_URL_SAFE
        .decode(normalized.as_bytes())
        .map_err(|e| PushError::InvalidKey(e.to_string()))
}

/// Encode bytes as unpadded base64url.
pub fn encode_base64url(bytes: &[u8]) -> String {
    LENIENT_URL_SAFE.encode(bytes)
}

/// Decoded application server key, ready to hand to the push manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapidPublicKey(Vec<u8>);

impl VapidPublicKey {
    pub fn from_base64url(input: &str) -> Result<Self> {
        let bytes = decode_base64url(input)?;
        if bytes.is_empty() {
            return Err(PushError::InvalidKey("key is empty".to_string()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True for a 65-byte uncompressed point (`0x04 || X || Y`), the only
    /// shape browsers accept for `applicationServerKey`.
    pub fn looks_like_p256(&self) -> bool {
        self.0.len() == P256_UNCOMPRESSED_LEN && self.0[0] == 0x04
    }

    /// Canonical (unpadded) base64url form.
    pub fn to_base64url(&self) -> String {
        encode_base64url(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE_KEY: &str =
        "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

    #[test]
    fn test_decode_sample_vapid_key() {
        let key = VapidPublicKey::from_base64url(SAMPLE_KEY).unwrap();
        assert_eq!(key.as_bytes().len(), P256_UNCOMPRESSED_LEN);
        assert!(key.looks_like_p256());
        assert_eq!(key.to_base64url(), SAMPLE_KEY);
    }

    #[test]
    fn test_padding_is_optional() {
        // "hi" -> "aGk" unpadded, "aGk=" padded
        assert_eq!(decode_base64url("aGk").unwrap(), b"hi");
        assert_eq!(decode_base64url("aGk=").unwrap(), b"hi");
    }

    #[test]
    fn test_standard_alphabet_is_accepted() {
        // 0xfb 0xff -> "-_8" url-safe, "+/8" standard
        assert_eq!(decode_base64url("-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(decode_base64url("+/8").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(decode_base64url("  aGk\n").unwrap(), b"hi");
    }

    #[test]
    fn test_invalid_characters_rejected() {
        let err = decode_base64url("not*base64").unwrap_err();
        assert!(matches!(err, PushError::InvalidKey(_)));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(VapidPublicKey::from_base64url("").is_err());
        assert!(VapidPublicKey::from_base64url("==").is_err());
    }

    #[test]
    fn test_short_key_does_not_look_like_p256() {
        let key = VapidPublicKey::from_base64url("aGk").unwrap();
        assert!(!key.looks_like_p256());
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let encoded = encode_base64url(&bytes);
            prop_assert_eq!(decode_base64url(&encoded).unwrap(), bytes);
        }

        #[test]
        fn prop_padded_input_normalizes(bytes in proptest::collection::vec(any::<u8>(), 1..96)) {
            let unpadded = encode_base64url(&bytes);
            let padding = "=".repeat((4 - unpadded.len() % 4) % 4);
            let padded = format!("{}{}", unpadded, padding);
            let decoded = decode_base64url(&padded).unwrap();
            prop_assert_eq!(encode_base64url(&decoded), unpadded);
        }
    }
}
