//! Hex encoding of UTF-8 payload data.
//!
//! Free-form `data` strings attached to token operations travel to the RPC
//! gateway as `bytes` parameters, `0x`-prefixed and lowercase. The gateway
//! rejects empty byte arguments, so an empty string is encoded as a single
//! null byte (`"0x00"`) and decoded back to the empty string.

/// Encodes a UTF-8 string as `0x`-prefixed lowercase hex.
///
/// An empty input yields `"0x00"`, a single null byte.
///
/// # Example
///
/// ```rust
/// use tokens_types::hexstr::encode_hex;
///
/// assert_eq!(encode_hex("test"), "0x74657374");
/// assert_eq!(encode_hex(""), "0x00");
/// ```
pub fn encode_hex(data: &str) -> String {
    if data.is_empty() {
        return "0x00".to_string();
    }
    format!("0x{}", hex::encode(data.as_bytes()))
}

/// Decodes a `0x`-prefixed hex string back to UTF-8.
///
/// The `"0x00"` sentinel decodes to the empty string. Inputs without the
/// prefix, with invalid hex digits, or with non-UTF-8 content decode to the
/// empty string as well.
pub fn decode_hex(data: &str) -> String {
    let Some(stripped) = data.strip_prefix("0x") else {
        return String::new();
    };
    let Ok(bytes) = hex::decode(stripped) else {
        return String::new();
    };
    if bytes == [0u8] {
        return String::new();
    }
    String::from_utf8(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_hex() {
        assert_eq!(encode_hex("hello"), "0x68656c6c6f");
        assert_eq!(encode_hex("test"), "0x74657374");
    }

    #[test]
    fn test_encode_hex_empty_sentinel() {
        assert_eq!(encode_hex(""), "0x00");
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("0x68656c6c6f"), "hello");
        assert_eq!(decode_hex("0x74657374"), "test");
    }

    #[test]
    fn test_decode_hex_sentinel() {
        assert_eq!(decode_hex("0x00"), "");
    }

    #[test]
    fn test_decode_hex_missing_prefix() {
        assert_eq!(decode_hex("68656c6c6f"), "");
        assert_eq!(decode_hex("0"), "");
        assert_eq!(decode_hex(""), "");
    }

    #[test]
    fn test_decode_hex_invalid() {
        assert_eq!(decode_hex("0xzz"), "");
    }

    #[test]
    fn test_round_trip() {
        for s in ["", "a", "hello world", "pool:data", "日本語"] {
            assert_eq!(decode_hex(&encode_hex(s)), s);
        }
    }
}
