//! Percent-encoding helpers shared by the URI, query and form parsers.
//!
//! Decoding is strict: a `%` not followed by two hex digits is an error, never
//! passed through. Decoded bytes that are not valid UTF-8 are replaced lossily.

use url::form_urlencoded;

use crate::protocol::DecodeError;

/// Form-encodes `input`: space becomes `+`, everything but `*-._` and alphanumerics is escaped.
pub fn encode_url(input: &str) -> String {
    form_urlencoded::byte_serialize(input.as_bytes()).collect()
}

/// Decodes a query or form value, where `+` stands for a space.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidEscape`] for a truncated or non-hex escape.
pub fn decode_url(input: &[u8]) -> Result<String, DecodeError> {
    percent_decode(input, true)
}

/// Decodes a path segment, where `+` is literal.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidEscape`] for a truncated or non-hex escape.
pub fn decode_path(input: &[u8]) -> Result<String, DecodeError> {
    percent_decode(input, false)
}

fn percent_decode(input: &[u8], plus_as_space: bool) -> Result<String, DecodeError> {
    let mut out = Vec::with_capacity(input.len());
    let mut position = 0;
    while position < input.len() {
        match input[position] {
            b'%' => {
                let high = input.get(position + 1).copied().and_then(hex_value);
                let low = input.get(position + 2).copied().and_then(hex_value);
                match (high, low) {
                    (Some(high), Some(low)) => out.push((high << 4) | low),
                    _ => return Err(DecodeError::InvalidEscape { position }),
                }
                position += 3;
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                position += 1;
            }
            byte => {
                out.push(byte);
                position += 1;
            }
        }
    }

    Ok(match String::from_utf8(out) {
        Ok(decoded) => decoded,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

#[inline]
pub(crate) fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_escapes_and_plus() {
        assert_eq!(decode_url(b"a%20b+c%2Bd").unwrap(), "a b c+d");
        assert_eq!(decode_path(b"/a+b/%7Euser").unwrap(), "/a+b/~user");
        assert_eq!(decode_url(b"%E4%BD%A0%e5%a5%bd").unwrap(), "你好");
    }

    #[test]
    fn malformed_escapes_are_rejected() {
        assert_eq!(decode_url(b"abc%"), Err(DecodeError::InvalidEscape { position: 3 }));
        assert_eq!(decode_url(b"%4"), Err(DecodeError::InvalidEscape { position: 0 }));
        assert_eq!(decode_path(b"/x%zz"), Err(DecodeError::InvalidEscape { position: 2 }));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(decode_url(b"a%FFb").unwrap(), "a\u{FFFD}b");
    }

    #[test]
    fn encode_escapes_reserved_characters() {
        assert_eq!(encode_url("a b&c=d/é"), "a+b%26c%3Dd%2F%C3%A9");
    }

    proptest! {
        #[test]
        fn printable_ascii_round_trips(input in "[ -~]*") {
            prop_assert_eq!(decode_url(encode_url(&input).as_bytes()).unwrap(), input);
        }
    }
}
