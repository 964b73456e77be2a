//! Escape sublanguage of the service probe file
//!
//! Probe payloads and match patterns are written in printable ASCII with
//! a C-like escape syntax for arbitrary bytes. Two decoders share the
//! same table but serve different consumers:
//!
//! - [`decode_data`] produces the literal octets sent on the wire
//! - [`decode_pattern`] produces regex source text for the byte-level
//!   pattern engine, decoding only escapes that denote concrete bytes
//!
//! Both decoders are total: malformed input degrades to a best-effort
//! result and never aborts the surrounding parse.

/// Decode a probe payload into the raw bytes to transmit.
///
/// Recognized escapes: `\0`, `\a \b \f \n \r \t \v`, `\xHH`, and
/// `\\ \" \' \/` for the literal character. Any other `\c` yields the
/// literal `c`. A `\x` without two hex digits falls back to the
/// unknown-escape rule; a trailing lone backslash ends the output.
pub fn decode_data(input: &str) -> Vec<u8> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            push_char_bytes(&mut out, c);
            i += 1;
            continue;
        }
        let Some(&next) = chars.get(i + 1) else {
            break;
        };
        i += 2;
        match next {
            '0' => out.push(0x00),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push(0x0a),
            'r' => out.push(0x0d),
            't' => out.push(0x09),
            'v' => out.push(0x0b),
            'x' => match hex_pair(&chars, i) {
                Some(value) => {
                    out.push(value);
                    i += 2;
                }
                None => out.push(b'x'),
            },
            other => push_char_bytes(&mut out, other),
        }
    }

    out
}

/// Decode a match pattern into regex source text.
///
/// Escapes that denote concrete bytes (`\0`, the control letters except
/// `\b`, and `\xHH`) are decoded and spliced back in a form the regex
/// compiler accepts: printable characters literally (metacharacters
/// re-escaped), everything else as a regex `\xHH` escape. All other
/// `\c` sequences pass through untouched so that class escapes such as
/// `\d` and `\w`, the word boundary `\b`, and escaped punctuation keep
/// their regex meaning.
pub fn decode_pattern(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        let Some(&next) = chars.get(i + 1) else {
            break;
        };
        i += 2;
        match next {
            '0' => push_pattern_byte(&mut out, 0x00),
            'a' => push_pattern_byte(&mut out, 0x07),
            'f' => push_pattern_byte(&mut out, 0x0c),
            'n' => push_pattern_byte(&mut out, 0x0a),
            'r' => push_pattern_byte(&mut out, 0x0d),
            't' => push_pattern_byte(&mut out, 0x09),
            'v' => push_pattern_byte(&mut out, 0x0b),
            'x' => match hex_pair(&chars, i) {
                Some(value) => {
                    push_pattern_byte(&mut out, value);
                    i += 2;
                }
                None => out.push('x'),
            },
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    out
}

fn push_char_bytes(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Splice a decoded byte back into pattern source without changing the
/// regex semantics of the surrounding text.
fn push_pattern_byte(out: &mut String, value: u8) {
    if value.is_ascii_alphanumeric() || value == b' ' {
        out.push(value as char);
    } else if value.is_ascii_punctuation() {
        out.push('\\');
        out.push(value as char);
    } else {
        out.push_str(&format!("\\x{:02X}", value));
    }
}

fn hex_pair(chars: &[char], at: usize) -> Option<u8> {
    let hi = chars.get(at)?.to_digit(16)?;
    let lo = chars.get(at + 1)?.to_digit(16)?;
    Some((hi as u8) << 4 | lo as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_control_escapes() {
        assert_eq!(
            decode_data(r"\0\a\b\f\n\r\t\v"),
            vec![0x00, 0x07, 0x08, 0x0c, 0x0a, 0x0d, 0x09, 0x0b]
        );
    }

    #[test]
    fn test_data_hex_escapes() {
        assert_eq!(decode_data(r"\x00\x41\xff"), vec![0x00, 0x41, 0xff]);
        assert_eq!(decode_data(r"GET\x20/"), b"GET /".to_vec());
    }

    #[test]
    fn test_data_quote_and_slash_escapes() {
        assert_eq!(decode_data(r#"\\\"\'\/"#), b"\\\"'/".to_vec());
    }

    #[test]
    fn test_data_unknown_escape_is_literal() {
        assert_eq!(decode_data(r"\q\z"), b"qz".to_vec());
    }

    #[test]
    fn test_data_malformed_hex_degrades() {
        // \x without two hex digits falls back to a literal 'x'
        assert_eq!(decode_data(r"\xZG"), b"xZG".to_vec());
        assert_eq!(decode_data(r"\x4"), b"x4".to_vec());
    }

    #[test]
    fn test_data_trailing_backslash_is_best_effort() {
        assert_eq!(decode_data("abc\\"), b"abc".to_vec());
    }

    #[test]
    fn test_data_passthrough() {
        assert_eq!(decode_data("OPTIONS sip:nm"), b"OPTIONS sip:nm".to_vec());
    }

    #[test]
    fn test_data_decode_covers_every_byte() {
        // every byte value survives a \xHH round trip
        for value in 0u16..=255 {
            let encoded = format!("\\x{:02x}", value);
            assert_eq!(decode_data(&encoded), vec![value as u8]);
        }
    }

    #[test]
    fn test_pattern_keeps_regex_escapes() {
        assert_eq!(decode_pattern(r"^SSH-([\d.]+)-(.+)$"), r"^SSH-([\d.]+)-(.+)$");
        assert_eq!(decode_pattern(r"\w+\s\b"), r"\w+\s\b");
        assert_eq!(decode_pattern(r"\\d"), r"\\d");
    }

    #[test]
    fn test_pattern_decodes_byte_escapes() {
        assert_eq!(decode_pattern(r"\0"), r"\x00");
        assert_eq!(decode_pattern(r"\n\r"), r"\x0A\x0D");
        assert_eq!(decode_pattern(r"\x41"), "A");
        assert_eq!(decode_pattern(r"\xff"), r"\xFF");
    }

    #[test]
    fn test_pattern_reescapes_metacharacters() {
        // 0x2e is '.', which must not become a wildcard
        assert_eq!(decode_pattern(r"\x2e"), r"\.");
        assert_eq!(decode_pattern(r"\x2a"), r"\*");
    }

    #[test]
    fn test_pattern_malformed_hex_degrades() {
        assert_eq!(decode_pattern(r"\xq1"), "xq1");
    }

    #[test]
    fn test_decoders_are_total() {
        // arbitrary garbage never panics
        for input in ["\\", "\\x", "\\x0", "a\\", "\u{00e9}\\n", "\\\\\\"] {
            let _ = decode_data(input);
            let _ = decode_pattern(input);
        }
    }
}
