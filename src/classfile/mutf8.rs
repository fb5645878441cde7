//! The "modified UTF-8" encoding used by `CONSTANT_Utf8` entries.
//!
//! It differs from standard UTF-8 in two ways: U+0000 is written as the two
//! bytes `C0 80`, and characters outside the BMP are written as a surrogate
//! pair, each half encoded as a three-byte sequence.

/// Decodes a `CONSTANT_Utf8` payload.
///
/// Returns `None` when the bytes are not well-formed or decode to an unpaired
/// surrogate, which Java strings allow but Rust strings cannot hold.
pub fn decode(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|b| (0x01..0x80).contains(b)) {
        return std::str::from_utf8(bytes).ok().map(str::to_owned);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        match b0 {
            0x01..=0x7F => {
                units.push(u16::from(b0));
                i += 1;
            }
            0xC0..=0xDF => {
                let b1 = continuation(bytes, i + 1)?;
                units.push((u16::from(b0 & 0x1F) << 6) | b1);
                i += 2;
            }
            0xE0..=0xEF => {
                let b1 = continuation(bytes, i + 1)?;
                let b2 = continuation(bytes, i + 2)?;
                units.push((u16::from(b0 & 0x0F) << 12) | (b1 << 6) | b2);
                i += 3;
            }
            _ => return None,
        }
    }

    char::decode_utf16(units.iter().copied())
        .collect::<Result<String, _>>()
        .ok()
}

fn continuation(bytes: &[u8], i: usize) -> Option<u16> {
    let b = *bytes.get(i)?;
    (b & 0xC0 == 0x80).then_some(u16::from(b & 0x3F))
}

/// Encodes text as a `CONSTANT_Utf8` payload.
pub fn encode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut buf = [0u16; 2];
    for c in text.chars() {
        for unit in c.encode_utf16(&mut buf).iter().copied() {
            match unit {
                0x0001..=0x007F => out.push(unit as u8),
                0x0000 | 0x0080..=0x07FF => {
                    out.push(0xC0 | (unit >> 6) as u8);
                    out.push(0x80 | (unit & 0x3F) as u8);
                }
                _ => {
                    out.push(0xE0 | (unit >> 12) as u8);
                    out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                    out.push(0x80 | (unit & 0x3F) as u8);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_unchanged() {
        assert_eq!(encode("app-${VER}"), b"app-${VER}".to_vec());
        assert_eq!(decode(b"app-${VER}").as_deref(), Some("app-${VER}"));
    }

    #[test]
    fn nul_uses_two_bytes() {
        assert_eq!(encode("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode(&[b'a', 0xC0, 0x80, b'b']).as_deref(), Some("a\0b"));
    }

    #[test]
    fn supplementary_characters_use_surrogate_pairs() {
        let encoded = encode("\u{1F600}");
        assert_eq!(encoded, vec![0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]);
        assert_eq!(decode(&encoded).as_deref(), Some("\u{1F600}"));
    }

    #[test]
    fn bmp_characters_match_standard_utf8() {
        let text = "café \u{00A7}\u{20AC}";
        assert_eq!(encode(text), text.as_bytes().to_vec());
        assert_eq!(decode(text.as_bytes()).as_deref(), Some(text));
    }

    #[test]
    fn rejects_unpaired_surrogate_and_raw_nul() {
        assert_eq!(decode(&[0xED, 0xA0, 0xBD]), None);
        assert_eq!(decode(&[0x00]), None);
        assert_eq!(decode(&[0xC3]), None);
    }
}
