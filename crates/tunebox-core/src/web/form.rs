//! `application/x-www-form-urlencoded` decoding, allocation-free.

use crate::station::truncated;

/// Looks up `key` in an urlencoded pair list (form body or query string) and
/// decodes its value. Returns `None` when the key is absent; an empty value
/// decodes to an empty string.
pub fn field<const N: usize>(encoded: &str, key: &str) -> Option<heapless::String<N>> {
    encoded
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| decode_value(v))
}

/// `+` becomes a space and `%XX` escapes are resolved; malformed escapes pass
/// through undecoded. Values longer than `N` bytes are silently truncated.
pub fn decode_value<const N: usize>(raw: &str) -> heapless::String<N> {
    let mut bytes: heapless::Vec<u8, N> = heapless::Vec::new();
    let src = raw.as_bytes();
    let mut i = 0;

    while i < src.len() {
        let (byte, consumed) = match src[i] {
            b'+' => (b' ', 1),
            b'%' => match (src.get(i + 1), src.get(i + 2)) {
                (Some(&hi), Some(&lo)) => match (hex_val(hi), hex_val(lo)) {
                    (Some(hi), Some(lo)) => ((hi << 4) | lo, 3),
                    _ => (b'%', 1),
                },
                _ => (b'%', 1),
            },
            other => (other, 1),
        };

        if bytes.push(byte).is_err() {
            break;
        }
        i += consumed;
    }

    let text = match core::str::from_utf8(&bytes) {
        Ok(text) => text,
        // Truncation may have cut a multi-byte sequence; keep the valid prefix.
        Err(err) => core::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or(""),
    };
    truncated(text)
}

fn hex_val(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
