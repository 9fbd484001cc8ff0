//! Object-key helpers for store notifications.

/// Template documents must end in this extension to be picked up.
pub const TEMPLATE_EXTENSION: &str = ".yaml";

/// Decode a form-encoded object key as delivered by store notifications.
///
/// `+` becomes a space and `%XX` escapes are decoded. Malformed escapes are kept
/// verbatim, and the result falls back to the raw key if the bytes are not UTF-8.
#[must_use]
pub fn decode_object_key(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}

/// Whether `key` names a template document.
#[must_use]
pub fn is_template_key(key: &str) -> bool {
    key.ends_with(TEMPLATE_EXTENSION)
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
