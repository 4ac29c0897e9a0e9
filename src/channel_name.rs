// Channel name validation/truncation.
//
// Tunnel device names travel as a fixed `[u8; 32]` buffer (`tunnel_create_t`,
// `TUNNEL_CONNECT`'s `char*`). The mesh layer's own limit is the one stated
// in the spec: up to 31 bytes plus a NUL terminator. Grounded on the
// teacher's `shm_name.rs`, minus the POSIX `/`-prefix convention (the tunnel
// device has no such requirement) and minus the macOS-only truncation gate
// (this crate's limit always applies).

use crate::error::{CortezError, Result};

/// Device-side name buffer size (`tunnel_create_t.name`).
pub const NAME_BUF_LEN: usize = 32;

/// Maximum usable channel name length: `NAME_BUF_LEN` minus the NUL.
pub const MAX_NAME_LEN: usize = NAME_BUF_LEN - 1;

/// FNV-1a 64-bit hash, used when a caller-composed name (mesh inbox names are
/// `"{node_name}-{pid}"`) needs shortening to fit the device's name buffer.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn to_hex(val: u64) -> [u8; 16] {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut buf = [0u8; 16];
    let mut v = val;
    for i in (0..16).rev() {
        buf[i] = DIGITS[(v & 0xf) as usize];
        v >>= 4;
    }
    buf
}

/// Validate a caller-supplied channel name: non-empty and within
/// [`MAX_NAME_LEN`] bytes.
pub fn validate(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(CortezError::InvalidArgument);
    }
    Ok(())
}

/// Shorten `name` to fit within [`MAX_NAME_LEN`] bytes, preserving a
/// readable prefix and appending a 16-hex-digit FNV-1a hash suffix so
/// distinct long names don't collide after truncation.
///
/// Names already within the limit are returned unchanged.
pub fn shorten(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }

    const HASH_SUFFIX_LEN: usize = 1 + 16; // '_' + 16 hex digits
    let prefix_len = MAX_NAME_LEN.saturating_sub(HASH_SUFFIX_LEN);

    let hash = fnv1a_64(name.as_bytes());
    let hex = to_hex(hash);
    let hex_str = std::str::from_utf8(&hex).unwrap();

    let mut out = String::with_capacity(MAX_NAME_LEN);
    out.push_str(&name[..prefix_len.min(name.len())]);
    out.push('_');
    out.push_str(hex_str);
    out
}

/// Encode `name` into the device's fixed `[u8; 32]` NUL-padded buffer.
pub fn to_device_buf(name: &str) -> Result<[u8; NAME_BUF_LEN]> {
    validate(name)?;
    let mut buf = [0u8; NAME_BUF_LEN];
    buf[..name.len()].copy_from_slice(name.as_bytes());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_value() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
    }

    #[test]
    fn validate_rejects_empty_and_overlong() {
        assert!(validate("").is_err());
        assert!(validate(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(validate("ok").is_ok());
    }

    #[test]
    fn shorten_leaves_short_names_untouched() {
        assert_eq!(shorten("inbox-42"), "inbox-42");
    }

    #[test]
    fn shorten_truncates_long_names_with_hash_suffix() {
        let long = "a".repeat(MAX_NAME_LEN + 20);
        let short = shorten(&long);
        assert!(short.len() <= MAX_NAME_LEN);
        assert!(short.contains('_'));
    }

    #[test]
    fn to_device_buf_nul_pads() {
        let buf = to_device_buf("abc").unwrap();
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(buf[3], 0);
    }
}
