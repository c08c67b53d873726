//! Change-detection hash of the rendered proxy configuration

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a of `text`, as 8 lowercase hex digits.
///
/// Only used to signal that a configuration changed (e.g. to roll gateway
/// pods). Not a security digest.
pub fn fingerprint(text: &str) -> String {
    format!("{:08x}", fnv1a_32(text.as_bytes()))
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
