//! WebSocket payload masking
//!
//! Octet `i` of the transformed payload is octet `i` of the input XOR
//! `key[i % 4]`. The transform is its own inverse, so the same function
//! masks (client side) and unmasks (server side).

/// Apply a 4-byte mask to `data` in place
///
/// Processes eight bytes per step using a widened key, then finishes the
/// tail byte by byte.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    if data.is_empty() {
        return;
    }

    let wide = u64::from_ne_bytes([
        mask[0], mask[1], mask[2], mask[3], mask[0], mask[1], mask[2], mask[3],
    ]);

    let mut chunks = data.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let masked = u64::from_ne_bytes(word) ^ wide;
        chunk.copy_from_slice(&masked.to_ne_bytes());
    }

    // Chunks are a multiple of 8 long, so the tail starts on key index 0
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}
