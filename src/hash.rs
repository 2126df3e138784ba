//! Seeded 32-bit MurmurHash3 for IBLT cell placement and fingerprints.
//!
//! This module implements the x86 32-bit variant of MurmurHash3, a fast
//! non-cryptographic hash. The IBLT uses one seed per sub-table plus a
//! distinct validation seed; publication fingerprints reuse the validation
//! seed over the signed wire form.

/// Seed of the validation hash stored in IBLT cells and used for
/// publication fingerprints. Distinct from the per-sub-table seeds 0..k.
pub const CHECK_SEED: u32 = 11;

/// Compute the 32-bit MurmurHash3 of `data` with the given `seed`.
///
/// # Example
///
/// ```rust
/// use pubsync::hash::murmur3_32;
///
/// let h1 = murmur3_32(0, b"named data");
/// let h2 = murmur3_32(0, b"named data");
/// assert_eq!(h1, h2);
/// assert_ne!(h1, murmur3_32(1, b"named data"));
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn murmur3_32(seed: u32, data: &[u8]) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;

    let mut chunks = data.chunks_exact(4);
    for block in &mut chunks {
        let mut k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0u32;
        for (i, &byte) in tail.iter().enumerate() {
            k1 ^= u32::from(byte) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    // Truncation is intentional: only the low 32 bits of the length mix in.
    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;
    h1
}

/// Hash a 32-bit key through its little-endian byte encoding.
///
/// All IBLT keys are hashed in this form so that peers agree on cell
/// placement regardless of host endianness.
#[inline]
#[must_use]
pub fn murmur3_key(seed: u32, key: u32) -> u32 {
    murmur3_32(seed, &key.to_le_bytes())
}
