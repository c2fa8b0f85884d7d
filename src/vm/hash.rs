//! Hash functions shared by the binding table and the runtime dictionary.

const FNV_OFFSET_BASIS: u32 = 2166136261;
const FNV_PRIME: u32 = 16777619;

/// FNV-1a over the string's bytes. Computed once per string and cached.
pub fn hash_string(chars: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in chars.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Thomas Wang's 64-bit to 32-bit integer mix, masked to 30 bits so the
/// result is always a non-negative index seed.
pub fn hash_bits(bits: u64) -> u32 {
    let mut hash = bits;
    hash = (!hash).wrapping_add(hash << 18);
    hash ^= hash >> 31;
    hash = hash.wrapping_mul(21);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 6);
    hash ^= hash >> 22;
    (hash & 0x3fff_ffff) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv_known_values() {
        assert_eq!(hash_string(""), 2166136261);
        // FNV-1a("a") = 0xe40c292c
        assert_eq!(hash_string("a"), 0xe40c_292c);
    }

    #[test]
    fn test_hash_bits_fits_in_30_bits() {
        for bits in [0u64, 1, u64::MAX, 0x7ffc_0000_0000_0001, 3.5f64.to_bits()] {
            assert!(hash_bits(bits) < (1 << 30));
        }
    }

    #[test]
    fn test_hash_bits_spreads_neighbours() {
        assert_ne!(hash_bits(1), hash_bits(2));
        assert_ne!(hash_bits(1.0f64.to_bits()), hash_bits(2.0f64.to_bits()));
    }
}
