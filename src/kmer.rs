// 2-bit k-mer encoding used by the in-process sketcher.

const BITS_PER_BASE: u8 = 2;

/// Encodes a single DNA base into its 2-bit representation.
/// A -> 00, C -> 01, G -> 10, T -> 11; anything else is `None`.
#[inline]
fn dna_base_to_u64(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'G' | b'g' => Some(0b10),
        b'T' | b't' => Some(0b11),
        _ => None,
    }
}

/// Calls `f` with every canonical k-mer of `seq`, skipping windows that
/// contain a non-ACGT base. Rolling: each base is encoded once.
pub fn for_each_canonical_kmer<F: FnMut(u64)>(seq: &[u8], k: u8, mut f: F) {
    if k == 0 || k > 32 || seq.len() < k as usize {
        return;
    }
    let shift = BITS_PER_BASE as u32 * (k as u32 - 1);
    let mask: u64 = if k == 32 { u64::MAX } else { (1u64 << (2 * k as u32)) - 1 };

    let mut fwd: u64 = 0;
    let mut rev: u64 = 0;
    let mut valid = 0usize;
    for &base in seq {
        match dna_base_to_u64(base) {
            Some(b) => {
                fwd = ((fwd << BITS_PER_BASE) | b) & mask;
                rev = (rev >> BITS_PER_BASE) | ((b ^ 0b11) << shift);
                valid += 1;
                if valid >= k as usize {
                    f(fwd.min(rev));
                }
            }
            None => {
                valid = 0;
                fwd = 0;
                rev = 0;
            }
        }
    }
}

/// Thomas Wang's 64-bit integer hash.
#[inline]
pub fn tw_hash64(kmer: u64) -> u64 {
    let mut hash = kmer;
    hash = (!hash).wrapping_add(hash << 21);
    hash ^= hash >> 24;
    hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
    hash ^= hash >> 14;
    hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
    hash ^= hash >> 28;
    hash.wrapping_add(hash << 31)
}
