//! Bloom filter storage.
//!
//! Generated code computes the probe positions and sets or tests the bits.
//! The runtime sizes the bit array and owns its memory.
//!
//! Probe `i` of a key uses `h_0 = seed1`, `h_1 = seed2` and
//! `h_i = seed1 + i * seed2` for `i >= 2`. Bit `h mod num_bits` lives in byte
//! `(h mod num_bits) / 8` at bit `(h mod num_bits) % 8`.

use std::f64::consts::LN_2;

use crate::memory;

/// False-positive rate the filter is sized for unless configured otherwise.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.1;

/// Smallest bit array ever allocated.
const MIN_BITS: u64 = 64;

#[repr(C)]
pub struct BloomFilter {
    pub num_hash_funcs: u64,
    pub bytes: *mut u8,
    pub num_bits: u64,
    pub num_misses: u64,
    pub num_probes: u64,
}

/// Bit count and hash-function count for a filter over `n` keys.
///
/// `fixed_num_hash_funcs == 0` selects the optimal hash-function count for
/// the target rate; any other value is used as is and the bit count is
/// chosen to still meet the rate.
pub fn filter_size(n: u64, false_positive_rate: f64, fixed_num_hash_funcs: u64) -> (u64, u64) {
    let n = n.max(1) as f64;
    let p = false_positive_rate.clamp(f64::MIN_POSITIVE, 0.999_999);
    if fixed_num_hash_funcs == 0 {
        let bits = (-n * p.ln() / (LN_2 * LN_2)).ceil();
        let k = (LN_2 * bits / n).round().max(1.0);
        ((bits as u64).max(MIN_BITS), k as u64)
    } else {
        let k = fixed_num_hash_funcs as f64;
        let bits = (-k * n / (1.0 - p.powf(1.0 / k)).ln()).ceil();
        ((bits as u64).max(MIN_BITS), fixed_num_hash_funcs)
    }
}

impl BloomFilter {
    fn num_bytes(&self) -> usize {
        self.num_bits.div_ceil(8) as usize
    }

    /// The probe positions for one key.
    fn probes(&self, seed1: u64, seed2: u64) -> impl Iterator<Item = u64> {
        let num_bits = self.num_bits;
        (0..self.num_hash_funcs).map(move |i| {
            let h = match i {
                0 => seed1,
                1 => seed2,
                _ => seed1.wrapping_add(i.wrapping_mul(seed2)),
            };
            h % num_bits
        })
    }

    fn byte(&self, bit: u64) -> *mut u8 {
        // SAFETY: bit < num_bits, so bit / 8 < num_bytes
        unsafe { self.bytes.add((bit / 8) as usize) }
    }

    /// Native insertion, matching the generated `add`.
    pub fn add_hashes(&mut self, seed1: u64, seed2: u64) {
        for bit in self.probes(seed1, seed2) {
            // SAFETY: byte() stays inside the bit array
            unsafe { *self.byte(bit) |= 1 << (bit % 8) };
        }
    }

    /// Native membership test, matching the generated `contains`.
    pub fn contains_hashes(&mut self, seed1: u64, seed2: u64) -> bool {
        self.num_probes += 1;
        // SAFETY: byte() stays inside the bit array
        let present = self
            .probes(seed1, seed2)
            .all(|bit| unsafe { *self.byte(bit) } & (1 << (bit % 8)) != 0);
        if !present {
            self.num_misses += 1;
        }
        present
    }
}

#[no_mangle]
pub extern "C" fn quarry_bloom_filter_init(
    bf: *mut BloomFilter,
    estimated_num_tuples: u64,
    false_positive_rate: f64,
    fixed_num_hash_funcs: u64,
) {
    // SAFETY: bf points to writable storage for a BloomFilter
    let bf = unsafe { &mut *bf };
    let (num_bits, num_hash_funcs) =
        filter_size(estimated_num_tuples, false_positive_rate, fixed_num_hash_funcs);
    bf.num_bits = num_bits;
    bf.num_hash_funcs = num_hash_funcs;
    bf.num_misses = 0;
    bf.num_probes = 0;
    bf.bytes = memory::alloc_zeroed(bf.num_bytes(), 8);
    tracing::debug!(
        estimated_num_tuples,
        num_bits,
        num_hash_funcs,
        "initialized bloom filter"
    );
}

#[no_mangle]
pub extern "C" fn quarry_bloom_filter_destroy(bf: *mut BloomFilter) {
    // SAFETY: bf was initialized by quarry_bloom_filter_init
    let bf = unsafe { &mut *bf };
    let miss_ratio = if bf.num_probes == 0 {
        0.0
    } else {
        bf.num_misses as f64 / bf.num_probes as f64
    };
    tracing::debug!(
        misses = bf.num_misses,
        probes = bf.num_probes,
        miss_ratio,
        "destroying bloom filter"
    );
    memory::free(bf.bytes, bf.num_bytes(), 8);
    bf.bytes = std::ptr::null_mut();
    bf.num_bits = 0;
}

#[cfg(test)]
mod tests;
