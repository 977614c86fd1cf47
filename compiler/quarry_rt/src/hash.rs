//! Hash primitives called by generated code.
//!
//! `quarry_crc32_u64` is the raw CRC32C step of the SSE4.2 `crc32`
//! instruction (no pre or post inversion), so values folded through it by
//! generated code match values computed natively with [`crc32_u64`].
//!
//! | Symbol | Purpose |
//! |--------|---------|
//! | `quarry_crc32_u64` | One CRC32C step over an 8-byte word |
//! | `quarry_hash_crc64` | CRC over a byte range, seeded |
//! | `quarry_prefetch` | Data cache prefetch hint |
//! | `quarry_varlen_eq` | Byte-range equality |
//! | `quarry_varlen_cmp` | Byte-range three-way comparison |

use std::cmp::Ordering;

/// Seed of the high CRC accumulator when hashing a list of values.
pub const CRC_HIGH_SEED: u64 = 0x04C1_1DB7;

/// Murmur3 64-bit finalizer multipliers.
pub const MURMUR3_C1: u64 = 0xff51_afd7_ed55_8ccd;
pub const MURMUR3_C2: u64 = 0xc4ce_b9fe_1a85_ec53;

/// Constant added by `hash_combine`.
pub const HASH_COMBINE_MAGIC: u64 = 0x9e37_79b9;

/// Raw CRC32C over the bytes of `data`, starting from accumulator `crc`.
#[inline]
fn crc32c_raw(crc: u32, data: &[u8]) -> u32 {
    !crc32c::crc32c_append(!crc, data)
}

/// One raw CRC32C step over an 8-byte little-endian word.
///
/// The result is zero-extended to 64 bits, like the hardware instruction.
#[inline]
pub fn crc32_u64(acc: u64, word: u64) -> u64 {
    u64::from(crc32c_raw(acc as u32, &word.to_le_bytes()))
}

/// Murmur3 64-bit avalanche finalizer.
#[inline]
pub fn murmur3_fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(MURMUR3_C1);
    k ^= k >> 33;
    k = k.wrapping_mul(MURMUR3_C2);
    k ^= k >> 33;
    k
}

/// Boost-style `hash_combine` fold of `hash` into `seed`.
#[inline]
pub fn hash_combine(seed: u64, hash: u64) -> u64 {
    seed ^ hash
        .wrapping_add(HASH_COMBINE_MAGIC)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// CRC hash of a byte range.
///
/// Full 8-byte words alternate between two 32-bit accumulators seeded from
/// the low and high halves of `seed`. The tail bytes fold into the low one.
pub fn hash_crc64_bytes(bytes: &[u8], seed: u64) -> u64 {
    let mut lo = seed & 0xFFFF_FFFF;
    let mut hi = seed >> 32;

    let mut words = bytes.chunks_exact(8);
    for (i, word) in words.by_ref().enumerate() {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(word);
        let word = u64::from_le_bytes(buf);
        if i % 2 == 0 {
            lo = crc32_u64(lo, word);
        } else {
            hi = crc32_u64(hi, word);
        }
    }

    let tail = words.remainder();
    if !tail.is_empty() {
        lo = u64::from(crc32c_raw(lo as u32, tail));
    }

    (hi << 32) | lo
}

/// Borrow a byte range handed over by generated code.
///
/// A null pointer reads as the empty range.
fn bytes<'a>(ptr: *const u8, len: u32) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    // SAFETY: generated code passes a pointer to `len` readable bytes
    unsafe { std::slice::from_raw_parts(ptr, len as usize) }
}

#[no_mangle]
pub extern "C" fn quarry_crc32_u64(acc: u64, word: u64) -> u64 {
    crc32_u64(acc, word)
}

#[no_mangle]
pub extern "C" fn quarry_hash_crc64(data: *const u8, len: u32, seed: u64) -> u64 {
    hash_crc64_bytes(bytes(data, len), seed)
}

/// Prefetch the cache line holding `addr` for reading.
#[no_mangle]
pub extern "C" fn quarry_prefetch(addr: *const u8) {
    #[cfg(target_arch = "x86_64")]
    {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        // SAFETY: prefetch never faults, even for invalid addresses
        unsafe { _mm_prefetch::<_MM_HINT_T0>(addr.cast()) }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = addr;
    }
}

/// Equality of two variable-length values. Returns 1 when equal.
///
/// Two null pointers are equal; a null and a non-null never are.
#[no_mangle]
pub extern "C" fn quarry_varlen_eq(lhs: *const u8, lhs_len: u32, rhs: *const u8, rhs_len: u32) -> u8 {
    if lhs.is_null() || rhs.is_null() {
        return u8::from(lhs.is_null() && rhs.is_null());
    }
    u8::from(bytes(lhs, lhs_len) == bytes(rhs, rhs_len))
}

/// Three-way comparison of two variable-length values: -1, 0 or 1.
///
/// Null sorts before every non-null value.
#[no_mangle]
pub extern "C" fn quarry_varlen_cmp(lhs: *const u8, lhs_len: u32, rhs: *const u8, rhs_len: u32) -> i32 {
    let ordering = match (lhs.is_null(), rhs.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => bytes(lhs, lhs_len).cmp(bytes(rhs, rhs_len)),
    };
    ordering as i32
}
