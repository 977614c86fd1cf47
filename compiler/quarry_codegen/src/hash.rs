//! Hashing of typed value lists.
//!
//! Values are hashed in their storage representation (the sentinel stands
//! in for NULL), so two keys that store equal also hash equal.
//!
//! Fixed-width values are first packed into 8-byte words: 8-byte values
//! are one word each, then 4-, 2- and 1-byte values are shifted into words
//! in that order, the earlier value taking the higher bits, a new word
//! starting whenever the next value no longer fits. The words are then
//! mixed by one of two methods:
//!
//! | Method | Word mixing | Variable-length values |
//! |--------|-------------|------------------------|
//! | `Crc32` | CRC32C steps alternating between a low and a high accumulator | folded with `quarry_hash_crc64` |
//! | `Murmur3` | `fmix64` per word, folded with `hash_combine` | unsupported |

use std::fmt;
use std::str::FromStr;

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::I64;
use quarry_rt::hash::{CRC_HIGH_SEED, HASH_COMBINE_MAGIC, MURMUR3_C1, MURMUR3_C2};

use crate::codegen::CodeGen;
use crate::error::{CodegenError, CodegenResult};
use crate::types::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum HashMethod {
    #[default]
    Crc32,
    Murmur3,
}

static HASH_METHOD_NAMES: &[(&str, HashMethod)] =
    &[("Crc32", HashMethod::Crc32), ("Murmur3", HashMethod::Murmur3)];

impl HashMethod {
    /// Every method with its display name.
    pub fn names() -> &'static [(&'static str, HashMethod)] {
        HASH_METHOD_NAMES
    }

    pub fn name(self) -> &'static str {
        match self {
            HashMethod::Crc32 => "Crc32",
            HashMethod::Murmur3 => "Murmur3",
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown hash method `{0}`")]
pub struct UnknownHashMethod(pub String);

impl FromStr for HashMethod {
    type Err = UnknownHashMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HASH_METHOD_NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|&(_, method)| method)
            .ok_or_else(|| UnknownHashMethod(s.to_owned()))
    }
}

/// Hash `values` into one `i64`.
pub fn hash_values(cg: &mut CodeGen<'_>, values: &[Value], method: HashMethod) -> CodegenResult<ir::Value> {
    let mut varlens = Vec::new();
    let mut by_width: [Vec<ir::Value>; 4] = Default::default();

    for value in values {
        if value.sql_type().is_varlen() {
            let ptr = value.storage_repr(cg);
            let len = value.storage_length(cg);
            varlens.push((ptr, len));
            continue;
        }
        let stored = value.storage_repr(cg);
        let bits = cg.bitcast_to_int(stored);
        let slot = match value.sql_type().native_width() {
            8 => 0,
            4 => 1,
            2 => 2,
            _ => 3,
        };
        by_width[slot].push(bits);
    }

    let words = pack_words(cg, &by_width);
    match method {
        HashMethod::Crc32 => crc_hash(cg, &words, &varlens),
        HashMethod::Murmur3 => {
            if !varlens.is_empty() {
                return Err(CodegenError::Unsupported(
                    "Murmur3 hashing of variable-length values".to_owned(),
                ));
            }
            Ok(murmur3_hash(cg, &words))
        }
    }
}

/// Pack values grouped by width (8, 4, 2, 1 bytes) into 8-byte words.
fn pack_words(cg: &mut CodeGen<'_>, by_width: &[Vec<ir::Value>; 4]) -> Vec<ir::Value> {
    let mut words: Vec<ir::Value> = by_width[0].clone();
    let mut current: Option<ir::Value> = None;
    let mut used = 0u32;

    for (slot, width) in [(1, 4u32), (2, 2), (3, 1)] {
        for &value in &by_width[slot] {
            if used + width > 8 {
                words.extend(current.take());
                used = 0;
            }
            let wide = cg.zext(value, I64);
            current = Some(match current {
                None => wide,
                Some(word) => {
                    let shifted = cg.shl(word, i64::from(width * 8));
                    cg.or(shifted, wide)
                }
            });
            used += width;
        }
    }
    words.extend(current);
    words
}

fn crc_hash(cg: &mut CodeGen<'_>, words: &[ir::Value], varlens: &[(ir::Value, ir::Value)]) -> CodegenResult<ir::Value> {
    let mut lo = cg.const_i64(0);
    let mut hi = cg.const_i64(CRC_HIGH_SEED as i64);
    for (i, &word) in words.iter().enumerate() {
        if i % 2 == 0 {
            lo = cg.call_runtime_value("quarry_crc32_u64", &[lo, word])?;
        } else {
            hi = cg.call_runtime_value("quarry_crc32_u64", &[hi, word])?;
        }
    }
    let hi = cg.shl(hi, 32);
    let mut hash = cg.or(hi, lo);

    for &(ptr, len) in varlens {
        hash = cg.call_runtime_value("quarry_hash_crc64", &[ptr, len, hash])?;
    }
    Ok(hash)
}

/// Murmur3 64-bit finalizer.
pub(crate) fn emit_fmix64(cg: &mut CodeGen<'_>, k: ir::Value) -> ir::Value {
    let mut k = k;
    for multiplier in [MURMUR3_C1, MURMUR3_C2] {
        let shifted = cg.ushr(k, 33);
        k = cg.xor(k, shifted);
        let c = cg.const_i64(multiplier as i64);
        k = cg.mul(k, c);
    }
    let shifted = cg.ushr(k, 33);
    cg.xor(k, shifted)
}

/// `seed ^ (hash + MAGIC + (seed << 6) + (seed >> 2))`.
pub(crate) fn emit_hash_combine(cg: &mut CodeGen<'_>, seed: ir::Value, hash: ir::Value) -> ir::Value {
    let sum = cg.add_const(hash, HASH_COMBINE_MAGIC as i64);
    let left = cg.shl(seed, 6);
    let right = cg.ushr(seed, 2);
    let sum = cg.add(sum, left);
    let sum = cg.add(sum, right);
    cg.xor(seed, sum)
}

fn murmur3_hash(cg: &mut CodeGen<'_>, words: &[ir::Value]) -> ir::Value {
    let Some((&first, rest)) = words.split_first() else {
        return cg.const_i64(0);
    };
    let mut hash = emit_fmix64(cg, first);
    for &word in rest {
        let mixed = emit_fmix64(cg, word);
        hash = emit_hash_combine(cg, hash, mixed);
    }
    hash
}
