//! Code generator configuration.
//!
//! One immutable value carried by the [`CodeContext`](crate::CodeContext)
//! and read by every data-structure generator.

use quarry_rt::bloom_filter::DEFAULT_FALSE_POSITIVE_RATE;
use quarry_rt::oa_hash_table::{DEFAULT_INITIAL_SIZE, INITIAL_KV_LIST_CAPACITY};

use crate::hash::HashMethod;

/// Distance, in rows, between a prefetch and the probe that uses it.
pub const DEFAULT_PREFETCH_DISTANCE: u32 = 10;

/// Rows processed per batch by vectorized loops.
pub const DEFAULT_VECTOR_SIZE: u32 = 1024;

/// Environment variable that turns on IR dumps.
pub const DEBUG_IR_ENV: &str = "QUARRY_DEBUG_IR";

/// How a bloom filter picks its number of hash functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BloomHashPolicy {
    /// The count that minimizes memory for the target false-positive rate.
    #[default]
    Optimal,
    /// A fixed count; the bit array grows to keep the target rate.
    Fixed(u32),
}

impl BloomHashPolicy {
    /// The value passed to `quarry_bloom_filter_init`, where 0 means optimal.
    pub fn as_runtime_arg(self) -> u64 {
        match self {
            BloomHashPolicy::Optimal => 0,
            BloomHashPolicy::Fixed(k) => u64::from(k.max(1)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodegenConfig {
    pub default_hash_method: HashMethod,
    pub prefetch_distance: u32,
    pub oa_initial_size: u64,
    pub kv_list_initial_capacity: u32,
    pub bloom_false_positive_rate: f64,
    pub bloom_hash_policy: BloomHashPolicy,
    /// Batch size of vectorized loops. Always a power of two.
    pub vector_size: u32,
    /// Print every function's IR to stderr before it is defined.
    pub debug_ir: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            default_hash_method: HashMethod::Crc32,
            prefetch_distance: DEFAULT_PREFETCH_DISTANCE,
            oa_initial_size: DEFAULT_INITIAL_SIZE,
            kv_list_initial_capacity: INITIAL_KV_LIST_CAPACITY,
            bloom_false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            bloom_hash_policy: BloomHashPolicy::Optimal,
            vector_size: DEFAULT_VECTOR_SIZE,
            debug_ir: std::env::var(DEBUG_IR_ENV).is_ok_and(|v| !v.is_empty()),
        }
    }
}

impl CodegenConfig {
    #[must_use]
    pub fn with_hash_method(mut self, method: HashMethod) -> Self {
        self.default_hash_method = method;
        self
    }

    #[must_use]
    pub fn with_prefetch_distance(mut self, distance: u32) -> Self {
        self.prefetch_distance = distance;
        self
    }

    #[must_use]
    pub fn with_oa_initial_size(mut self, size: u64) -> Self {
        self.oa_initial_size = size;
        self
    }

    #[must_use]
    pub fn with_kv_list_initial_capacity(mut self, capacity: u32) -> Self {
        self.kv_list_initial_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_bloom_false_positive_rate(mut self, rate: f64) -> Self {
        self.bloom_false_positive_rate = rate;
        self
    }

    #[must_use]
    pub fn with_bloom_hash_policy(mut self, policy: BloomHashPolicy) -> Self {
        self.bloom_hash_policy = policy;
        self
    }

    /// Set the vectorized batch size.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not a power of two.
    #[must_use]
    pub fn with_vector_size(mut self, size: u32) -> Self {
        assert!(size.is_power_of_two(), "vector size must be a power of two, got {size}");
        self.vector_size = size;
        self
    }

    #[must_use]
    pub fn with_debug_ir(mut self, debug_ir: bool) -> Self {
        self.debug_ir = debug_ir;
        self
    }
}

#[cfg(test)]
mod tests;
