//! Bloom filter codegen.
//!
//! Every key yields two seed hashes. Probe `i` tests bit
//! `(seed1 + i * seed2) mod num_bits`, except that probe 1 uses `seed2`
//! itself. The runtime sizes the bit array; generated code sets and tests
//! the bits.

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::{I64, I8};
use quarry_rt::hash::CRC_HIGH_SEED;

use crate::codegen::CodeGen;
use crate::error::CodegenResult;
use crate::hash::{hash_values, HashMethod};
use crate::lang::{If, Loop};
use crate::proxy::BloomFilterProxy;
use crate::types::Value;

#[derive(Clone, Copy, Debug, Default)]
pub struct BloomFilter;

impl BloomFilter {
    /// Size the filter for `estimated_num_tuples` keys using the configured
    /// false-positive rate and hash-function policy.
    pub fn init(&self, cg: &mut CodeGen<'_>, bf: ir::Value, estimated_num_tuples: ir::Value) -> CodegenResult<()> {
        let rate = cg.config().bloom_false_positive_rate;
        let policy = cg.config().bloom_hash_policy;
        tracing::debug!(rate, ?policy, "bloom filter init");
        let estimate = cg.zext(estimated_num_tuples, I64);
        let rate = cg.const_f64(rate);
        let num_hash_funcs = cg.const_i64(policy.as_runtime_arg() as i64);
        cg.call_runtime("quarry_bloom_filter_init", &[bf, estimate, rate, num_hash_funcs])?;
        Ok(())
    }

    /// The two seed hashes of `values`.
    fn seeds(cg: &mut CodeGen<'_>, values: &[Value]) -> CodegenResult<(ir::Value, ir::Value)> {
        let seed1 = hash_values(cg, values, HashMethod::Crc32)?;
        let seed2 = if values.iter().any(|v| v.sql_type().is_varlen()) {
            Self::rehash(cg, seed1)?
        } else {
            hash_values(cg, values, HashMethod::Murmur3)?
        };
        Ok((seed1, seed2))
    }

    /// A second CRC pass over the first seed, for keys Murmur3 cannot hash.
    fn rehash(cg: &mut CodeGen<'_>, seed: ir::Value) -> CodegenResult<ir::Value> {
        let high_seed = cg.const_i64(CRC_HIGH_SEED as i64);
        let hi = cg.call_runtime_value("quarry_crc32_u64", &[high_seed, seed])?;
        let ones = cg.const_i64(-1);
        let inverted = cg.xor(seed, ones);
        let zero = cg.const_i64(0);
        let lo = cg.call_runtime_value("quarry_crc32_u64", &[zero, inverted])?;
        let hi = cg.shl(hi, 32);
        Ok(cg.or(hi, lo))
    }

    /// Hash of probe `i`.
    fn probe_hash(cg: &mut CodeGen<'_>, seed1: ir::Value, seed2: ir::Value, i: ir::Value) -> ir::Value {
        let step = cg.mul(i, seed2);
        let derived = cg.add(seed1, step);
        let second = cg.icmp_eq_const(i, 1);
        cg.select(second, seed2, derived)
    }

    /// Byte address and bit mask of the bit `hash` selects.
    fn bit_location(cg: &mut CodeGen<'_>, bf: ir::Value, hash: ir::Value) -> (ir::Value, ir::Value) {
        let num_bits = cg.load_field(bf, BloomFilterProxy::num_bits());
        let bit = cg.urem(hash, num_bits);
        let byte_index = cg.ushr(bit, 3);
        let bit_offset = cg.and_const(bit, 7);
        let bytes = cg.load_field(bf, BloomFilterProxy::bytes());
        let addr = cg.ptr_add(bytes, byte_index);
        let one = cg.const_i64(1);
        let mask = cg.shl_value(one, bit_offset);
        let mask = cg.trunc(mask, I8);
        (addr, mask)
    }

    /// Open a loop over the probes of one key. Leaves the builder in the
    /// body with the probe index as loop variable 0.
    fn probe_loop(cg: &mut CodeGen<'_>, bf: ir::Value) -> (Loop, ir::Value) {
        let num_hash_funcs = cg.load_field(bf, BloomFilterProxy::num_hash_funcs());
        let zero = cg.const_i64(0);
        let any = cg.icmp_ult(zero, num_hash_funcs);
        (Loop::new(cg, any, &[zero]), num_hash_funcs)
    }

    pub fn add(&self, cg: &mut CodeGen<'_>, bf: ir::Value, values: &[Value]) -> CodegenResult<()> {
        let (seed1, seed2) = Self::seeds(cg, values)?;
        let (mut probes, num_hash_funcs) = Self::probe_loop(cg, bf);
        let i = probes.loop_var(0);
        let hash = Self::probe_hash(cg, seed1, seed2, i);
        let (addr, mask) = Self::bit_location(cg, bf, hash);
        let byte = cg.load(I8, addr, 0);
        let byte = cg.or(byte, mask);
        cg.store(byte, addr, 0);
        let next = cg.add_const(i, 1);
        let more = cg.icmp_ult(next, num_hash_funcs);
        probes.loop_end(cg, more, &[next]);
        Ok(())
    }

    /// Returns an `i8` that is 1 when every probed bit is set.
    ///
    /// Stops at the first unset bit and updates the probe and miss counters.
    pub fn contains(&self, cg: &mut CodeGen<'_>, bf: ir::Value, values: &[Value]) -> CodegenResult<ir::Value> {
        let (seed1, seed2) = Self::seeds(cg, values)?;
        let num_probes = cg.load_field(bf, BloomFilterProxy::num_probes());
        let num_probes = cg.add_const(num_probes, 1);
        cg.store_field(bf, BloomFilterProxy::num_probes(), num_probes);

        let (mut probes, num_hash_funcs) = Self::probe_loop(cg, bf);
        let i = probes.loop_var(0);
        let hash = Self::probe_hash(cg, seed1, seed2, i);
        let (addr, mask) = Self::bit_location(cg, bf, hash);
        let byte = cg.load(I8, addr, 0);
        let bit = cg.and(byte, mask);
        let unset = cg.icmp_eq_const(bit, 0);
        let mut miss = If::new(cg, unset);
        probes.break_(cg);
        miss.end_if(cg);
        let next = cg.add_const(i, 1);
        let more = cg.icmp_ult(next, num_hash_funcs);
        probes.loop_end(cg, more, &[next]);

        // Only a break leaves the loop before the last probe.
        let finals = probes.collect_final_loop_variables(cg);
        let present = cg.icmp_eq(finals[0], num_hash_funcs);
        let absent = cg.not(present);
        let mut count_miss = If::new(cg, absent);
        let num_misses = cg.load_field(bf, BloomFilterProxy::num_misses());
        let num_misses = cg.add_const(num_misses, 1);
        cg.store_field(bf, BloomFilterProxy::num_misses(), num_misses);
        count_miss.end_if(cg);
        Ok(present)
    }

    pub fn destroy(&self, cg: &mut CodeGen<'_>, bf: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_bloom_filter_destroy", &[bf])?;
        Ok(())
    }
}
