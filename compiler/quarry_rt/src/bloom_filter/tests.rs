use pretty_assertions::assert_eq;

use super::*;
use crate::hash::{hash_crc64_bytes, murmur3_fmix64};

fn new_filter(n: u64, rate: f64, fixed: u64) -> BloomFilter {
    let mut bf = BloomFilter {
        num_hash_funcs: 0,
        bytes: std::ptr::null_mut(),
        num_bits: 0,
        num_misses: 0,
        num_probes: 0,
    };
    quarry_bloom_filter_init(&mut bf, n, rate, fixed);
    bf
}

fn seeds(key: u64) -> (u64, u64) {
    (hash_crc64_bytes(&key.to_le_bytes(), 0), murmur3_fmix64(key))
}

#[test]
fn optimal_size_for_ten_percent() {
    // -1000 * ln(0.1) / ln(2)^2 = 4792.5...
    let (bits, k) = filter_size(1000, 0.1, 0);
    assert_eq!(bits, 4793);
    assert_eq!(k, 3);
}

#[test]
fn fixed_hash_count_is_kept() {
    let (bits, k) = filter_size(1000, 0.1, 1);
    assert_eq!(k, 1);
    // With one hash function the array must be larger than the optimal one.
    assert!(bits > 4793);
}

#[test]
fn tiny_estimate_gets_minimum_bits() {
    let (bits, k) = filter_size(0, 0.1, 0);
    assert_eq!(bits, MIN_BITS);
    assert!(k >= 1);
}

#[test]
fn added_keys_are_always_found() {
    let mut bf = new_filter(500, DEFAULT_FALSE_POSITIVE_RATE, 0);
    for key in 0..500u64 {
        let (s1, s2) = seeds(key);
        bf.add_hashes(s1, s2);
    }
    for key in 0..500u64 {
        let (s1, s2) = seeds(key);
        assert!(bf.contains_hashes(s1, s2), "key {key} missing");
    }
    assert_eq!(bf.num_probes, 500);
    assert_eq!(bf.num_misses, 0);
    quarry_bloom_filter_destroy(&mut bf);
    assert!(bf.bytes.is_null());
}

#[test]
fn false_positive_rate_is_near_target() {
    let mut bf = new_filter(2000, 0.1, 0);
    for key in 0..2000u64 {
        let (s1, s2) = seeds(key);
        bf.add_hashes(s1, s2);
    }
    let false_positives = (10_000..20_000u64)
        .filter(|&key| {
            let (s1, s2) = seeds(key);
            bf.contains_hashes(s1, s2)
        })
        .count();
    // Loose bound; the target is 10%.
    assert!(false_positives < 2_000, "{false_positives} false positives");
    assert_eq!(bf.num_probes, 10_000);
    assert_eq!(bf.num_misses, 10_000 - false_positives as u64);
    quarry_bloom_filter_destroy(&mut bf);
}

#[test]
fn empty_filter_rejects_everything() {
    let mut bf = new_filter(100, 0.01, 0);
    assert!(!bf.contains_hashes(1, 2));
    assert!(!bf.contains_hashes(u64::MAX, 0));
    assert_eq!(bf.num_misses, 2);
    quarry_bloom_filter_destroy(&mut bf);
}
