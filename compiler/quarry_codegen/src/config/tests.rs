use pretty_assertions::assert_eq;

use super::*;

#[test]
fn defaults_match_runtime_constants() {
    let config = CodegenConfig::default();
    assert_eq!(config.default_hash_method, HashMethod::Crc32);
    assert_eq!(config.prefetch_distance, 10);
    assert_eq!(config.oa_initial_size, 8 * 1024);
    assert_eq!(config.kv_list_initial_capacity, 8);
    assert_eq!(config.vector_size, 1024);
    assert!((config.bloom_false_positive_rate - 0.1).abs() < f64::EPSILON);
    assert_eq!(config.bloom_hash_policy, BloomHashPolicy::Optimal);
}

#[test]
fn builders_override_single_fields() {
    let config = CodegenConfig::default()
        .with_hash_method(HashMethod::Murmur3)
        .with_vector_size(64)
        .with_bloom_hash_policy(BloomHashPolicy::Fixed(2));
    assert_eq!(config.default_hash_method, HashMethod::Murmur3);
    assert_eq!(config.vector_size, 64);
    assert_eq!(config.bloom_hash_policy.as_runtime_arg(), 2);
    assert_eq!(config.prefetch_distance, DEFAULT_PREFETCH_DISTANCE);
}

#[test]
fn optimal_policy_is_zero_on_the_wire() {
    assert_eq!(BloomHashPolicy::Optimal.as_runtime_arg(), 0);
    assert_eq!(BloomHashPolicy::Fixed(0).as_runtime_arg(), 1);
}

#[test]
#[should_panic(expected = "power of two")]
fn vector_size_must_be_power_of_two() {
    let _ = CodegenConfig::default().with_vector_size(1000);
}
