use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::thread_states::{
    quarry_thread_states_access, quarry_thread_states_destroy, quarry_thread_states_init,
    quarry_thread_states_reset,
};

/// Rows are `(key: u64, seq: u64)`; compares by key only.
extern "C" fn by_key(a: *const u8, b: *const u8) -> i32 {
    let (a, b) = unsafe { (a.cast::<u64>().read_unaligned(), b.cast::<u64>().read_unaligned()) };
    a.cmp(&b) as i32
}

extern "C" fn by_key_desc(a: *const u8, b: *const u8) -> i32 {
    -by_key(a, b)
}

fn empty_sorter() -> Sorter {
    Sorter {
        buffer_start: std::ptr::null_mut(),
        buffer_pos: std::ptr::null_mut(),
        buffer_end: std::ptr::null_mut(),
        tuple_size: 0,
        comparison_fn: None,
        tuples_start: std::ptr::null_mut(),
        tuples_end: std::ptr::null_mut(),
    }
}

fn new_sorter(cmp: ComparisonFn) -> Sorter {
    let mut sorter = empty_sorter();
    quarry_sorter_init(&mut sorter, Some(cmp), 16);
    sorter
}

fn push(sorter: &mut Sorter, key: u64, seq: u64) {
    let slot = quarry_sorter_append(sorter).cast::<u64>();
    unsafe {
        slot.write_unaligned(key);
        slot.add(1).write_unaligned(seq);
    }
}

fn contents(sorter: &Sorter) -> Vec<(u64, u64)> {
    (0..sorter.num_tuples() as usize)
        .map(|i| unsafe {
            let row = sorter.buffer_start.add(i * 16).cast::<u64>();
            (row.read_unaligned(), row.add(1).read_unaligned())
        })
        .collect()
}

#[test]
fn sort_orders_buffer_in_place() {
    let mut sorter = new_sorter(by_key);
    for (seq, key) in [5u64, 3, 9, 1].into_iter().enumerate() {
        push(&mut sorter, key, seq as u64);
    }
    quarry_sorter_sort(&mut sorter);
    assert_eq!(contents(&sorter), vec![(1, 3), (3, 1), (5, 0), (9, 2)]);
    assert_eq!(sorter.tuples_end as usize - sorter.tuples_start as usize, 4 * 8);
    quarry_sorter_destroy(&mut sorter);
}

#[test]
fn sort_is_stable() {
    let mut sorter = new_sorter(by_key);
    push(&mut sorter, 2, 0);
    push(&mut sorter, 1, 1);
    push(&mut sorter, 2, 2);
    push(&mut sorter, 1, 3);
    quarry_sorter_sort(&mut sorter);
    assert_eq!(contents(&sorter), vec![(1, 1), (1, 3), (2, 0), (2, 2)]);
    quarry_sorter_destroy(&mut sorter);
}

#[test]
fn descending_comparator() {
    let mut sorter = new_sorter(by_key_desc);
    for key in 0..10 {
        push(&mut sorter, key, 0);
    }
    quarry_sorter_sort(&mut sorter);
    let keys: Vec<u64> = contents(&sorter).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, (0..10).rev().collect::<Vec<_>>());
    quarry_sorter_destroy(&mut sorter);
}

#[test]
fn grows_past_initial_capacity() {
    let mut sorter = new_sorter(by_key);
    let n = INITIAL_NUM_TUPLES * 3 + 7;
    for key in (0..n).rev() {
        push(&mut sorter, key, 0);
    }
    assert_eq!(sorter.num_tuples(), n);
    quarry_sorter_sort(&mut sorter);
    let keys: Vec<u64> = contents(&sorter).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, (0..n).collect::<Vec<_>>());
    quarry_sorter_destroy(&mut sorter);
}

#[test]
fn sort_empty() {
    let mut sorter = new_sorter(by_key);
    quarry_sorter_sort(&mut sorter);
    assert_eq!(sorter.num_tuples(), 0);
    quarry_sorter_destroy(&mut sorter);
}

#[test]
fn parallel_sort_merges_thread_local_sorters() {
    let mut ts = ThreadStates {
        states: std::ptr::null_mut(),
        num_threads: 0,
        state_size: 0,
    };
    quarry_thread_states_init(&mut ts, 4);
    quarry_thread_states_reset(&mut ts, std::mem::size_of::<Sorter>() as u32);

    let mut expected = Vec::new();
    for t in 0..4u32 {
        let local = quarry_thread_states_access(&ts, t).cast::<Sorter>();
        quarry_sorter_init(local, Some(by_key), 16);
        for i in 0..50u64 {
            let key = (i * 7 + u64::from(t) * 13) % 97;
            push(unsafe { &mut *local }, key, u64::from(t));
            expected.push(key);
        }
    }

    let mut sorter = new_sorter(by_key);
    quarry_sorter_sort_parallel(&mut sorter, &ts, 0);
    expected.sort_unstable();
    let keys: Vec<u64> = contents(&sorter).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, expected);

    for t in 0..4u32 {
        let local = unsafe { &*quarry_thread_states_access(&ts, t).cast::<Sorter>() };
        assert!(local.buffer_start.is_null());
    }

    quarry_sorter_destroy(&mut sorter);
    quarry_thread_states_destroy(&mut ts);
}

proptest! {
    #[test]
    fn sorted_output_is_a_sorted_permutation(keys in proptest::collection::vec(any::<u64>(), 0..300)) {
        let mut sorter = new_sorter(by_key);
        for (seq, &key) in keys.iter().enumerate() {
            push(&mut sorter, key, seq as u64);
        }
        quarry_sorter_sort(&mut sorter);
        let out = contents(&sorter);
        let mut expected: Vec<(u64, u64)> = keys.iter().enumerate().map(|(s, &k)| (k, s as u64)).collect();
        expected.sort_by_key(|&(k, _)| k);
        prop_assert_eq!(out, expected);
        quarry_sorter_destroy(&mut sorter);
    }
}
