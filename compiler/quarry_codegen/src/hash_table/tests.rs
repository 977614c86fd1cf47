use std::collections::BTreeMap;

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::{I64, I8};
use pretty_assertions::assert_eq;
use quarry_rt::cc_hash_table::{
    quarry_cc_hash_table_destroy, quarry_cc_hash_table_init, CcHashEntry, CcHashTable as RtCcHashTable,
};
use quarry_rt::oa_hash_table::{quarry_oa_hash_table_destroy, OaHashTable as RtOaHashTable, OaHashEntry};
use quarry_rt::thread_states::{
    quarry_thread_states_access, quarry_thread_states_destroy, quarry_thread_states_init,
    quarry_thread_states_reset, ThreadStates,
};

use super::{CcHashTable, NoOp, OaHashTable, OaHashTableAccess};
use crate::codegen::CodeGen;
use crate::error::{CodegenError, CodegenResult};
use crate::lang::{If, Loop, Vector};
use crate::test_helpers::{as_fn, jit, jit_with, Jitted};
use crate::types::{SqlType, Type, Value};
use crate::{CodeContext, CodegenConfig};

fn bigint_key(value: ir::Value) -> Vec<Value> {
    vec![Value::new(Type::not_null(SqlType::BigInt), value)]
}

fn oa_table() -> OaHashTable {
    OaHashTable::new(&[Type::not_null(SqlType::BigInt)], 8)
}

fn zeroed_oa() -> RtOaHashTable {
    // SAFETY: every field is an integer or raw pointer
    unsafe { std::mem::zeroed() }
}

fn zeroed_cc() -> RtCcHashTable {
    // SAFETY: every field is an integer or raw pointer
    unsafe { std::mem::zeroed() }
}

/// `init(ht)` with an 8-bucket default size.
fn oa_init_for(table: &OaHashTable) -> Jitted {
    let config = CodegenConfig::default().with_oa_initial_size(8);
    jit_with(config, &[I64], &[], |cg, args| {
        table.init(cg, args[0], None)?;
        cg.ret(&[]);
        Ok(())
    })
}

/// Key to the values stored under it, read natively.
fn oa_contents(ht: &RtOaHashTable) -> BTreeMap<u64, Vec<u64>> {
    let mut out = BTreeMap::new();
    for entry in ht.occupied_entries() {
        let key = unsafe { OaHashEntry::data(entry).cast::<u64>().read() };
        let mut values: Vec<u64> = ht
            .values(entry)
            .into_iter()
            .map(|v| unsafe { v.cast::<u64>().read() })
            .collect();
        values.sort_unstable();
        out.insert(key, values);
    }
    out
}

fn accumulate(cg: &mut CodeGen<'_>, acc: ir::Value, amount: ir::Value) {
    let old = cg.load(I64, acc, 0);
    let new = cg.add(old, amount);
    cg.store(new, acc, 0);
}

/// An `i64` stack slot starting at zero.
fn new_accumulator(cg: &mut CodeGen<'_>) -> ir::Value {
    let acc = cg.stack_buffer(8, 8);
    let zero = cg.const_i64(0);
    cg.store(zero, acc, 0);
    acc
}

/// `count(ht, key, hash)`: bump the counter of `key`, starting at 1.
fn oa_counter(table: &OaHashTable) -> Jitted {
    jit(&[I64, I64, I64], &[], |cg, args| {
        let (ht, key, hash) = (args[0], args[1], args[2]);
        let keys = bigint_key(key);
        table.probe_or_insert(
            cg,
            ht,
            Some(hash),
            &keys,
            &mut |cg: &mut CodeGen<'_>, value: ir::Value| -> CodegenResult<()> {
                let count = cg.load(I64, value, 0);
                let count = cg.add_const(count, 1);
                cg.store(count, value, 0);
                Ok(())
            },
            &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
                let one = cg.const_i64(1);
                cg.store(one, space, 0);
                Ok(())
            },
        )?;
        cg.ret(&[]);
        Ok(())
    })
}

#[test]
fn oa_probe_or_insert_walks_collisions() {
    let table = oa_table();
    let init = oa_init_for(&table);
    let count = oa_counter(&table);
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let count: extern "C" fn(*mut RtOaHashTable, u64, u64) = unsafe { as_fn(count.ptr) };

    let mut ht = zeroed_oa();
    init(&mut ht);
    assert_eq!(ht.num_buckets, 8);
    assert_eq!(ht.entry_size, table.entry_size());

    // 1 and 9 share home bucket 1 in an 8-bucket table.
    for key in [1, 2, 9, 1, 9, 9] {
        count(&mut ht, key, key);
    }
    assert_eq!(ht.num_occupied_buckets, 3);
    assert_eq!(
        oa_contents(&ht),
        BTreeMap::from([(1, vec![2]), (2, vec![1]), (9, vec![3])])
    );
    quarry_oa_hash_table_destroy(&mut ht);
}

#[test]
fn oa_probe_or_insert_survives_resize() {
    let table = oa_table();
    let init = oa_init_for(&table);
    let count = oa_counter(&table);
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let count: extern "C" fn(*mut RtOaHashTable, u64, u64) = unsafe { as_fn(count.ptr) };

    let mut ht = zeroed_oa();
    init(&mut ht);
    for round in 0..3 {
        for key in 0..100_u64 {
            count(&mut ht, key, quarry_rt::hash::murmur3_fmix64(key));
        }
        assert_eq!(ht.num_occupied_buckets, 100, "round {round}");
    }
    assert!(ht.num_buckets >= 256);
    let contents = oa_contents(&ht);
    assert_eq!(contents.len(), 100);
    assert!(contents.values().all(|values| values == &vec![3]));
    quarry_oa_hash_table_destroy(&mut ht);
}

#[test]
fn oa_probe_result_reports_existing_keys() {
    let table = oa_table();
    let init = oa_init_for(&table);
    // Returns 1 when the key existed; new keys get key * 10 as value.
    let upsert = jit(&[I64, I64], &[I64], |cg, args| {
        let (ht, key) = (args[0], args[1]);
        let keys = bigint_key(key);
        let result = table.probe_or_insert_result(cg, ht, None, &keys)?;
        let absent = cg.not(result.key_exists);
        let mut fresh = If::new(cg, absent);
        let value = cg.mul_const(key, 10);
        cg.store(value, result.data_ptr, 0);
        fresh.end_if(cg);
        let existed = cg.zext(result.key_exists, I64);
        cg.ret(&[existed]);
        Ok(())
    });
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let upsert: extern "C" fn(*mut RtOaHashTable, u64) -> u64 = unsafe { as_fn(upsert.ptr) };

    let mut ht = zeroed_oa();
    init(&mut ht);
    assert_eq!(upsert(&mut ht, 4), 0);
    assert_eq!(upsert(&mut ht, 5), 0);
    assert_eq!(upsert(&mut ht, 4), 1);
    assert_eq!(oa_contents(&ht), BTreeMap::from([(4, vec![40]), (5, vec![50])]));
    quarry_oa_hash_table_destroy(&mut ht);
}

/// `insert(ht, key, value)` that keeps duplicates.
fn oa_inserter(table: &OaHashTable) -> Jitted {
    jit(&[I64, I64, I64], &[], |cg, args| {
        let (ht, key, value) = (args[0], args[1], args[2]);
        let keys = bigint_key(key);
        table.insert(cg, ht, None, &keys, &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
            cg.store(value, space, 0);
            Ok(())
        })?;
        cg.ret(&[]);
        Ok(())
    })
}

#[test]
fn oa_find_all_visits_every_duplicate() {
    let table = oa_table();
    let init = oa_init_for(&table);
    let insert = oa_inserter(&table);
    // Sum of the values stored under `key`.
    let sum = jit(&[I64, I64], &[I64], |cg, args| {
        let (ht, key) = (args[0], args[1]);
        let acc = new_accumulator(cg);
        let keys = bigint_key(key);
        table.find_all(
            cg,
            ht,
            None,
            &keys,
            &mut |cg: &mut CodeGen<'_>, stored: &[Value], value: ir::Value| -> CodegenResult<()> {
                assert_eq!(stored.len(), 1);
                let v = cg.load(I64, value, 0);
                accumulate(cg, acc, v);
                Ok(())
            },
        )?;
        let total = cg.load(I64, acc, 0);
        cg.ret(&[total]);
        Ok(())
    });
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let insert: extern "C" fn(*mut RtOaHashTable, u64, u64) = unsafe { as_fn(insert.ptr) };
    let sum: extern "C" fn(*mut RtOaHashTable, u64) -> u64 = unsafe { as_fn(sum.ptr) };

    let mut ht = zeroed_oa();
    init(&mut ht);
    for value in 1..=20 {
        insert(&mut ht, 5, value);
    }
    insert(&mut ht, 6, 100);
    assert_eq!(sum(&mut ht, 5), 210);
    assert_eq!(sum(&mut ht, 6), 100);
    assert_eq!(sum(&mut ht, 7), 0);
    assert_eq!(ht.num_entries, 21);
    quarry_oa_hash_table_destroy(&mut ht);
}

#[test]
fn oa_init_passes_the_configured_list_capacity() {
    let table = oa_table();
    let config = CodegenConfig::default().with_oa_initial_size(8).with_kv_list_initial_capacity(4);
    let init = jit_with(config, &[I64], &[], |cg, args| {
        table.init(cg, args[0], None)?;
        cg.ret(&[]);
        Ok(())
    });
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let insert = oa_inserter(&table);
    let insert: extern "C" fn(*mut RtOaHashTable, u64, u64) = unsafe { as_fn(insert.ptr) };

    let mut ht = zeroed_oa();
    init(&mut ht);
    assert_eq!(ht.kv_list_capacity, 4);
    for value in 0..9 {
        insert(&mut ht, 1, value);
    }
    let contents = oa_contents(&ht);
    assert_eq!(contents[&1], (0..9).collect::<Vec<_>>());
    quarry_oa_hash_table_destroy(&mut ht);
}

#[test]
fn oa_iterate_and_vectorized_iterate_agree() {
    let table = oa_table();
    let init = oa_init_for(&table);
    let insert = oa_inserter(&table);
    // Sum of key * value over every stored value.
    let weighted = jit(&[I64], &[I64], |cg, args| {
        let acc = new_accumulator(cg);
        table.iterate(
            cg,
            args[0],
            &mut |cg: &mut CodeGen<'_>, keys: &[Value], value: ir::Value| -> CodegenResult<()> {
                let v = cg.load(I64, value, 0);
                let product = cg.mul(keys[0].value(), v);
                accumulate(cg, acc, product);
                Ok(())
            },
        )?;
        let total = cg.load(I64, acc, 0);
        cg.ret(&[total]);
        Ok(())
    });
    // Sum of key * first value over occupied buckets, four buckets a batch.
    let batched = jit(&[I64], &[I64], |cg, args| {
        let acc = new_accumulator(cg);
        table.vectorized_iterate(
            cg,
            args[0],
            4,
            &mut |cg: &mut CodeGen<'_>,
                  _start: ir::Value,
                  _end: ir::Value,
                  selection: &Vector,
                  access: &OaHashTableAccess<'_>| -> CodegenResult<()> {
                let n = selection.num_elements();
                let zero = cg.const_i32(0);
                let any = cg.icmp_ult(zero, n);
                let mut lp = Loop::new(cg, any, &[zero]);
                let i = lp.loop_var(0);
                let bucket = selection.get_value(cg, i);
                let keys = access.extract_bucket_keys(cg, bucket);
                let value = access.bucket_value(cg, bucket);
                let v = cg.load(I64, value, 0);
                let product = cg.mul(keys[0].value(), v);
                accumulate(cg, acc, product);
                let next = cg.add_const(i, 1);
                let more = cg.icmp_ult(next, n);
                lp.loop_end(cg, more, &[next]);
                Ok(())
            },
        )?;
        let total = cg.load(I64, acc, 0);
        cg.ret(&[total]);
        Ok(())
    });
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let insert: extern "C" fn(*mut RtOaHashTable, u64, u64) = unsafe { as_fn(insert.ptr) };
    let weighted: extern "C" fn(*mut RtOaHashTable) -> u64 = unsafe { as_fn(weighted.ptr) };
    let batched: extern "C" fn(*mut RtOaHashTable) -> u64 = unsafe { as_fn(batched.ptr) };

    let mut ht = zeroed_oa();
    init(&mut ht);
    assert_eq!(weighted(&mut ht), 0);
    assert_eq!(batched(&mut ht), 0);
    for key in 1..=3 {
        insert(&mut ht, key, key + 1);
    }
    assert_eq!(weighted(&mut ht), 2 + 2 * 3 + 3 * 4);
    assert_eq!(batched(&mut ht), 2 + 2 * 3 + 3 * 4);
    quarry_oa_hash_table_destroy(&mut ht);
}

#[test]
#[should_panic(expected = "power of two")]
fn oa_vectorized_iterate_rejects_odd_batches() {
    let table = oa_table();
    jit(&[I64], &[], |cg, args| {
        table.vectorized_iterate(
            cg,
            args[0],
            3,
            &mut |_cg: &mut CodeGen<'_>,
                  _start: ir::Value,
                  _end: ir::Value,
                  _selection: &Vector,
                  _access: &OaHashTableAccess<'_>|
             -> CodegenResult<()> { Ok(()) },
        )?;
        cg.ret(&[]);
        Ok(())
    });
}

#[test]
fn oa_prefetch_compiles_to_a_runtime_call() {
    let table = oa_table();
    let init = oa_init_for(&table);
    let prefetch = jit(&[I64, I64], &[], |cg, args| {
        table.prefetch_bucket(cg, args[0], args[1])?;
        cg.ret(&[]);
        Ok(())
    });
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let prefetch: extern "C" fn(*mut RtOaHashTable, u64) = unsafe { as_fn(prefetch.ptr) };
    let mut ht = zeroed_oa();
    init(&mut ht);
    prefetch(&mut ht, 12345);
    quarry_oa_hash_table_destroy(&mut ht);
}

#[test]
fn oa_group_prefetch_counts_like_row_at_a_time() {
    let table = oa_table();
    let config = CodegenConfig::default().with_oa_initial_size(8).with_prefetch_distance(3);
    // count_all(ht, keys, n): the counter of every key in keys[0..n].
    let count_all = jit_with(config, &[I64, I64, I64], &[], |cg, args| {
        let (ht, keys, n) = (args[0], args[1], args[2]);
        let key_at = |cg: &mut CodeGen<'_>, row: ir::Value| {
            let offset = cg.mul_const(row, 8);
            let addr = cg.ptr_add(keys, offset);
            cg.load(I64, addr, 0)
        };
        table.group_prefetch(
            cg,
            ht,
            n,
            |cg, row| Ok(bigint_key(key_at(cg, row))),
            |cg, row, hash| {
                let keys = bigint_key(key_at(cg, row));
                table.probe_or_insert(
                    cg,
                    ht,
                    Some(hash),
                    &keys,
                    &mut |cg: &mut CodeGen<'_>, value: ir::Value| -> CodegenResult<()> {
                        let one = cg.const_i64(1);
                        accumulate(cg, value, one);
                        Ok(())
                    },
                    &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
                        let one = cg.const_i64(1);
                        cg.store(one, space, 0);
                        Ok(())
                    },
                )
            },
        )?;
        cg.ret(&[]);
        Ok(())
    });
    let init = oa_init_for(&table);
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let count_all: extern "C" fn(*mut RtOaHashTable, *const u64, u64) = unsafe { as_fn(count_all.ptr) };

    // 17 rows: five full groups of three and a short tail.
    let keys: Vec<u64> = (0..17).map(|i| i % 5).collect();
    let mut ht = zeroed_oa();
    init(&mut ht);
    count_all(&mut ht, keys.as_ptr(), keys.len() as u64);
    assert_eq!(
        oa_contents(&ht),
        BTreeMap::from([(0, vec![4]), (1, vec![4]), (2, vec![3]), (3, vec![3]), (4, vec![3])])
    );

    count_all(&mut ht, keys.as_ptr(), 0);
    assert_eq!(ht.num_entries, 5);
    quarry_oa_hash_table_destroy(&mut ht);
}

fn cc_table() -> CcHashTable {
    CcHashTable::new(&[Type::not_null(SqlType::BigInt)], 8)
}

/// Key to the values stored under it, one entry per value.
fn cc_contents(ht: &RtCcHashTable) -> BTreeMap<u64, Vec<u64>> {
    let mut out: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for entry in ht.entries() {
        let data = CcHashEntry::data(entry).cast::<u64>();
        let (key, value) = unsafe { (data.read(), data.add(1).read()) };
        out.entry(key).or_default().push(value);
    }
    for values in out.values_mut() {
        values.sort_unstable();
    }
    out
}

#[test]
fn cc_probe_or_insert_keeps_one_entry_per_key() {
    let table = cc_table();
    let count = jit(&[I64, I64], &[], |cg, args| {
        let (ht, key) = (args[0], args[1]);
        let keys = bigint_key(key);
        table.probe_or_insert(
            cg,
            ht,
            None,
            &keys,
            &mut |cg: &mut CodeGen<'_>, value: ir::Value| -> CodegenResult<()> {
                let count = cg.load(I64, value, 0);
                let count = cg.add_const(count, 1);
                cg.store(count, value, 0);
                Ok(())
            },
            &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
                let one = cg.const_i64(1);
                cg.store(one, space, 0);
                Ok(())
            },
        )?;
        cg.ret(&[]);
        Ok(())
    });
    let count: extern "C" fn(*mut RtCcHashTable, u64) = unsafe { as_fn(count.ptr) };

    let mut ht = zeroed_cc();
    quarry_cc_hash_table_init(&mut ht);
    for key in [3, 1, 3, 3, 2, 1] {
        count(&mut ht, key);
    }
    assert_eq!(ht.num_elements, 3);
    assert_eq!(
        cc_contents(&ht),
        BTreeMap::from([(1, vec![2]), (2, vec![1]), (3, vec![3])])
    );
    quarry_cc_hash_table_destroy(&mut ht);
}

/// `sum(ht, key)` over every value under `key`.
fn cc_summer(table: &CcHashTable) -> Jitted {
    jit(&[I64, I64], &[I64], |cg, args| {
        let (ht, key) = (args[0], args[1]);
        let acc = new_accumulator(cg);
        let keys = bigint_key(key);
        table.find_all(
            cg,
            ht,
            None,
            &keys,
            &mut |cg: &mut CodeGen<'_>, _stored: &[Value], value: ir::Value| -> CodegenResult<()> {
                let v = cg.load(I64, value, 0);
                accumulate(cg, acc, v);
                Ok(())
            },
        )?;
        let total = cg.load(I64, acc, 0);
        cg.ret(&[total]);
        Ok(())
    })
}

#[test]
fn cc_insert_and_find_all() {
    let table = cc_table();
    let insert = jit(&[I64, I64, I64], &[], |cg, args| {
        let (ht, key, value) = (args[0], args[1], args[2]);
        let keys = bigint_key(key);
        table.insert(cg, ht, None, &keys, &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
            cg.store(value, space, 0);
            Ok(())
        })?;
        cg.ret(&[]);
        Ok(())
    });
    let sum = cc_summer(&table);
    let insert: extern "C" fn(*mut RtCcHashTable, u64, u64) = unsafe { as_fn(insert.ptr) };
    let sum: extern "C" fn(*mut RtCcHashTable, u64) -> u64 = unsafe { as_fn(sum.ptr) };

    let mut ht = zeroed_cc();
    quarry_cc_hash_table_init(&mut ht);
    for i in 0..1000 {
        insert(&mut ht, i % 10, i);
    }
    assert_eq!(ht.num_elements, 1000);
    assert_eq!(sum(&mut ht, 0), (0..1000).step_by(10).sum::<u64>());
    assert_eq!(sum(&mut ht, 7), (7..1000).step_by(10).sum::<u64>());
    assert_eq!(sum(&mut ht, 10), 0);
    quarry_cc_hash_table_destroy(&mut ht);
}

#[test]
fn cc_find_all_visits_duplicates_in_insertion_order() {
    let table = cc_table();
    let insert = jit(&[I64, I64, I64], &[], |cg, args| {
        let (ht, key, value) = (args[0], args[1], args[2]);
        let keys = bigint_key(key);
        table.insert(cg, ht, None, &keys, &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
            cg.store(value, space, 0);
            Ok(())
        })?;
        cg.ret(&[]);
        Ok(())
    });
    // Folds the visited values as decimal digits, first visit leftmost.
    let digits = jit(&[I64, I64], &[I64], |cg, args| {
        let (ht, key) = (args[0], args[1]);
        let acc = new_accumulator(cg);
        let keys = bigint_key(key);
        table.find_all(
            cg,
            ht,
            None,
            &keys,
            &mut |cg: &mut CodeGen<'_>, _stored: &[Value], value: ir::Value| -> CodegenResult<()> {
                let v = cg.load(I64, value, 0);
                let old = cg.load(I64, acc, 0);
                let shifted = cg.mul_const(old, 10);
                let new = cg.add(shifted, v);
                cg.store(new, acc, 0);
                Ok(())
            },
        )?;
        let total = cg.load(I64, acc, 0);
        cg.ret(&[total]);
        Ok(())
    });
    let insert: extern "C" fn(*mut RtCcHashTable, u64, u64) = unsafe { as_fn(insert.ptr) };
    let digits: extern "C" fn(*mut RtCcHashTable, u64) -> u64 = unsafe { as_fn(digits.ptr) };

    let mut ht = zeroed_cc();
    quarry_cc_hash_table_init(&mut ht);
    for value in [3, 1, 4, 1, 5] {
        insert(&mut ht, 42, value);
    }
    assert_eq!(digits(&mut ht, 42), 31415);
    quarry_cc_hash_table_destroy(&mut ht);
}

#[test]
fn cc_lazy_build_merges_thread_tables() {
    let table = cc_table();
    let insert_lazy = jit(&[I64, I64], &[], |cg, args| {
        let (ht, key) = (args[0], args[1]);
        let keys = bigint_key(key);
        table.insert_lazy(cg, ht, None, &keys, &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
            let doubled = cg.mul_const(key, 2);
            cg.store(doubled, space, 0);
            Ok(())
        })?;
        cg.ret(&[]);
        Ok(())
    });
    let reserve = jit(&[I64, I64], &[], |cg, args| {
        table.reserve_lazy(cg, args[0], args[1], 0)?;
        cg.ret(&[]);
        Ok(())
    });
    let merge = jit(&[I64, I64], &[], |cg, args| {
        table.merge_lazy_unfinished(cg, args[0], args[1])?;
        cg.ret(&[]);
        Ok(())
    });
    let build = jit(&[I64], &[], |cg, args| {
        table.build_lazy(cg, args[0])?;
        cg.ret(&[]);
        Ok(())
    });
    let sum = cc_summer(&table);
    let insert_lazy: extern "C" fn(*mut RtCcHashTable, u64) = unsafe { as_fn(insert_lazy.ptr) };
    let reserve: extern "C" fn(*mut RtCcHashTable, *mut ThreadStates) = unsafe { as_fn(reserve.ptr) };
    let merge: extern "C" fn(*mut RtCcHashTable, *mut RtCcHashTable) = unsafe { as_fn(merge.ptr) };
    let build: extern "C" fn(*mut RtCcHashTable) = unsafe { as_fn(build.ptr) };
    let sum: extern "C" fn(*mut RtCcHashTable, u64) -> u64 = unsafe { as_fn(sum.ptr) };

    let mut ts: ThreadStates = unsafe { std::mem::zeroed() };
    quarry_thread_states_init(&mut ts, 2);
    quarry_thread_states_reset(&mut ts, std::mem::size_of::<RtCcHashTable>() as u32);
    let locals: Vec<*mut RtCcHashTable> = (0..2)
        .map(|i| quarry_thread_states_access(&ts, i).cast::<RtCcHashTable>())
        .collect();
    for (thread, &local) in locals.iter().enumerate() {
        quarry_cc_hash_table_init(local);
        for key in 0..50_u64 {
            if key % 2 == thread as u64 {
                insert_lazy(local, key);
            }
        }
        // Lazy entries are not linked yet.
        assert_eq!(sum(local, 2 * thread as u64), 0);
    }

    let mut global = zeroed_cc();
    quarry_cc_hash_table_init(&mut global);
    reserve(&mut global, &mut ts);
    for &local in &locals {
        merge(&mut global, local);
    }
    assert_eq!(global.num_elements, 50);
    assert_eq!(sum(&mut global, 21), 42);
    assert_eq!(sum(&mut global, 48), 96);

    // A single table builds its own lazy list.
    let mut own = zeroed_cc();
    quarry_cc_hash_table_init(&mut own);
    insert_lazy(&mut own, 7);
    build(&mut own);
    assert_eq!(sum(&mut own, 7), 14);

    quarry_cc_hash_table_destroy(&mut own);
    quarry_cc_hash_table_destroy(&mut global);
    for local in locals {
        quarry_cc_hash_table_destroy(local);
    }
    quarry_thread_states_destroy(&mut ts);
}

#[test]
fn cc_without_key_schema_is_unsupported() {
    let table = CcHashTable::default();
    let mut ctx = CodeContext::new(CodegenConfig::default()).unwrap();
    let err = ctx
        .define_function("probe", &[I64, I64], &[], |cg, args| {
            let keys = bigint_key(args[1]);
            table.probe_or_insert(cg, args[0], None, &keys, &mut NoOp, &mut NoOp)
        })
        .unwrap_err();
    assert!(matches!(err, CodegenError::Unsupported(_)), "{err:?}");
}

#[test]
fn cc_vectorized_iterate_is_not_implemented() {
    let table = cc_table();
    let mut ctx = CodeContext::new(CodegenConfig::default()).unwrap();
    let err = ctx
        .define_function("scan", &[I64], &[], |cg, args| table.vectorized_iterate(cg, args[0], 8))
        .unwrap_err();
    assert!(matches!(err, CodegenError::NotImplemented(_)), "{err:?}");
}

#[test]
fn cc_iterate_visits_every_entry() {
    let table = cc_table();
    let insert = jit(&[I64, I64], &[], |cg, args| {
        let keys = bigint_key(args[1]);
        let one = cg.const_i64(1);
        table.insert(cg, args[0], None, &keys, &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
            cg.store(one, space, 0);
            Ok(())
        })?;
        cg.ret(&[]);
        Ok(())
    });
    let key_sum = jit(&[I64], &[I64], |cg, args| {
        let acc = new_accumulator(cg);
        table.iterate(
            cg,
            args[0],
            &mut |cg: &mut CodeGen<'_>, keys: &[Value], _value: ir::Value| -> CodegenResult<()> {
                accumulate(cg, acc, keys[0].value());
                Ok(())
            },
        )?;
        let total = cg.load(I64, acc, 0);
        cg.ret(&[total]);
        Ok(())
    });
    let insert: extern "C" fn(*mut RtCcHashTable, u64) = unsafe { as_fn(insert.ptr) };
    let key_sum: extern "C" fn(*mut RtCcHashTable) -> u64 = unsafe { as_fn(key_sum.ptr) };

    let mut ht = zeroed_cc();
    quarry_cc_hash_table_init(&mut ht);
    for key in 1..=300 {
        insert(&mut ht, key);
    }
    assert_eq!(key_sum(&mut ht), 300 * 301 / 2);
    quarry_cc_hash_table_destroy(&mut ht);
}

#[test]
fn nullable_keys_match_on_null() {
    // A nullable key column: NULL only equals NULL.
    let table = OaHashTable::new(&[Type::nullable(SqlType::Integer)], 8);
    let init = oa_init_for(&table);
    let count = jit(&[I64, I64, I8], &[], |cg, args| {
        let ht = args[0];
        let key = cg.trunc(args[1], cranelift_codegen::ir::types::I32);
        let keys = vec![Value::with_null(Type::nullable(SqlType::Integer), key, args[2])];
        table.probe_or_insert(
            cg,
            ht,
            None,
            &keys,
            &mut |cg: &mut CodeGen<'_>, value: ir::Value| -> CodegenResult<()> {
                let count = cg.load(I64, value, 0);
                let count = cg.add_const(count, 1);
                cg.store(count, value, 0);
                Ok(())
            },
            &mut |cg: &mut CodeGen<'_>, space: ir::Value| -> CodegenResult<()> {
                let one = cg.const_i64(1);
                cg.store(one, space, 0);
                Ok(())
            },
        )?;
        cg.ret(&[]);
        Ok(())
    });
    let init: extern "C" fn(*mut RtOaHashTable) = unsafe { as_fn(init.ptr) };
    let count: extern "C" fn(*mut RtOaHashTable, u64, u8) = unsafe { as_fn(count.ptr) };

    let mut ht = zeroed_oa();
    init(&mut ht);
    count(&mut ht, 7, 0);
    count(&mut ht, 0, 1);
    count(&mut ht, 0, 1);
    count(&mut ht, 0, 0);
    assert_eq!(ht.num_occupied_buckets, 3);
    quarry_oa_hash_table_destroy(&mut ht);
}
