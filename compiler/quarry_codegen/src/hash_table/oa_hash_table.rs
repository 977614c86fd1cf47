//! Open-addressing hash table codegen.
//!
//! Generated code does all probing. Every operation funnels through
//! [`OaHashTable::translate_probing`], which emits one linear-probing loop
//! and splices in what to do on a free bucket and on a matching key. The
//! bucket array pointer and mask are loaded once per probe; a probe always
//! ends right after any call to `store_tuple`, which may move the array.

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::{I32, I64, I8};
use quarry_rt::oa_hash_table::{entry_size, STATUS_FREE, STATUS_SINGLE_VALUE};

use super::callbacks::{InsertCallback, IterateCallback, ProbeCallback, VectorizedIterateCallback};
use crate::codegen::{CodeGen, PTR};
use crate::compact_storage::CompactStorage;
use crate::error::CodegenResult;
use crate::hash::hash_values;
use crate::lang::{If, Loop, Range, Vector, VectorizedLoop};
use crate::proxy::{KeyValueListProxy, OaHashEntryProxy, OaHashTableProxy};
use crate::types::{Type, Value};

/// Outcome of [`OaHashTable::probe_or_insert_result`].
#[derive(Clone, Copy, Debug)]
pub struct ProbeResult {
    /// `i8` 1 when the key was already present.
    pub key_exists: ir::Value,
    /// The existing value, or the new value space to initialize.
    pub data_ptr: ir::Value,
}

/// What a probe does when it reaches a free bucket or a matching key.
enum Probing<'c> {
    ProbeOrInsert {
        probe: &'c mut dyn ProbeCallback,
        insert: &'c mut dyn InsertCallback,
    },
    ProbeOrInsertResult,
    Insert {
        insert: &'c mut dyn InsertCallback,
    },
    FindAll {
        callback: &'c mut dyn IterateCallback,
    },
}

#[derive(Clone, Debug)]
pub struct OaHashTable {
    key_storage: CompactStorage,
    value_size: u32,
    entry_size: u64,
}

impl OaHashTable {
    pub fn new(key_types: &[Type], value_size: u32) -> Self {
        let key_storage = CompactStorage::setup(key_types);
        let entry_size = entry_size(u64::from(key_storage.max_storage_size()), u64::from(value_size));
        tracing::debug!(
            key_size = key_storage.max_storage_size(),
            value_size,
            entry_size,
            "open-addressing hash table layout"
        );
        OaHashTable {
            key_storage,
            value_size,
            entry_size,
        }
    }

    pub fn key_storage(&self) -> &CompactStorage {
        &self.key_storage
    }

    pub fn entry_size(&self) -> u64 {
        self.entry_size
    }

    fn key_offset() -> i64 {
        i64::from(OaHashEntryProxy::SIZE)
    }

    fn inline_value_offset(&self) -> i64 {
        Self::key_offset() + i64::from(self.key_storage.max_storage_size())
    }

    fn entry_addr(&self, cg: &mut CodeGen<'_>, buckets: ir::Value, index: ir::Value) -> ir::Value {
        let index = cg.resize_unsigned(index, I64);
        let offset = cg.mul_const(index, self.entry_size as i64);
        cg.ptr_add(buckets, offset)
    }

    fn hash_or_compute(cg: &mut CodeGen<'_>, hash: Option<ir::Value>, keys: &[Value]) -> CodegenResult<ir::Value> {
        match hash {
            Some(hash) => Ok(hash),
            None => {
                let method = cg.config().default_hash_method;
                hash_values(cg, keys, method)
            }
        }
    }

    /// Emit a call to `quarry_oa_hash_table_init`.
    ///
    /// Without an estimate the table starts at the configured initial size.
    pub fn init(&self, cg: &mut CodeGen<'_>, ht: ir::Value, estimated_entries: Option<ir::Value>) -> CodegenResult<()> {
        let key_size = cg.const_i64(i64::from(self.key_storage.max_storage_size()));
        let value_size = cg.const_i64(i64::from(self.value_size));
        let estimate = match estimated_entries {
            Some(estimate) => cg.zext(estimate, I64),
            None => {
                let initial = cg.config().oa_initial_size as i64;
                cg.const_i64(initial)
            }
        };
        let kv_list_capacity = i64::from(cg.config().kv_list_initial_capacity);
        let kv_list_capacity = cg.const_i64(kv_list_capacity);
        cg.call_runtime(
            "quarry_oa_hash_table_init",
            &[ht, key_size, value_size, estimate, kv_list_capacity],
        )?;
        Ok(())
    }

    /// Claim `entry` for `keys` and write them. Returns the value space.
    fn store_key(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        entry: ir::Value,
        hash: ir::Value,
        keys: &[Value],
    ) -> CodegenResult<ir::Value> {
        let key_area = cg.call_runtime_value("quarry_oa_hash_table_store_tuple", &[ht, entry, hash])?;
        Ok(self.key_storage.store_values(cg, key_area, keys))
    }

    /// Address of the first value stored in an occupied entry.
    fn first_value(&self, cg: &mut CodeGen<'_>, entry: ir::Value, kv_list: ir::Value) -> ir::Value {
        let single = cg.icmp_eq_const(kv_list, STATUS_SINGLE_VALUE as i64);
        let inline = cg.ptr_add_const(entry, self.inline_value_offset());
        let listed = cg.ptr_add_const(kv_list, i64::from(KeyValueListProxy::SIZE));
        cg.select(single, inline, listed)
    }

    /// Emit `body` once per value of an occupied entry.
    fn for_each_value<F>(&self, cg: &mut CodeGen<'_>, entry: ir::Value, kv_list: ir::Value, mut body: F) -> CodegenResult<()>
    where
        F: FnMut(&mut CodeGen<'_>, ir::Value) -> CodegenResult<()>,
    {
        let single = cg.icmp_eq_const(kv_list, STATUS_SINGLE_VALUE as i64);
        let inline = cg.ptr_add_const(entry, self.inline_value_offset());
        let mut arms = If::new(cg, single);
        let one = cg.const_i64(1);
        arms.else_block(cg);
        let list_size = cg.load_field(kv_list, KeyValueListProxy::size());
        let list_size = cg.zext(list_size, I64);
        let list_data = cg.ptr_add_const(kv_list, i64::from(KeyValueListProxy::SIZE));
        arms.end_if(cg);
        let first = arms.build_phi(cg, inline, list_data);
        let count = arms.build_phi(cg, one, list_size);

        let always = cg.const_bool(true);
        let zero = cg.const_i64(0);
        let mut values = Loop::new(cg, always, &[first, zero]);
        let value_ptr = values.loop_var(0);
        let i = values.loop_var(1);
        body(cg, value_ptr)?;
        let next_ptr = cg.ptr_add_const(value_ptr, i64::from(self.value_size));
        let next_i = cg.add_const(i, 1);
        let more = cg.icmp_ult(next_i, count);
        values.loop_end(cg, more, &[next_ptr, next_i]);
        Ok(())
    }

    /// The linear-probing skeleton shared by every keyed operation.
    fn translate_probing(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: ir::Value,
        keys: &[Value],
        mut mode: Probing<'_>,
    ) -> CodegenResult<Option<ProbeResult>> {
        let done = cg.create_block();
        let result = if matches!(mode, Probing::ProbeOrInsertResult) {
            Some(ProbeResult {
                key_exists: cg.phi(done, I8),
                data_ptr: cg.phi(done, PTR),
            })
        } else {
            None
        };

        let buckets = cg.load_field(ht, OaHashTableProxy::buckets());
        let mask = cg.load_field(ht, OaHashTableProxy::bucket_mask());
        let start = cg.and(hash, mask);
        let always = cg.const_bool(true);
        let mut probe_loop = Loop::new(cg, always, &[start]);
        let index = probe_loop.loop_var(0);
        let entry = self.entry_addr(cg, buckets, index);
        let kv_list = cg.load_field(entry, OaHashEntryProxy::kv_list());

        // Free bucket: the key is absent.
        let free = cg.icmp_eq_const(kv_list, STATUS_FREE as i64);
        let mut free_bucket = If::new(cg, free);
        if !matches!(mode, Probing::FindAll { .. }) {
            let value_ptr = self.store_key(cg, ht, entry, hash, keys)?;
            match &mut mode {
                Probing::ProbeOrInsert { insert, .. } | Probing::Insert { insert } => {
                    insert.store_value(cg, value_ptr)?;
                }
                Probing::ProbeOrInsertResult | Probing::FindAll { .. } => {}
            }
            if let Some(result) = result {
                let inserted = cg.const_bool(false);
                let from = cg.current_block();
                cg.add_incoming(result.key_exists, inserted, from);
                cg.add_incoming(result.data_ptr, value_ptr, from);
            }
        }
        free_bucket.end_if_to(cg, done);

        // Occupied bucket: compare the hash, then the keys.
        let entry_hash = cg.load_field(entry, OaHashEntryProxy::hash());
        let same_hash = cg.icmp_eq(entry_hash, hash);
        let mut hash_match = If::new(cg, same_hash);
        let key_ptr = cg.ptr_add_const(entry, Self::key_offset());
        let (stored, _) = self.key_storage.load_values(cg, key_ptr);
        let equal = Value::test_equality(cg, keys, &stored)?;
        let mut key_match = If::new(cg, equal.value());
        match &mut mode {
            Probing::ProbeOrInsert { probe, .. } => {
                let value_ptr = self.first_value(cg, entry, kv_list);
                probe.process_entry(cg, value_ptr)?;
            }
            Probing::ProbeOrInsertResult => {
                let value_ptr = self.first_value(cg, entry, kv_list);
                if let Some(result) = result {
                    let existed = cg.const_bool(true);
                    let from = cg.current_block();
                    cg.add_incoming(result.key_exists, existed, from);
                    cg.add_incoming(result.data_ptr, value_ptr, from);
                }
            }
            Probing::Insert { insert } => {
                // Appends to the key's value list.
                let slot = cg.call_runtime_value("quarry_oa_hash_table_store_tuple", &[ht, entry, hash])?;
                insert.store_value(cg, slot)?;
            }
            Probing::FindAll { callback } => {
                self.for_each_value(cg, entry, kv_list, |cg, value_ptr| {
                    callback.process_entry(cg, &stored, value_ptr)
                })?;
            }
        }
        key_match.end_if_to(cg, done);
        hash_match.end_if(cg);

        let next = cg.add_const(index, 1);
        let next = cg.and(next, mask);
        probe_loop.loop_end(cg, always, &[next]);

        // The probe only leaves through `done`; the loop exit is unreachable.
        if let Some(result) = result {
            let from = cg.current_block();
            let unreachable_flag = cg.const_bool(false);
            let unreachable_ptr = cg.null_ptr();
            cg.add_incoming(result.key_exists, unreachable_flag, from);
            cg.add_incoming(result.data_ptr, unreachable_ptr, from);
        }
        cg.br(done);
        cg.switch_to_block(done);
        Ok(result)
    }

    /// Run `probe` on the first value of `keys`, or insert the key and run
    /// `insert` on the new value space.
    pub fn probe_or_insert<P, I>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: Option<ir::Value>,
        keys: &[Value],
        probe: &mut P,
        insert: &mut I,
    ) -> CodegenResult<()>
    where
        P: ProbeCallback,
        I: InsertCallback,
    {
        let hash = Self::hash_or_compute(cg, hash, keys)?;
        self.translate_probing(cg, ht, hash, keys, Probing::ProbeOrInsert { probe, insert })?;
        Ok(())
    }

    /// Find or insert `keys` and report which happened.
    ///
    /// On insertion the key is written and `data_ptr` is the uninitialized
    /// value space.
    pub fn probe_or_insert_result(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: Option<ir::Value>,
        keys: &[Value],
    ) -> CodegenResult<ProbeResult> {
        let hash = Self::hash_or_compute(cg, hash, keys)?;
        let result = self.translate_probing(cg, ht, hash, keys, Probing::ProbeOrInsertResult)?;
        match result {
            Some(result) => Ok(result),
            None => unreachable!("result probing always yields a result"),
        }
    }

    /// Add a value under `keys`; an existing key keeps all its values.
    pub fn insert<I>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: Option<ir::Value>,
        keys: &[Value],
        insert: &mut I,
    ) -> CodegenResult<()>
    where
        I: InsertCallback,
    {
        let hash = Self::hash_or_compute(cg, hash, keys)?;
        self.translate_probing(cg, ht, hash, keys, Probing::Insert { insert })?;
        Ok(())
    }

    /// Run `callback` on every value stored under `keys`.
    pub fn find_all<C>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: Option<ir::Value>,
        keys: &[Value],
        callback: &mut C,
    ) -> CodegenResult<()>
    where
        C: IterateCallback,
    {
        let hash = Self::hash_or_compute(cg, hash, keys)?;
        self.translate_probing(cg, ht, hash, keys, Probing::FindAll { callback })?;
        Ok(())
    }

    /// Run `callback` on every value of every occupied bucket.
    pub fn iterate<C>(&self, cg: &mut CodeGen<'_>, ht: ir::Value, callback: &mut C) -> CodegenResult<()>
    where
        C: IterateCallback,
    {
        let buckets = cg.load_field(ht, OaHashTableProxy::buckets());
        let num_buckets = cg.load_field(ht, OaHashTableProxy::num_buckets());
        let zero = cg.const_i64(0);
        let has_buckets = cg.icmp_ult(zero, num_buckets);

        let mut bucket_loop = Loop::new(cg, has_buckets, &[zero]);
        let index = bucket_loop.loop_var(0);
        let entry = self.entry_addr(cg, buckets, index);
        let kv_list = cg.load_field(entry, OaHashEntryProxy::kv_list());
        let occupied = cg.icmp_ne_const(kv_list, STATUS_FREE as i64);
        let mut if_occupied = If::new(cg, occupied);
        let key_ptr = cg.ptr_add_const(entry, Self::key_offset());
        let (keys, _) = self.key_storage.load_values(cg, key_ptr);
        self.for_each_value(cg, entry, kv_list, |cg, value_ptr| {
            callback.process_entry(cg, &keys, value_ptr)
        })?;
        if_occupied.end_if(cg);

        let next = cg.add_const(index, 1);
        let more = cg.icmp_ult(next, num_buckets);
        bucket_loop.loop_end(cg, more, &[next]);
        Ok(())
    }

    /// Visit the buckets in batches of `batch_size`.
    ///
    /// Each batch first fills a selection vector with the positions of its
    /// occupied buckets, then hands the batch to `callback`.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` is not a power of two.
    pub fn vectorized_iterate<C>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        batch_size: u32,
        callback: &mut C,
    ) -> CodegenResult<()>
    where
        C: VectorizedIterateCallback,
    {
        assert!(
            batch_size.is_power_of_two(),
            "selection vector capacity must be a power of two, got {batch_size}"
        );
        let buckets = cg.load_field(ht, OaHashTableProxy::buckets());
        let num_buckets = cg.load_field(ht, OaHashTableProxy::num_buckets());
        let mut selection = Vector::new(cg, batch_size);

        let mut batches = VectorizedLoop::new(cg, num_buckets, batch_size, &[]);
        let range = batches.current_range();

        let zero = cg.const_i32(0);
        let nonempty = cg.icmp_ult(range.start, range.end);
        let mut filter = Loop::new(cg, nonempty, &[range.start, zero]);
        let index = filter.loop_var(0);
        let count = filter.loop_var(1);
        let entry = self.entry_addr(cg, buckets, index);
        let kv_list = cg.load_field(entry, OaHashEntryProxy::kv_list());
        let occupied = cg.icmp_ne_const(kv_list, STATUS_FREE as i64);
        selection.set_value(cg, count, index);
        let step = cg.zext(occupied, I32);
        let next_count = cg.add(count, step);
        let next_index = cg.add_const(index, 1);
        let more = cg.icmp_ult(next_index, range.end);
        filter.loop_end(cg, more, &[next_index, next_count]);
        let finals = filter.collect_final_loop_variables(cg);
        selection.set_num_elements(finals[1]);

        let access = OaHashTableAccess { table: self, buckets };
        callback.process_entries(cg, range.start, range.end, &selection, &access)?;
        batches.loop_end(cg, &[]);
        Ok(())
    }

    /// Prefetch the home bucket of `hash`.
    pub fn prefetch_bucket(&self, cg: &mut CodeGen<'_>, ht: ir::Value, hash: ir::Value) -> CodegenResult<()> {
        let buckets = cg.load_field(ht, OaHashTableProxy::buckets());
        let mask = cg.load_field(ht, OaHashTableProxy::bucket_mask());
        let index = cg.and(hash, mask);
        let entry = self.entry_addr(cg, buckets, index);
        cg.prefetch(entry)
    }

    /// Run `body` on rows `[0, num_rows)` in groups of the configured
    /// prefetch distance.
    ///
    /// For each group, every row's keys are hashed and its home bucket is
    /// prefetched before `body` runs on any of them. `body` receives the row
    /// and its hash, so the probe it emits can skip rehashing.
    pub fn group_prefetch<K, B>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        num_rows: ir::Value,
        mut keys_of: K,
        mut body: B,
    ) -> CodegenResult<()>
    where
        K: FnMut(&mut CodeGen<'_>, ir::Value) -> CodegenResult<Vec<Value>>,
        B: FnMut(&mut CodeGen<'_>, ir::Value, ir::Value) -> CodegenResult<()>,
    {
        let distance = cg.config().prefetch_distance.max(1);
        let hashes = cg.stack_buffer(distance * 8, 8);
        let mut groups = VectorizedLoop::new(cg, num_rows, distance, &[]);
        let Range { start, end } = groups.current_range();
        // A group is never empty.
        let always = cg.const_bool(true);

        let mut hashing = Loop::new(cg, always, &[start]);
        let row = hashing.loop_var(0);
        let keys = keys_of(cg, row)?;
        let hash = Self::hash_or_compute(cg, None, &keys)?;
        let slot = Self::group_slot(cg, hashes, start, row);
        cg.store(hash, slot, 0);
        self.prefetch_bucket(cg, ht, hash)?;
        let next = cg.add_const(row, 1);
        let more = cg.icmp_ult(next, end);
        hashing.loop_end(cg, more, &[next]);

        let mut probing = Loop::new(cg, always, &[start]);
        let row = probing.loop_var(0);
        let slot = Self::group_slot(cg, hashes, start, row);
        let hash = cg.load(I64, slot, 0);
        body(cg, row, hash)?;
        let next = cg.add_const(row, 1);
        let more = cg.icmp_ult(next, end);
        probing.loop_end(cg, more, &[next]);

        groups.loop_end(cg, &[]);
        Ok(())
    }

    /// Address of `row`'s hash in a group buffer starting at row `start`.
    fn group_slot(cg: &mut CodeGen<'_>, hashes: ir::Value, start: ir::Value, row: ir::Value) -> ir::Value {
        let index = cg.sub(row, start);
        let index = cg.resize_unsigned(index, I64);
        let offset = cg.mul_const(index, 8);
        cg.ptr_add(hashes, offset)
    }

    pub fn destroy(&self, cg: &mut CodeGen<'_>, ht: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_oa_hash_table_destroy", &[ht])?;
        Ok(())
    }
}

/// Bucket access for vectorized iteration callbacks.
pub struct OaHashTableAccess<'t> {
    table: &'t OaHashTable,
    buckets: ir::Value,
}

impl OaHashTableAccess<'_> {
    /// Keys of the occupied bucket at `index`.
    pub fn extract_bucket_keys(&self, cg: &mut CodeGen<'_>, index: ir::Value) -> Vec<Value> {
        let entry = self.table.entry_addr(cg, self.buckets, index);
        let key_ptr = cg.ptr_add_const(entry, OaHashTable::key_offset());
        self.table.key_storage.load_values(cg, key_ptr).0
    }

    /// First value of the occupied bucket at `index`.
    pub fn bucket_value(&self, cg: &mut CodeGen<'_>, index: ir::Value) -> ir::Value {
        let entry = self.table.entry_addr(cg, self.buckets, index);
        let kv_list = cg.load_field(entry, OaHashEntryProxy::kv_list());
        self.table.first_value(cg, entry, kv_list)
    }
}
