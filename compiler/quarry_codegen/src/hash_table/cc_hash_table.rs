//! Chained hash table codegen.
//!
//! The runtime owns the directory and entry memory; the code here hashes
//! keys, walks chains and writes keys and values into entries the runtime
//! hands out.

use cranelift_codegen::ir;

use super::callbacks::{InsertCallback, IterateCallback, ProbeCallback};
use crate::codegen::{CodeGen, PTR};
use crate::compact_storage::CompactStorage;
use crate::error::{CodegenError, CodegenResult};
use crate::hash::hash_values;
use crate::lang::{If, Loop};
use crate::proxy::{CcHashEntryProxy, CcHashTableProxy};
use crate::types::{Type, Value};

/// Codegen for one chained hash table with a fixed key schema and value size.
///
/// A table built with `default()` has no key schema; every operation that
/// touches keys fails with [`CodegenError::Unsupported`].
#[derive(Clone, Debug, Default)]
pub struct CcHashTable {
    key_storage: Option<CompactStorage>,
    value_size: u32,
}

impl CcHashTable {
    pub fn new(key_types: &[Type], value_size: u32) -> Self {
        let key_storage = CompactStorage::setup(key_types);
        tracing::debug!(
            key_size = key_storage.max_storage_size(),
            value_size,
            "chained hash table layout"
        );
        CcHashTable {
            key_storage: Some(key_storage),
            value_size,
        }
    }

    fn keys(&self) -> CodegenResult<&CompactStorage> {
        self.key_storage
            .as_ref()
            .ok_or_else(|| CodegenError::Unsupported("chained hash table without a key schema".to_owned()))
    }

    /// Key plus value bytes of one entry.
    fn data_size(&self) -> CodegenResult<u32> {
        Ok(self.keys()?.max_storage_size() + self.value_size)
    }

    fn hash_or_compute(&self, cg: &mut CodeGen<'_>, hash: Option<ir::Value>, keys: &[Value]) -> CodegenResult<ir::Value> {
        match hash {
            Some(hash) => Ok(hash),
            None => {
                let method = cg.config().default_hash_method;
                hash_values(cg, keys, method)
            }
        }
    }

    /// Head of the chain for `hash`.
    fn chain_head(cg: &mut CodeGen<'_>, ht: ir::Value, hash: ir::Value) -> ir::Value {
        let directory = cg.load_field(ht, CcHashTableProxy::directory());
        let mask = cg.load_field(ht, CcHashTableProxy::directory_mask());
        let bucket = cg.and(hash, mask);
        let offset = cg.mul_const(bucket, 8);
        let slot = cg.ptr_add(directory, offset);
        cg.load(PTR, slot, 0)
    }

    pub fn init(&self, cg: &mut CodeGen<'_>, ht: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_cc_hash_table_init", &[ht])?;
        Ok(())
    }

    /// Walk every entry of the chain starting at `head`.
    ///
    /// `body` runs with the builder inside the loop and receives the entry.
    fn walk_chain<F>(cg: &mut CodeGen<'_>, head: ir::Value, mut body: F) -> CodegenResult<()>
    where
        F: FnMut(&mut CodeGen<'_>, ir::Value) -> CodegenResult<()>,
    {
        let has_entry = cg.icmp_ne_const(head, 0);
        let mut chain = Loop::new(cg, has_entry, &[head]);
        let entry = chain.loop_var(0);
        body(cg, entry)?;
        let next = cg.load_field(entry, CcHashEntryProxy::next());
        let more = cg.icmp_ne_const(next, 0);
        chain.loop_end(cg, more, &[next]);
        Ok(())
    }

    /// Emit `body` for every entry whose hash and key equal `hash` and `keys`.
    ///
    /// `body` gets the stored keys and the value pointer of the entry.
    fn for_each_match<F>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: ir::Value,
        keys: &[Value],
        mut body: F,
    ) -> CodegenResult<()>
    where
        F: FnMut(&mut CodeGen<'_>, &[Value], ir::Value) -> CodegenResult<()>,
    {
        let storage = self.keys()?;
        let head = Self::chain_head(cg, ht, hash);
        Self::walk_chain(cg, head, |cg, entry| {
            let entry_hash = cg.load_field(entry, CcHashEntryProxy::hash());
            let same_hash = cg.icmp_eq(entry_hash, hash);
            let mut hash_match = If::new(cg, same_hash);
            let key_ptr = cg.ptr_add_const(entry, i64::from(CcHashEntryProxy::SIZE));
            let (stored, value_ptr) = storage.load_values(cg, key_ptr);
            let equal = Value::test_equality(cg, keys, &stored)?;
            let mut key_match = If::new(cg, equal.value());
            body(cg, &stored, value_ptr)?;
            key_match.end_if(cg);
            hash_match.end_if(cg);
            Ok(())
        })
    }

    /// Find `keys` and run `probe` on its value, or insert the key and run
    /// `insert` on the new value space. At most one entry exists per key.
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
        P: ProbeCallback + ?Sized,
        I: InsertCallback + ?Sized,
    {
        let storage = self.keys()?;
        let hash = self.hash_or_compute(cg, hash, keys)?;
        let done = cg.create_block();

        let head = Self::chain_head(cg, ht, hash);
        Self::walk_chain(cg, head, |cg, entry| {
            let entry_hash = cg.load_field(entry, CcHashEntryProxy::hash());
            let same_hash = cg.icmp_eq(entry_hash, hash);
            let mut hash_match = If::new(cg, same_hash);
            let key_ptr = cg.ptr_add_const(entry, i64::from(CcHashEntryProxy::SIZE));
            let (stored, value_ptr) = storage.load_values(cg, key_ptr);
            let equal = Value::test_equality(cg, keys, &stored)?;
            let mut key_match = If::new(cg, equal.value());
            probe.process_entry(cg, value_ptr)?;
            key_match.end_if_to(cg, done);
            hash_match.end_if(cg);
            Ok(())
        })?;

        // Chain exhausted: the key is new.
        self.store_new(cg, ht, hash, keys, "quarry_cc_hash_table_store_tuple", insert)?;
        cg.br(done);
        cg.switch_to_block(done);
        Ok(())
    }

    fn store_new<I>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: ir::Value,
        keys: &[Value],
        runtime_fn: &str,
        insert: &mut I,
    ) -> CodegenResult<()>
    where
        I: InsertCallback + ?Sized,
    {
        let size = cg.const_i64(i64::from(self.data_size()?));
        let space = cg.call_runtime_value(runtime_fn, &[ht, hash, size])?;
        let value_space = self.keys()?.store_values(cg, space, keys);
        insert.store_value(cg, value_space)
    }

    /// Append an entry without looking for an existing key.
    pub fn insert<I>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: Option<ir::Value>,
        keys: &[Value],
        insert: &mut I,
    ) -> CodegenResult<()>
    where
        I: InsertCallback + ?Sized,
    {
        let hash = self.hash_or_compute(cg, hash, keys)?;
        self.store_new(cg, ht, hash, keys, "quarry_cc_hash_table_store_tuple", insert)
    }

    /// Append an entry to the unlinked lazy list of a thread-private table.
    pub fn insert_lazy<I>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: Option<ir::Value>,
        keys: &[Value],
        insert: &mut I,
    ) -> CodegenResult<()>
    where
        I: InsertCallback + ?Sized,
    {
        let hash = self.hash_or_compute(cg, hash, keys)?;
        self.store_new(cg, ht, hash, keys, "quarry_cc_hash_table_insert_lazy", insert)
    }

    /// Link the table's own lazy entries into its directory.
    pub fn build_lazy(&self, cg: &mut CodeGen<'_>, ht: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_cc_hash_table_build_lazy", &[ht])?;
        Ok(())
    }

    /// Size `ht` for the lazy entries of the per-thread tables at `offset`.
    pub fn reserve_lazy(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        thread_states: ir::Value,
        offset: u32,
    ) -> CodegenResult<()> {
        let offset = cg.const_i32(offset as i32);
        cg.call_runtime("quarry_cc_hash_table_reserve_lazy", &[ht, thread_states, offset])?;
        Ok(())
    }

    /// Fold the lazy entries of `other` into `ht`.
    pub fn merge_lazy_unfinished(&self, cg: &mut CodeGen<'_>, ht: ir::Value, other: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_cc_hash_table_merge_lazy_unfinished", &[ht, other])?;
        Ok(())
    }

    /// Run `callback` on every value stored under `keys`, in insertion order.
    pub fn find_all<C>(
        &self,
        cg: &mut CodeGen<'_>,
        ht: ir::Value,
        hash: Option<ir::Value>,
        keys: &[Value],
        callback: &mut C,
    ) -> CodegenResult<()>
    where
        C: IterateCallback + ?Sized,
    {
        let hash = self.hash_or_compute(cg, hash, keys)?;
        self.for_each_match(cg, ht, hash, keys, |cg, stored, value_ptr| {
            callback.process_entry(cg, stored, value_ptr)
        })
    }

    /// Run `callback` on every entry of the table.
    pub fn iterate<C>(&self, cg: &mut CodeGen<'_>, ht: ir::Value, callback: &mut C) -> CodegenResult<()>
    where
        C: IterateCallback + ?Sized,
    {
        let storage = self.keys()?;
        let directory = cg.load_field(ht, CcHashTableProxy::directory());
        let size = cg.load_field(ht, CcHashTableProxy::directory_size());
        let zero = cg.const_i64(0);
        let has_buckets = cg.icmp_ult(zero, size);

        let mut buckets = Loop::new(cg, has_buckets, &[zero]);
        let bucket = buckets.loop_var(0);
        let offset = cg.mul_const(bucket, 8);
        let slot = cg.ptr_add(directory, offset);
        let head = cg.load(PTR, slot, 0);
        Self::walk_chain(cg, head, |cg, entry| {
            let key_ptr = cg.ptr_add_const(entry, i64::from(CcHashEntryProxy::SIZE));
            let (stored, value_ptr) = storage.load_values(cg, key_ptr);
            callback.process_entry(cg, &stored, value_ptr)
        })?;
        let next = cg.add_const(bucket, 1);
        let more = cg.icmp_ult(next, size);
        buckets.loop_end(cg, more, &[next]);
        Ok(())
    }

    /// Chains have no fixed stride to batch over.
    pub fn vectorized_iterate(&self, _cg: &mut CodeGen<'_>, _ht: ir::Value, _batch_size: u32) -> CodegenResult<()> {
        Err(CodegenError::NotImplemented(
            "vectorized iteration over a chained hash table".to_owned(),
        ))
    }

    pub fn destroy(&self, cg: &mut CodeGen<'_>, ht: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_cc_hash_table_destroy", &[ht])?;
        Ok(())
    }
}
