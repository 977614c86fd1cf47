//! Chained hash table with an optional lazy (two-phase) build.
//!
//! Entries live in an append-only arena owned by the table and are linked
//! into a power-of-two bucket directory. Generated code walks the chains
//! itself; the runtime only allocates entries and maintains the directory.
//!
//! # Entry layout
//!
//! ```text
//! +-----------+------------------+------------------------+
//! | hash: u64 | next: *mut Entry | key bytes | value bytes |
//! +-----------+------------------+------------------------+
//! ```
//!
//! # Lazy build
//!
//! `quarry_cc_hash_table_insert_lazy` only pushes the entry onto a flat
//! list. The directory is filled later, either by `build_lazy` for a table
//! built by a single thread, or by `reserve_lazy` followed by one
//! `merge_lazy_unfinished` per worker table.

use std::mem::size_of;

use crate::memory;
use crate::thread_states::ThreadStates;

/// Directory size of a freshly initialized table.
pub const INITIAL_DIRECTORY_SIZE: u64 = 256;

/// Arena blocks hold at least this many bytes.
const ARENA_BLOCK_BYTES: usize = 64 * 1024;

#[repr(C)]
pub struct CcHashEntry {
    pub hash: u64,
    pub next: *mut CcHashEntry,
}

impl CcHashEntry {
    /// Start of the key bytes, directly after the header.
    pub fn data(entry: *mut CcHashEntry) -> *mut u8 {
        // SAFETY: every entry is allocated with its data area following the header
        unsafe { entry.cast::<u8>().add(size_of::<CcHashEntry>()) }
    }
}

/// Append-only storage for entries of varying size.
///
/// Blocks are boxed slices of `u64`, which keeps every entry 8-byte aligned
/// and keeps entry addresses stable as blocks are added.
#[derive(Default)]
pub struct EntryArena {
    blocks: Vec<Box<[u64]>>,
    /// Words already handed out from the last block.
    used: usize,
}

impl EntryArena {
    fn alloc(&mut self, bytes: usize) -> *mut u8 {
        let words = bytes.div_ceil(8);
        let fits = self
            .blocks
            .last()
            .is_some_and(|block| block.len() - self.used >= words);
        if !fits {
            let block_words = words.max(ARENA_BLOCK_BYTES / 8);
            self.blocks.push(vec![0u64; block_words].into_boxed_slice());
            self.used = 0;
        }
        let used = self.used;
        self.used += words;
        match self.blocks.last_mut() {
            Some(block) => block[used..].as_mut_ptr().cast(),
            None => std::ptr::null_mut(),
        }
    }

    /// Take ownership of every block of `other`, keeping this arena's
    /// active block at the end.
    fn absorb(&mut self, other: &mut EntryArena) {
        let active = self.blocks.pop();
        self.blocks.append(&mut other.blocks);
        other.used = 0;
        if let Some(active) = active {
            self.blocks.push(active);
        } else {
            // No active block: mark the absorbed tail as full.
            self.used = self.blocks.last().map_or(0, |b| b.len());
        }
    }

    fn allocated_bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.len() * 8).sum()
    }
}

#[repr(C)]
pub struct CcHashTable {
    pub directory: *mut *mut CcHashEntry,
    pub directory_size: u64,
    pub directory_mask: u64,
    pub num_elements: u64,
    pub lazy_head: *mut CcHashEntry,
    pub num_lazy: u64,
    pub arena: *mut EntryArena,
}

impl CcHashTable {
    fn arena(&mut self) -> &mut EntryArena {
        if self.arena.is_null() {
            self.arena = Box::into_raw(Box::default());
        }
        // SAFETY: arena is either freshly boxed or was boxed by a previous call
        unsafe { &mut *self.arena }
    }

    fn allocate_entry(&mut self, hash: u64, data_size: u64) -> *mut CcHashEntry {
        let bytes = size_of::<CcHashEntry>() + data_size as usize;
        let entry = self.arena().alloc(bytes).cast::<CcHashEntry>();
        // SAFETY: the arena returned at least `bytes` writable, aligned bytes
        unsafe {
            (*entry).hash = hash;
            (*entry).next = std::ptr::null_mut();
        }
        entry
    }

    fn bucket(&self, index: u64) -> *mut *mut CcHashEntry {
        // SAFETY: index is masked by the caller, so it is below directory_size
        unsafe { self.directory.add(index as usize) }
    }

    /// Link `entry` at the tail of its bucket chain, so every chain keeps
    /// insertion order.
    fn link(&mut self, entry: *mut CcHashEntry) {
        // SAFETY: entry is a live arena entry, its bucket is in range, and
        // chains only hold live arena entries
        unsafe {
            (*entry).next = std::ptr::null_mut();
            let mut slot = self.bucket((*entry).hash & self.directory_mask);
            while !(*slot).is_null() {
                slot = std::ptr::addr_of_mut!((**slot).next);
            }
            *slot = entry;
        }
    }

    fn alloc_directory(&mut self, size: u64) {
        debug_assert!(size.is_power_of_two());
        let bytes = size as usize * size_of::<*mut CcHashEntry>();
        self.directory = memory::alloc_zeroed(bytes, 8).cast();
        self.directory_size = size;
        self.directory_mask = size - 1;
    }

    fn free_directory(&mut self) {
        let bytes = self.directory_size as usize * size_of::<*mut CcHashEntry>();
        memory::free(self.directory.cast(), bytes, 8);
        self.directory = std::ptr::null_mut();
    }

    /// Rebuild the directory with `new_size` buckets and relink every chain.
    fn resize(&mut self, new_size: u64) {
        let old_directory = self.directory;
        let old_size = self.directory_size;
        tracing::debug!(from = old_size, to = new_size, "resizing chained hash table");

        self.alloc_directory(new_size);
        for i in 0..old_size {
            // SAFETY: i < old_size indexes the old directory, entries are live
            let mut entry = unsafe { *old_directory.add(i as usize) };
            while !entry.is_null() {
                // SAFETY: chains only hold live arena entries
                let next = unsafe { (*entry).next };
                self.link(entry);
                entry = next;
            }
        }
        let bytes = old_size as usize * size_of::<*mut CcHashEntry>();
        memory::free(old_directory.cast(), bytes, 8);
    }

    /// Grow until `count` elements keep the load factor under 3/4.
    fn reserve(&mut self, count: u64) {
        let mut size = self.directory_size.max(1);
        while count >= size / 4 * 3 {
            size <<= 1;
        }
        if size != self.directory_size {
            self.resize(size);
        }
    }

    /// Link every entry of a lazy list into this table's directory.
    fn link_lazy_list(&mut self, head: *mut CcHashEntry) -> u64 {
        let mut linked = 0;
        // The lazy list is pushed at its head; reverse it to link oldest first.
        let mut entry = std::ptr::null_mut();
        let mut rest = head;
        while !rest.is_null() {
            // SAFETY: the lazy list only holds live arena entries
            unsafe {
                let next = (*rest).next;
                (*rest).next = entry;
                entry = rest;
                rest = next;
            }
        }
        while !entry.is_null() {
            // SAFETY: the lazy list only holds live arena entries
            let next = unsafe { (*entry).next };
            self.link(entry);
            linked += 1;
            entry = next;
        }
        linked
    }

    /// Iterate every linked entry, bucket by bucket.
    pub fn entries(&self) -> impl Iterator<Item = *mut CcHashEntry> + '_ {
        (0..self.directory_size).flat_map(move |i| {
            // SAFETY: i < directory_size
            let head = unsafe { *self.bucket(i) };
            std::iter::successors((!head.is_null()).then_some(head), |&e| {
                // SAFETY: chains only hold live arena entries
                let next = unsafe { (*e).next };
                (!next.is_null()).then_some(next)
            })
        })
    }
}

#[no_mangle]
pub extern "C" fn quarry_cc_hash_table_init(ht: *mut CcHashTable) {
    // SAFETY: ht points to writable storage for a CcHashTable
    let ht = unsafe { &mut *ht };
    ht.alloc_directory(INITIAL_DIRECTORY_SIZE);
    ht.num_elements = 0;
    ht.lazy_head = std::ptr::null_mut();
    ht.num_lazy = 0;
    ht.arena = std::ptr::null_mut();
}

/// Allocate and link an entry with room for `data_size` bytes of key and
/// value. Returns the start of the key area.
#[no_mangle]
pub extern "C" fn quarry_cc_hash_table_store_tuple(
    ht: *mut CcHashTable,
    hash: u64,
    data_size: u64,
) -> *mut u8 {
    // SAFETY: ht was initialized by quarry_cc_hash_table_init
    let ht = unsafe { &mut *ht };
    ht.reserve(ht.num_elements + 1);
    let entry = ht.allocate_entry(hash, data_size);
    ht.link(entry);
    ht.num_elements += 1;
    CcHashEntry::data(entry)
}

/// Allocate an entry without linking it into the directory.
#[no_mangle]
pub extern "C" fn quarry_cc_hash_table_insert_lazy(
    ht: *mut CcHashTable,
    hash: u64,
    data_size: u64,
) -> *mut u8 {
    // SAFETY: ht was initialized by quarry_cc_hash_table_init
    let ht = unsafe { &mut *ht };
    let entry = ht.allocate_entry(hash, data_size);
    // SAFETY: entry was just allocated
    unsafe { (*entry).next = ht.lazy_head };
    ht.lazy_head = entry;
    ht.num_lazy += 1;
    CcHashEntry::data(entry)
}

/// Link this table's own lazy entries into its directory.
#[no_mangle]
pub extern "C" fn quarry_cc_hash_table_build_lazy(ht: *mut CcHashTable) {
    // SAFETY: ht was initialized by quarry_cc_hash_table_init
    let ht = unsafe { &mut *ht };
    ht.reserve(ht.num_elements + ht.num_lazy);
    let head = std::mem::replace(&mut ht.lazy_head, std::ptr::null_mut());
    let linked = ht.link_lazy_list(head);
    debug_assert_eq!(linked, ht.num_lazy);
    ht.num_elements += linked;
    ht.num_lazy = 0;
    tracing::debug!(elements = ht.num_elements, "built lazy hash table");
}

/// Size the directory for the lazy entries of every worker table.
///
/// Each thread's slot holds a `CcHashTable` at `offset`.
#[no_mangle]
pub extern "C" fn quarry_cc_hash_table_reserve_lazy(
    ht: *mut CcHashTable,
    thread_states: *const ThreadStates,
    offset: u32,
) {
    // SAFETY: both pointers come from initialized runtime objects
    let (ht, ts) = unsafe { (&mut *ht, &*thread_states) };
    let total: u64 = ts
        .states_at(offset)
        // SAFETY: each slot holds an initialized CcHashTable at offset
        .map(|state| unsafe { (*state.cast::<CcHashTable>()).num_lazy })
        .sum();
    tracing::debug!(total, threads = ts.num_threads, "reserving lazy hash table");
    ht.reserve(ht.num_elements + total);
}

/// Fold the unfinished (lazy) entries of `other` into `ht`.
///
/// `ht` takes ownership of `other`'s entry memory; `other` can still be
/// destroyed afterwards. Not thread safe: merges run one at a time.
#[no_mangle]
pub extern "C" fn quarry_cc_hash_table_merge_lazy_unfinished(
    ht: *mut CcHashTable,
    other: *mut CcHashTable,
) {
    // SAFETY: both tables were initialized and are distinct
    let (ht, other) = unsafe { (&mut *ht, &mut *other) };
    ht.reserve(ht.num_elements + other.num_lazy);
    let head = std::mem::replace(&mut other.lazy_head, std::ptr::null_mut());
    let linked = ht.link_lazy_list(head);
    ht.num_elements += linked;
    other.num_lazy = 0;
    if !other.arena.is_null() {
        // SAFETY: other's arena was boxed by allocate_entry
        let other_arena = unsafe { &mut *other.arena };
        ht.arena().absorb(other_arena);
    }
}

#[no_mangle]
pub extern "C" fn quarry_cc_hash_table_destroy(ht: *mut CcHashTable) {
    // SAFETY: ht was initialized by quarry_cc_hash_table_init
    let ht = unsafe { &mut *ht };
    let arena_bytes = if ht.arena.is_null() {
        0
    } else {
        // SAFETY: arena was created with Box::into_raw and is dropped once
        let arena = unsafe { Box::from_raw(ht.arena) };
        arena.allocated_bytes()
    };
    tracing::debug!(
        elements = ht.num_elements,
        arena_bytes,
        "destroying chained hash table"
    );
    ht.arena = std::ptr::null_mut();
    ht.free_directory();
    ht.directory_size = 0;
    ht.directory_mask = 0;
    ht.num_elements = 0;
    ht.lazy_head = std::ptr::null_mut();
    ht.num_lazy = 0;
}
