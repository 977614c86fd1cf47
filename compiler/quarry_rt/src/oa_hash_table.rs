//! Open-addressing hash table with linear probing.
//!
//! Buckets are fixed-size entries laid out back to back. Each entry stores
//! one key and one value inline. A second value under the same key moves
//! every value of that key into a growable [`KeyValueList`].
//!
//! # Entry layout
//!
//! ```text
//! +--------------+-----------+-----------+-------------+
//! | kv_list: u64 | hash: u64 | key bytes | value bytes |
//! +--------------+-----------+-----------+-------------+
//! ```
//!
//! `kv_list` encodes the entry state:
//!
//! | Value | Meaning |
//! |-------|---------|
//! | `0` | free |
//! | `1` | one value, stored inline |
//! | other | pointer to a `KeyValueList` holding all values |
//!
//! Generated code does the probing. The runtime allocates, grows the bucket
//! array and manages value lists.

use std::mem::size_of;

use crate::memory;

/// Bucket count used when the caller has no cardinality estimate.
pub const DEFAULT_INITIAL_SIZE: u64 = 8 * 1024;

/// Capacity of a value list when it is first created, unless the table was
/// initialized with another one.
pub const INITIAL_KV_LIST_CAPACITY: u32 = 8;

/// `kv_list` value of a free entry.
pub const STATUS_FREE: u64 = 0;

/// `kv_list` value of an entry holding exactly one inline value.
pub const STATUS_SINGLE_VALUE: u64 = 1;

/// Size of one bucket for the given key and value sizes, padded to 8 bytes.
pub const fn entry_size(key_size: u64, value_size: u64) -> u64 {
    (size_of::<OaHashEntry>() as u64 + key_size + value_size).next_multiple_of(8)
}

#[repr(C)]
pub struct OaHashEntry {
    pub kv_list: u64,
    pub hash: u64,
}

impl OaHashEntry {
    fn is_free(&self) -> bool {
        self.kv_list == STATUS_FREE
    }

    fn has_kv_list(&self) -> bool {
        self.kv_list > STATUS_SINGLE_VALUE
    }

    /// Start of the key bytes.
    pub fn data(entry: *mut OaHashEntry) -> *mut u8 {
        // SAFETY: entries are allocated with key and value bytes after the header
        unsafe { entry.cast::<u8>().add(size_of::<OaHashEntry>()) }
    }
}

#[repr(C)]
pub struct KeyValueList {
    pub capacity: u32,
    pub size: u32,
}

impl KeyValueList {
    /// Start of the value array.
    pub fn data(list: *mut KeyValueList) -> *mut u8 {
        // SAFETY: lists are allocated with `capacity` values after the header
        unsafe { list.cast::<u8>().add(size_of::<KeyValueList>()) }
    }

    fn allocation_size(capacity: u32, value_size: u64) -> usize {
        size_of::<KeyValueList>() + capacity as usize * value_size as usize
    }
}

#[repr(C)]
pub struct OaHashTable {
    pub buckets: *mut u8,
    pub num_buckets: u64,
    pub bucket_mask: u64,
    pub num_occupied_buckets: u64,
    pub num_entries: u64,
    pub resize_threshold: u64,
    pub entry_size: u64,
    pub key_size: u64,
    pub value_size: u64,
    pub kv_list_capacity: u64,
}

impl OaHashTable {
    fn entry(&self, index: u64) -> *mut OaHashEntry {
        // SAFETY: callers keep index below num_buckets
        unsafe {
            self.buckets
                .add((index * self.entry_size) as usize)
                .cast()
        }
    }

    fn alloc_buckets(num_buckets: u64, entry_size: u64) -> *mut u8 {
        // Zeroed memory marks every entry free.
        memory::alloc_zeroed((num_buckets * entry_size) as usize, 8)
    }

    fn needs_resize(&self) -> bool {
        self.num_occupied_buckets >= self.resize_threshold
    }

    /// First free entry at or after the home bucket of `hash`.
    pub fn find_next_free_entry(&self, hash: u64) -> *mut OaHashEntry {
        let mut index = hash & self.bucket_mask;
        loop {
            let entry = self.entry(index);
            // SAFETY: index < num_buckets
            if unsafe { (*entry).is_free() } {
                return entry;
            }
            index = (index + 1) & self.bucket_mask;
        }
    }

    /// Double the bucket array and rehash every occupied entry.
    ///
    /// Returns the new address of `tracked`, or null if it was not occupied.
    fn resize(&mut self, tracked: *mut OaHashEntry) -> *mut OaHashEntry {
        debug_assert!(self.needs_resize());
        tracing::debug!(
            from = self.num_buckets,
            to = self.num_buckets << 1,
            "resizing open-addressing hash table"
        );

        let old_buckets = self.buckets;
        let old_num_buckets = self.num_buckets;

        self.num_buckets <<= 1;
        self.bucket_mask = self.num_buckets - 1;
        self.resize_threshold <<= 1;
        self.buckets = Self::alloc_buckets(self.num_buckets, self.entry_size);

        let mut relocated = std::ptr::null_mut();
        for i in 0..old_num_buckets {
            // SAFETY: i < old_num_buckets indexes the old array
            let old = unsafe { old_buckets.add((i * self.entry_size) as usize) }.cast::<OaHashEntry>();
            // SAFETY: old points at an initialized entry
            if unsafe { (*old).is_free() } {
                continue;
            }
            let new = self.find_next_free_entry(unsafe { (*old).hash });
            // SAFETY: both entries span entry_size bytes and do not overlap
            unsafe {
                std::ptr::copy_nonoverlapping(old.cast::<u8>(), new.cast::<u8>(), self.entry_size as usize);
            }
            if old == tracked {
                relocated = new;
            }
        }

        memory::free(old_buckets, (old_num_buckets * self.entry_size) as usize, 8);
        relocated
    }

    /// Append one value slot to the list of `entry`, doubling it when full.
    fn store_to_kv_list(&self, entry: &mut OaHashEntry) -> *mut u8 {
        let mut list = entry.kv_list as *mut KeyValueList;
        // SAFETY: has_kv_list() holds, so kv_list is a live list pointer
        let (size, capacity) = unsafe { ((*list).size, (*list).capacity) };
        debug_assert!(capacity >= size);

        if size == capacity {
            let new_capacity = capacity << 1;
            list = memory::realloc(
                list.cast(),
                KeyValueList::allocation_size(capacity, self.value_size),
                KeyValueList::allocation_size(new_capacity, self.value_size),
                8,
            )
            .cast();
            // SAFETY: realloc preserved the header
            unsafe { (*list).capacity = new_capacity };
            entry.kv_list = list as u64;
        }

        // SAFETY: size < capacity after the growth above
        unsafe {
            (*list).size = size + 1;
            KeyValueList::data(list).add(size as usize * self.value_size as usize)
        }
    }

    /// Iterate every occupied entry in bucket order.
    pub fn occupied_entries(&self) -> impl Iterator<Item = *mut OaHashEntry> + '_ {
        (0..self.num_buckets)
            .map(move |i| self.entry(i))
            // SAFETY: every index is below num_buckets
            .filter(|&e| unsafe { !(*e).is_free() })
    }

    /// Every value stored under the key of `entry`.
    pub fn values(&self, entry: *mut OaHashEntry) -> Vec<*mut u8> {
        // SAFETY: entry is an occupied entry of this table
        let entry = unsafe { &mut *entry };
        if entry.has_kv_list() {
            let list = entry.kv_list as *mut KeyValueList;
            // SAFETY: the list holds `size` values
            let size = unsafe { (*list).size };
            (0..size)
                .map(|i| unsafe { KeyValueList::data(list).add(i as usize * self.value_size as usize) })
                .collect()
        } else {
            // SAFETY: the inline value follows the key
            vec![unsafe { OaHashEntry::data(entry).add(self.key_size as usize) }]
        }
    }
}

#[no_mangle]
pub extern "C" fn quarry_oa_hash_table_init(
    ht: *mut OaHashTable,
    key_size: u64,
    value_size: u64,
    estimated_num_entries: u64,
    kv_list_capacity: u64,
) {
    // SAFETY: ht points to writable storage for an OaHashTable
    let ht = unsafe { &mut *ht };
    ht.key_size = key_size;
    ht.value_size = value_size;
    ht.kv_list_capacity = kv_list_capacity.clamp(2, u64::from(u32::MAX));
    ht.entry_size = entry_size(key_size, value_size);
    ht.num_buckets = estimated_num_entries.max(2).next_power_of_two();
    ht.bucket_mask = ht.num_buckets - 1;
    debug_assert_eq!(ht.num_buckets & ht.bucket_mask, 0);
    ht.num_entries = 0;
    ht.num_occupied_buckets = 0;
    ht.resize_threshold = ht.num_buckets >> 1;
    ht.buckets = OaHashTable::alloc_buckets(ht.num_buckets, ht.entry_size);
    tracing::debug!(
        buckets = ht.num_buckets,
        entry_size = ht.entry_size,
        "initialized open-addressing hash table"
    );
}

/// Claim space in `entry` for one more value under `hash`.
///
/// - free entry: marks it single-valued and returns the key area; the caller
///   writes the key followed by the value.
/// - single-valued entry: moves the inline value into a new list and returns
///   the second value slot.
/// - list entry: returns a fresh slot at the end of the list.
#[no_mangle]
pub extern "C" fn quarry_oa_hash_table_store_tuple(
    ht: *mut OaHashTable,
    entry: *mut OaHashEntry,
    hash: u64,
) -> *mut u8 {
    // SAFETY: ht was initialized and entry belongs to it
    let ht = unsafe { &mut *ht };
    let mut entry = entry;
    let entry_is_free = unsafe { (*entry).is_free() };

    if ht.needs_resize() {
        let relocated = ht.resize(entry);
        entry = if entry_is_free {
            ht.find_next_free_entry(hash)
        } else {
            relocated
        };
    }

    ht.num_entries += 1;
    // SAFETY: entry points into the current bucket array
    let entry = unsafe { &mut *entry };

    if entry_is_free {
        entry.kv_list = STATUS_SINGLE_VALUE;
        entry.hash = hash;
        ht.num_occupied_buckets += 1;
        return OaHashEntry::data(entry);
    }

    if !entry.has_kv_list() {
        let capacity = ht.kv_list_capacity as u32;
        let list = memory::alloc(KeyValueList::allocation_size(capacity, ht.value_size), 8)
            .cast::<KeyValueList>();
        // SAFETY: list spans a header plus `capacity` values
        unsafe {
            (*list).capacity = capacity;
            (*list).size = 2;
            let inline_value = OaHashEntry::data(entry).add(ht.key_size as usize);
            std::ptr::copy_nonoverlapping(inline_value, KeyValueList::data(list), ht.value_size as usize);
        }
        entry.kv_list = list as u64;
        // SAFETY: slot 1 is within capacity
        return unsafe { KeyValueList::data(list).add(ht.value_size as usize) };
    }

    ht.store_to_kv_list(entry)
}

#[no_mangle]
pub extern "C" fn quarry_oa_hash_table_destroy(ht: *mut OaHashTable) {
    // SAFETY: ht was initialized by quarry_oa_hash_table_init
    let ht = unsafe { &mut *ht };
    tracing::debug!(entries = ht.num_entries, "destroying open-addressing hash table");

    let lists: Vec<*mut KeyValueList> = ht
        .occupied_entries()
        // SAFETY: occupied entries are initialized
        .filter(|&e| unsafe { (*e).has_kv_list() })
        .map(|e| unsafe { (*e).kv_list as *mut KeyValueList })
        .collect();
    for list in lists {
        // SAFETY: list headers are live until freed here
        let capacity = unsafe { (*list).capacity };
        memory::free(list.cast(), KeyValueList::allocation_size(capacity, ht.value_size), 8);
    }

    memory::free(ht.buckets, (ht.num_buckets * ht.entry_size) as usize, 8);
    ht.buckets = std::ptr::null_mut();
    ht.num_buckets = 0;
    ht.num_entries = 0;
    ht.num_occupied_buckets = 0;
}
