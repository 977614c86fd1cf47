//! Tuple sorter.
//!
//! Tuples are appended into one contiguous buffer. Sorting orders an array
//! of row pointers with the generated comparison function and then rewrites
//! the buffer in that order, so generated code iterates a sorted sorter
//! exactly like an unsorted one: `tuple_size` strides from `buffer_start`.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::memory;
use crate::thread_states::ThreadStates;

/// Tuples the buffer can hold before its first growth.
pub const INITIAL_NUM_TUPLES: u64 = 1024;

/// Comparison function emitted by the code generator.
///
/// Returns a negative value, zero or a positive value when the left row
/// sorts before, with, or after the right row.
pub type ComparisonFn = extern "C" fn(*const u8, *const u8) -> i32;

#[repr(C)]
pub struct Sorter {
    pub buffer_start: *mut u8,
    pub buffer_pos: *mut u8,
    pub buffer_end: *mut u8,
    pub tuple_size: u64,
    pub comparison_fn: Option<ComparisonFn>,
    pub tuples_start: *mut *mut u8,
    pub tuples_end: *mut *mut u8,
}

/// A row pointer handed across rayon workers.
#[derive(Clone, Copy)]
struct Row(*mut u8);

// SAFETY: rows are only read while sorting, and every row outlives the sort
unsafe impl Send for Row {}
// SAFETY: see above
unsafe impl Sync for Row {}

impl Sorter {
    fn capacity_bytes(&self) -> usize {
        self.buffer_end as usize - self.buffer_start as usize
    }

    fn used_bytes(&self) -> usize {
        self.buffer_pos as usize - self.buffer_start as usize
    }

    pub fn num_tuples(&self) -> u64 {
        if self.tuple_size == 0 {
            return 0;
        }
        self.used_bytes() as u64 / self.tuple_size
    }

    fn rows(&self) -> Vec<Row> {
        let size = self.tuple_size as usize;
        (0..self.num_tuples() as usize)
            // SAFETY: every index is below num_tuples
            .map(|i| Row(unsafe { self.buffer_start.add(i * size) }))
            .collect()
    }

    fn ordering(&self) -> impl Fn(&Row, &Row) -> Ordering + Sync {
        let cmp = self.comparison_fn;
        move |a: &Row, b: &Row| match cmp {
            Some(cmp) => cmp(a.0, b.0).cmp(&0),
            None => Ordering::Equal,
        }
    }

    /// Grow the buffer to hold at least `extra` more bytes.
    fn grow(&mut self, extra: usize) {
        let used = self.used_bytes();
        let old_capacity = self.capacity_bytes();
        let mut new_capacity = old_capacity.max(self.tuple_size as usize).max(1);
        while new_capacity - used < extra {
            new_capacity <<= 1;
        }
        tracing::trace!(old_capacity, new_capacity, "growing sorter buffer");
        self.buffer_start = memory::realloc(self.buffer_start, old_capacity, new_capacity, memory::MIN_ALIGN);
        // SAFETY: both offsets are within the new allocation
        unsafe {
            self.buffer_pos = self.buffer_start.add(used);
            self.buffer_end = self.buffer_start.add(new_capacity);
        }
    }

    /// Reserve space for one tuple.
    pub fn append(&mut self) -> *mut u8 {
        let size = self.tuple_size as usize;
        if self.capacity_bytes() - self.used_bytes() < size {
            self.grow(size);
        }
        let slot = self.buffer_pos;
        // SAFETY: grow() guaranteed room for one tuple
        self.buffer_pos = unsafe { slot.add(size) };
        slot
    }

    fn free_tuples(&mut self) {
        let len = self.tuples_end as usize - self.tuples_start as usize;
        memory::free(self.tuples_start.cast(), len, memory::MIN_ALIGN);
        self.tuples_start = std::ptr::null_mut();
        self.tuples_end = std::ptr::null_mut();
    }

    fn free_buffer(&mut self) {
        memory::free(self.buffer_start, self.capacity_bytes(), memory::MIN_ALIGN);
        self.buffer_start = std::ptr::null_mut();
        self.buffer_pos = std::ptr::null_mut();
        self.buffer_end = std::ptr::null_mut();
    }

    /// Replace the buffer with `rows` copied in order, then rebuild the
    /// row-pointer array over the new buffer.
    fn rewrite(&mut self, rows: &[Row]) {
        let size = self.tuple_size as usize;
        let bytes = rows.len() * size;
        let sorted = memory::alloc(bytes.max(size).max(1), memory::MIN_ALIGN);
        for (i, row) in rows.iter().enumerate() {
            // SAFETY: destination slot i is inside `sorted`, source rows are live
            unsafe { std::ptr::copy_nonoverlapping(row.0, sorted.add(i * size), size) };
        }
        let capacity = bytes.max(size).max(1);

        self.free_buffer();
        self.buffer_start = sorted;
        // SAFETY: offsets within the allocation
        unsafe {
            self.buffer_pos = sorted.add(bytes);
            self.buffer_end = sorted.add(capacity);
        }

        self.free_tuples();
        let ptr_bytes = rows.len() * std::mem::size_of::<*mut u8>();
        self.tuples_start = memory::alloc(ptr_bytes, memory::MIN_ALIGN).cast();
        for i in 0..rows.len() {
            // SAFETY: tuples array holds rows.len() pointers
            unsafe { self.tuples_start.add(i).write(sorted.add(i * size)) };
        }
        // SAFETY: one past the end of the pointer array
        self.tuples_end = unsafe { self.tuples_start.add(rows.len()) };
    }

    pub fn sort(&mut self) {
        let mut rows = self.rows();
        rows.sort_by(self.ordering());
        self.rewrite(&rows);
    }
}

#[no_mangle]
pub extern "C" fn quarry_sorter_init(sorter: *mut Sorter, comparison_fn: Option<ComparisonFn>, tuple_size: u64) {
    // SAFETY: sorter points to writable storage for a Sorter
    let sorter = unsafe { &mut *sorter };
    sorter.tuple_size = tuple_size;
    sorter.comparison_fn = comparison_fn;
    let capacity = (INITIAL_NUM_TUPLES * tuple_size) as usize;
    sorter.buffer_start = memory::alloc(capacity, memory::MIN_ALIGN);
    sorter.buffer_pos = sorter.buffer_start;
    // SAFETY: capacity bytes were just allocated
    sorter.buffer_end = unsafe { sorter.buffer_start.add(capacity) };
    sorter.tuples_start = std::ptr::null_mut();
    sorter.tuples_end = std::ptr::null_mut();
}

#[no_mangle]
pub extern "C" fn quarry_sorter_append(sorter: *mut Sorter) -> *mut u8 {
    // SAFETY: sorter was initialized by quarry_sorter_init
    unsafe { &mut *sorter }.append()
}

#[no_mangle]
pub extern "C" fn quarry_sorter_sort(sorter: *mut Sorter) {
    // SAFETY: sorter was initialized by quarry_sorter_init
    let sorter = unsafe { &mut *sorter };
    tracing::debug!(tuples = sorter.num_tuples(), "sorting");
    sorter.sort();
}

/// Sort every per-thread sorter at `offset` in parallel, then merge them all
/// into `sorter`. The per-thread sorters are left empty.
#[no_mangle]
pub extern "C" fn quarry_sorter_sort_parallel(sorter: *mut Sorter, thread_states: *const ThreadStates, offset: u32) {
    // SAFETY: sorter was initialized, thread_states holds a Sorter at offset
    let sorter = unsafe { &mut *sorter };
    let thread_states = unsafe { &*thread_states };

    let locals: Vec<Row> = thread_states.states_at(offset).map(Row).collect();
    tracing::debug!(threads = locals.len(), "parallel sort");

    locals.par_iter().for_each(|local| {
        // SAFETY: each thread-local sorter is touched by exactly one worker
        let local = unsafe { &mut *local.0.cast::<Sorter>() };
        let mut rows = local.rows();
        rows.sort_by(local.ordering());
        local.rewrite(&rows);
    });

    // The merge reads rows out of the local buffers before they are freed.
    let mut rows = sorter.rows();
    for local in &locals {
        // SAFETY: locals were sorted above
        rows.extend(unsafe { &*local.0.cast::<Sorter>() }.rows());
    }
    rows.par_sort_by(sorter.ordering());
    sorter.rewrite(&rows);

    for local in &locals {
        // SAFETY: no row pointer into the local buffer survives the rewrite
        let local = unsafe { &mut *local.0.cast::<Sorter>() };
        local.free_tuples();
        local.free_buffer();
    }
}

#[no_mangle]
pub extern "C" fn quarry_sorter_destroy(sorter: *mut Sorter) {
    // SAFETY: sorter was initialized by quarry_sorter_init
    let sorter = unsafe { &mut *sorter };
    tracing::debug!(tuples = sorter.num_tuples(), "destroying sorter");
    sorter.free_tuples();
    sorter.free_buffer();
}

#[cfg(test)]
mod tests;
