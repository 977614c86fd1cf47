//! Per-thread private state slots.
//!
//! Parallel pipelines give every worker thread one zeroed slot of
//! `state_size` bytes. Lazy hash-table builds and parallel sorts keep a
//! private table or sorter at a fixed offset inside each slot, then one thread
//! folds them together.

use crate::memory;

/// Slots start on cache-line boundaries so workers never share a line.
const SLOT_ALIGN: usize = 64;

#[repr(C)]
pub struct ThreadStates {
    pub states: *mut u8,
    pub num_threads: u32,
    pub state_size: u32,
}

impl ThreadStates {
    /// Byte distance between two consecutive slots.
    fn slot_stride(&self) -> usize {
        (self.state_size as usize).next_multiple_of(SLOT_ALIGN)
    }

    fn allocation_size(&self) -> usize {
        self.slot_stride() * self.num_threads as usize
    }

    /// Pointer to the state slot of thread `index`.
    pub fn state(&self, index: u32) -> *mut u8 {
        debug_assert!(index < self.num_threads, "thread index out of range");
        if self.states.is_null() {
            return std::ptr::null_mut();
        }
        // SAFETY: index < num_threads keeps the offset within the allocation
        unsafe { self.states.add(self.slot_stride() * index as usize) }
    }

    /// Pointer to the object at `offset` inside every thread's slot.
    pub fn states_at(&self, offset: u32) -> impl Iterator<Item = *mut u8> + '_ {
        (0..self.num_threads).map(move |i| {
            // SAFETY: offset lies inside the slot by the caller's layout
            unsafe { self.state(i).add(offset as usize) }
        })
    }

    fn free_states(&mut self) {
        memory::free(self.states, self.allocation_size(), SLOT_ALIGN);
        self.states = std::ptr::null_mut();
    }
}

#[no_mangle]
pub extern "C" fn quarry_thread_states_init(ts: *mut ThreadStates, num_threads: u32) {
    // SAFETY: ts points to writable storage for a ThreadStates
    let ts = unsafe { &mut *ts };
    ts.states = std::ptr::null_mut();
    ts.num_threads = num_threads;
    ts.state_size = 0;
}

/// Drop the current slots and allocate fresh zeroed slots of `state_size` bytes.
#[no_mangle]
pub extern "C" fn quarry_thread_states_reset(ts: *mut ThreadStates, state_size: u32) {
    // SAFETY: ts was initialized by quarry_thread_states_init
    let ts = unsafe { &mut *ts };
    ts.free_states();
    ts.state_size = state_size;
    ts.states = memory::alloc_zeroed(ts.allocation_size(), SLOT_ALIGN);
    tracing::debug!(
        num_threads = ts.num_threads,
        state_size,
        "reset thread states"
    );
}

#[no_mangle]
pub extern "C" fn quarry_thread_states_access(ts: *const ThreadStates, index: u32) -> *mut u8 {
    // SAFETY: ts was initialized by quarry_thread_states_init
    unsafe { &*ts }.state(index)
}

#[no_mangle]
pub extern "C" fn quarry_thread_states_destroy(ts: *mut ThreadStates) {
    // SAFETY: ts was initialized by quarry_thread_states_init
    unsafe { &mut *ts }.free_states();
}
