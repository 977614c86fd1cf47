//! Growable append-only byte buffer.
//!
//! Generated code appends fixed-size tuples and walks them back in insertion
//! order between `buffer_start` and `buffer_pos`.

use crate::memory;

/// Capacity of a buffer initialized with no size hint.
pub const DEFAULT_CAPACITY: usize = 4 * 1024;

#[repr(C)]
pub struct Buffer {
    pub buffer_start: *mut u8,
    pub buffer_pos: *mut u8,
    pub buffer_end: *mut u8,
}

impl Buffer {
    fn capacity(&self) -> usize {
        self.buffer_end as usize - self.buffer_start as usize
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer_pos as usize - self.buffer_start as usize
    }

    pub fn is_empty(&self) -> bool {
        self.buffer_pos == self.buffer_start
    }

    fn grow(&mut self, needed: usize) {
        let used = self.len();
        let old_capacity = self.capacity();
        let mut new_capacity = old_capacity.max(1) << 1;
        while new_capacity - used < needed {
            new_capacity <<= 1;
        }
        tracing::trace!(old_capacity, new_capacity, "growing buffer");
        self.buffer_start = memory::realloc(self.buffer_start, old_capacity, new_capacity, memory::MIN_ALIGN);
        // SAFETY: both offsets are within the new allocation
        unsafe {
            self.buffer_pos = self.buffer_start.add(used);
            self.buffer_end = self.buffer_start.add(new_capacity);
        }
    }

    /// Reserve `size` bytes at the end and return their address.
    pub fn append(&mut self, size: usize) -> *mut u8 {
        if self.capacity() - self.len() < size {
            self.grow(size);
        }
        let slot = self.buffer_pos;
        // SAFETY: grow() guaranteed `size` free bytes after pos
        self.buffer_pos = unsafe { slot.add(size) };
        slot
    }
}

#[no_mangle]
pub extern "C" fn quarry_buffer_init(buf: *mut Buffer, initial_capacity: u64) {
    // SAFETY: buf points to writable storage for a Buffer
    let buf = unsafe { &mut *buf };
    let capacity = if initial_capacity == 0 {
        DEFAULT_CAPACITY
    } else {
        initial_capacity as usize
    };
    buf.buffer_start = memory::alloc(capacity, memory::MIN_ALIGN);
    buf.buffer_pos = buf.buffer_start;
    // SAFETY: capacity bytes were just allocated
    buf.buffer_end = unsafe { buf.buffer_start.add(capacity) };
}

#[no_mangle]
pub extern "C" fn quarry_buffer_append(buf: *mut Buffer, size: u64) -> *mut u8 {
    // SAFETY: buf was initialized by quarry_buffer_init
    unsafe { &mut *buf }.append(size as usize)
}

#[no_mangle]
pub extern "C" fn quarry_buffer_reset(buf: *mut Buffer) {
    // SAFETY: buf was initialized by quarry_buffer_init
    let buf = unsafe { &mut *buf };
    buf.buffer_pos = buf.buffer_start;
}

#[no_mangle]
pub extern "C" fn quarry_buffer_destroy(buf: *mut Buffer) {
    // SAFETY: buf was initialized by quarry_buffer_init
    let buf = unsafe { &mut *buf };
    tracing::debug!(bytes = buf.len(), "destroying buffer");
    memory::free(buf.buffer_start, buf.capacity(), memory::MIN_ALIGN);
    buf.buffer_start = std::ptr::null_mut();
    buf.buffer_pos = std::ptr::null_mut();
    buf.buffer_end = std::ptr::null_mut();
}
