//! Raw allocation helpers shared by the runtime objects.
//!
//! Runtime objects store bare pointers plus the size they were allocated
//! with, so every free must pass the same size back.

use std::alloc::Layout;

/// Minimum alignment for every runtime allocation.
pub(crate) const MIN_ALIGN: usize = 8;

fn layout(size: usize, align: usize) -> Option<Layout> {
    Layout::from_size_align(size, align.max(MIN_ALIGN)).ok()
}

/// Allocate `size` bytes. Returns null for a zero size or an invalid layout.
pub(crate) fn alloc(size: usize, align: usize) -> *mut u8 {
    if size == 0 {
        return std::ptr::null_mut();
    }
    let Some(layout) = layout(size, align) else {
        return std::ptr::null_mut();
    };
    // SAFETY: Layout is valid and non-zero sized
    let ptr = unsafe { std::alloc::alloc(layout) };
    if ptr.is_null() {
        std::alloc::handle_alloc_error(layout);
    }
    ptr
}

/// Allocate `size` zeroed bytes.
pub(crate) fn alloc_zeroed(size: usize, align: usize) -> *mut u8 {
    if size == 0 {
        return std::ptr::null_mut();
    }
    let Some(layout) = layout(size, align) else {
        return std::ptr::null_mut();
    };
    // SAFETY: Layout is valid and non-zero sized
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
        std::alloc::handle_alloc_error(layout);
    }
    ptr
}

/// Free memory from [`alloc`] or [`alloc_zeroed`] with the same size and alignment.
pub(crate) fn free(ptr: *mut u8, size: usize, align: usize) {
    if ptr.is_null() || size == 0 {
        return;
    }
    let Some(layout) = layout(size, align) else {
        return;
    };
    // SAFETY: Caller guarantees ptr was allocated with matching layout
    unsafe { std::alloc::dealloc(ptr, layout) }
}

/// Grow an allocation, preserving the first `old_size` bytes.
pub(crate) fn realloc(ptr: *mut u8, old_size: usize, new_size: usize, align: usize) -> *mut u8 {
    if ptr.is_null() || old_size == 0 {
        return alloc(new_size, align);
    }
    let Some(old_layout) = layout(old_size, align) else {
        return std::ptr::null_mut();
    };
    // SAFETY: ptr was allocated with old_layout, new_size is non-zero
    let new_ptr = unsafe { std::alloc::realloc(ptr, old_layout, new_size) };
    if new_ptr.is_null() {
        std::alloc::handle_alloc_error(old_layout);
    }
    new_ptr
}
