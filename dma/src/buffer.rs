//! Cache-line-aligned, pre-registered buffer allocator (spec.md §4.2).

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::sync::atomic::{AtomicU32, Ordering};

use vnic_abi::{Error, Result};

use crate::keys::LKey;

const CACHE_LINE: usize = 64;

static NEXT_LKEY: AtomicU32 = AtomicU32::new(1);

/// A zero-initialised, cache-line-aligned buffer with an attached local
/// memory-region key. Deregisters and frees on [`Drop`] — RAII stands in
/// for the manual "freeing deregisters the region" contract spec.md §4.2
/// describes.
pub struct DmaBuffer {
    ptr: *mut u8,
    layout: Layout,
    lkey: LKey,
}

// SAFETY: `DmaBuffer` owns its allocation exclusively; no other handle
// aliases `ptr`.
unsafe impl Send for DmaBuffer {}

impl DmaBuffer {
    pub fn lkey(&self) -> LKey {
        self.lkey
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.layout.size()) }
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            unsafe { dealloc(self.ptr, self.layout) };
        }
    }
}

/// Hands out [`DmaBuffer`]s. A real implementation registers each
/// allocation as a memory region with firmware; this allocator assigns a
/// unique local key per buffer and leaves region registration to the
/// caller's `CommandChannel`, matching spec.md §1's treatment of the
/// hardware command encodings as an opaque dependency.
#[derive(Default)]
pub struct BufferAllocator;

impl BufferAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn alloc(&self, size: usize) -> Result<DmaBuffer> {
        if size == 0 {
            return Ok(DmaBuffer {
                ptr: std::ptr::NonNull::dangling().as_ptr(),
                layout: Layout::from_size_align(0, CACHE_LINE).unwrap(),
                lkey: LKey(NEXT_LKEY.fetch_add(1, Ordering::Relaxed)),
            });
        }
        let layout = Layout::from_size_align(size, CACHE_LINE)
            .map_err(|_| Error::BadArgument("buffer size overflows alignment".into()))?;
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::OutOfMemory);
        }
        Ok(DmaBuffer {
            ptr,
            layout,
            lkey: LKey(NEXT_LKEY.fetch_add(1, Ordering::Relaxed)),
        })
    }
}

#[cfg(test)]
mod buffer_tests;
