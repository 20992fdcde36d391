//! Fixed-capacity memory arena backing the engine
//!
//! The arena is a compile-time sized byte buffer meant to live in a
//! `static`. A context binds it for its whole lifetime and every engine
//! allocation is carved out of it by [`ArenaAllocator`]. Nothing here ever
//! grows: when the free list cannot satisfy a request the allocator returns
//! null and the engine raises its out-of-memory exception.

use std::alloc::Layout;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use linked_list_allocator::Heap;
use rquickjs::allocator::Allocator;

use crate::HostError;

/// Bytes reserved in front of every block to remember its requested size
const HEADER_SIZE: usize = 16;

/// Alignment of every block handed to the engine
const BLOCK_ALIGN: usize = 16;

/// Static byte buffer of capacity `N`
///
/// ```ignore
/// static ARENA: MemoryArena<{ 1 << 20 }> = MemoryArena::new();
/// let ctx = ScriptContext::create(&ARENA, HostCapabilities::console(), HostConfig::default())?;
/// ```
pub struct MemoryArena<const N: usize> {
    bytes: UnsafeCell<[u8; N]>,
    bound: AtomicBool,
}

// SAFETY: the buffer is only reachable through an `ArenaBinding`, and the
// `bound` flag guarantees at most one binding exists at a time.
unsafe impl<const N: usize> Sync for MemoryArena<N> {}

impl<const N: usize> MemoryArena<N> {
    pub const fn new() -> Self {
        Self {
            bytes: UnsafeCell::new([0; N]),
            bound: AtomicBool::new(false),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Whether a live context currently owns this arena
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Claim the arena for one context
    pub fn bind(&self) -> Result<ArenaBinding<'_>, HostError> {
        self.bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HostError::ArenaBusy)?;

        Ok(ArenaBinding {
            base: self.bytes.get().cast::<u8>(),
            len: N,
            flag: &self.bound,
            _arena: PhantomData,
        })
    }
}

impl<const N: usize> Default for MemoryArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive lease on an arena, released on drop
pub struct ArenaBinding<'a> {
    base: *mut u8,
    len: usize,
    flag: &'a AtomicBool,
    _arena: PhantomData<&'a mut [u8]>,
}

impl ArenaBinding<'_> {
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Build a fresh allocator over the whole arena
    ///
    /// # Safety
    ///
    /// The returned allocator, and every pointer it hands out, must be dropped
    /// before this binding is.
    pub(crate) unsafe fn allocator(&self, stats: Arc<ArenaStats>) -> ArenaAllocator {
        let mut heap = Heap::empty();
        // SAFETY: the binding grants exclusive access to `len` bytes at `base`
        unsafe { heap.init(self.base, self.len) };
        stats.reset();
        ArenaAllocator { heap, stats }
    }
}

impl Drop for ArenaBinding<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Live allocation counters shared between the allocator and its context
#[derive(Debug, Default)]
pub struct ArenaStats {
    in_use: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
    failed: AtomicUsize,
}

impl ArenaStats {
    fn reset(&self) {
        self.in_use.store(0, Ordering::Relaxed);
        self.peak.store(0, Ordering::Relaxed);
        self.allocations.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }

    fn record_alloc(&self, size: usize) {
        let now = self.in_use.fetch_add(size, Ordering::Relaxed) + size;
        self.peak.fetch_max(now, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_free(&self, size: usize) {
        self.in_use.fetch_sub(size, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed_allocations(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, capacity: usize) -> ArenaUsage {
        ArenaUsage {
            capacity,
            in_use: self.in_use.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            failed_allocations: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of arena consumption, in payload bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaUsage {
    pub capacity: usize,
    pub in_use: usize,
    pub peak: usize,
    pub allocations: usize,
    pub failed_allocations: usize,
}

/// First-fit allocator over a bound arena, in the shape the engine expects
pub struct ArenaAllocator {
    heap: Heap,
    stats: Arc<ArenaStats>,
}

impl ArenaAllocator {
    fn block_layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size.checked_add(HEADER_SIZE)?, BLOCK_ALIGN).ok()
    }

    /// Size recorded in the header of a payload pointer
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator and not have been freed.
    unsafe fn stored_size(ptr: *mut u8) -> usize {
        unsafe { ptr.sub(HEADER_SIZE).cast::<usize>().read() }
    }
}

// SAFETY: every non-null pointer returned is 16-byte aligned, points at
// least `size` usable bytes inside the arena, and `usable_size` reads back
// the size written at allocation time.
unsafe impl Allocator for ArenaAllocator {
    fn alloc(&mut self, size: usize) -> *mut u8 {
        let Some(layout) = Self::block_layout(size) else {
            self.stats.record_failure();
            return ptr::null_mut();
        };

        match self.heap.allocate_first_fit(layout) {
            Ok(block) => {
                let block = block.as_ptr();
                // SAFETY: the block spans HEADER_SIZE + size bytes
                unsafe {
                    block.cast::<usize>().write(size);
                    self.stats.record_alloc(size);
                    block.add(HEADER_SIZE)
                }
            }
            Err(()) => {
                tracing::trace!(size, free = self.heap.free(), "Arena allocation failed");
                self.stats.record_failure();
                ptr::null_mut()
            }
        }
    }

    fn calloc(&mut self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            self.stats.record_failure();
            return ptr::null_mut();
        };
        let ptr = self.alloc(total);
        if !ptr.is_null() {
            // SAFETY: alloc returned at least `total` writable bytes
            unsafe { ptr::write_bytes(ptr, 0, total) };
        }
        ptr
    }

    unsafe fn dealloc(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        // SAFETY: caller passes a live pointer from `alloc`
        let size = unsafe { Self::stored_size(ptr) };
        let Some(layout) = Self::block_layout(size) else {
            return;
        };
        // SAFETY: header precedes the payload inside the same block
        let block = unsafe { NonNull::new_unchecked(ptr.sub(HEADER_SIZE)) };
        unsafe { self.heap.deallocate(block, layout) };
        self.stats.record_free(size);
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.alloc(new_size);
        }
        if new_size == 0 {
            unsafe { self.dealloc(ptr) };
            return ptr::null_mut();
        }

        let old_size = unsafe { Self::stored_size(ptr) };
        let new_ptr = self.alloc(new_size);
        // On failure the old block stays valid, as with C realloc
        if new_ptr.is_null() {
            return new_ptr;
        }
        // SAFETY: both blocks are live and distinct
        unsafe {
            ptr::copy_nonoverlapping(ptr, new_ptr, old_size.min(new_size));
            self.dealloc(ptr);
        }
        new_ptr
    }

    unsafe fn usable_size(ptr: *mut u8) -> usize
    where
        Self: Sized,
    {
        unsafe { Self::stored_size(ptr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SMALL: MemoryArena<4096> = MemoryArena::new();
    static EXCLUSIVE: MemoryArena<4096> = MemoryArena::new();
    static ALLOC: MemoryArena<8192> = MemoryArena::new();

    #[test]
    fn capacity_is_compile_time() {
        assert_eq!(SMALL.capacity(), 4096);
        assert!(!SMALL.is_bound());
    }

    #[test]
    fn binding_is_exclusive() {
        let first = EXCLUSIVE.bind().unwrap();
        assert!(EXCLUSIVE.is_bound());
        assert!(matches!(EXCLUSIVE.bind(), Err(HostError::ArenaBusy)));
        drop(first);
        assert!(!EXCLUSIVE.is_bound());
        let again = EXCLUSIVE.bind().unwrap();
        assert_eq!(again.capacity(), 4096);
    }

    #[test]
    fn allocator_stays_inside_arena() {
        let binding = ALLOC.bind().unwrap();
        let stats = Arc::new(ArenaStats::default());
        let mut alloc = unsafe { binding.allocator(stats.clone()) };

        let a = alloc.alloc(100);
        assert!(!a.is_null());
        assert_eq!(a as usize % BLOCK_ALIGN, 0);
        assert_eq!(unsafe { ArenaAllocator::usable_size(a) }, 100);

        let zeroed = alloc.calloc(4, 8);
        assert!(unsafe { std::slice::from_raw_parts(zeroed, 32) }.iter().all(|b| *b == 0));

        unsafe { a.write_bytes(0xAB, 100) };
        let grown = unsafe { alloc.realloc(a, 400) };
        assert!(!grown.is_null());
        assert_eq!(unsafe { *grown.add(99) }, 0xAB);
        assert_eq!(stats.snapshot(8192).in_use, 432);

        // Larger than the whole arena
        assert!(alloc.alloc(16 * 1024).is_null());
        assert_eq!(stats.failed_allocations(), 1);

        unsafe {
            alloc.dealloc(grown);
            alloc.dealloc(zeroed);
        }
        let usage = stats.snapshot(8192);
        assert_eq!(usage.in_use, 0);
        assert_eq!(usage.peak, 532);
        assert_eq!(usage.allocations, 3);

        drop(alloc);
        drop(binding);
    }
}
