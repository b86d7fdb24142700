//! Arena allocator
//!
//! Bump-pointer allocation for short-lived in-memory records (memtable
//! entries). Memory comes from 4 KiB blocks; a request larger than a quarter
//! of a block gets a dedicated block so the remainder of the shared block is
//! not wasted. Nothing is freed individually; every block is released when
//! the arena is dropped.
//!
//! Not thread-safe. One arena backs one memtable generation, written by one
//! logical writer.

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

/// Size of a shared allocation block
pub const BLOCK_SIZE: usize = 4096;

/// Alignment of `allocate_aligned` results and of every block start
pub const ALIGN: usize = 8;

const _: () = assert!(std::mem::size_of::<usize>() <= ALIGN);
const _: () = assert!(ALIGN.is_power_of_two());

struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
}

/// Bump allocator owning every block it hands out
pub struct Arena {
    alloc_ptr: Cell<*mut u8>,
    alloc_bytes_remaining: Cell<usize>,
    blocks: RefCell<Vec<Block>>,
    memory_usage: Cell<usize>,
}

// Blocks are exclusively owned heap memory, so moving the arena to another
// thread is sound. It is deliberately not Sync.
unsafe impl Send for Arena {}

impl Arena {
    pub fn new() -> Self {
        Self {
            alloc_ptr: Cell::new(std::ptr::null_mut()),
            alloc_bytes_remaining: Cell::new(0),
            blocks: RefCell::new(Vec::new()),
            memory_usage: Cell::new(0),
        }
    }

    /// Return `bytes` bytes with no particular alignment.
    ///
    /// The returned ranges never overlap and stay valid until the arena is
    /// dropped.
    #[allow(clippy::mut_from_ref)]
    pub fn allocate(&self, bytes: usize) -> &mut [u8] {
        if bytes == 0 {
            return &mut [];
        }
        let ptr = if bytes <= self.alloc_bytes_remaining.get() {
            self.bump(bytes)
        } else {
            self.allocate_fallback(bytes)
        };
        // SAFETY: `ptr` addresses `bytes` bytes inside a live block that no
        // other allocation covers.
        unsafe { std::slice::from_raw_parts_mut(ptr, bytes) }
    }

    /// Return `bytes` bytes aligned to [`ALIGN`]
    #[allow(clippy::mut_from_ref)]
    pub fn allocate_aligned(&self, bytes: usize) -> &mut [u8] {
        if bytes == 0 {
            return &mut [];
        }
        let current_mod = (self.alloc_ptr.get() as usize) & (ALIGN - 1);
        let slop = if current_mod == 0 { 0 } else { ALIGN - current_mod };
        let needed = bytes + slop;
        let ptr = if needed <= self.alloc_bytes_remaining.get() {
            // SAFETY: `slop` is within the remaining bytes of the block
            unsafe { self.bump(needed).add(slop) }
        } else {
            // fresh blocks are always aligned
            self.allocate_fallback(bytes)
        };
        debug_assert_eq!((ptr as usize) & (ALIGN - 1), 0);
        // SAFETY: as in `allocate`
        unsafe { std::slice::from_raw_parts_mut(ptr, bytes) }
    }

    /// Bytes reserved from the system, including per-block bookkeeping
    pub fn memory_usage(&self) -> usize {
        self.memory_usage.get()
    }

    /// Number of blocks allocated so far
    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn bump(&self, bytes: usize) -> *mut u8 {
        let result = self.alloc_ptr.get();
        // SAFETY: caller checked `bytes <= alloc_bytes_remaining`
        self.alloc_ptr.set(unsafe { result.add(bytes) });
        self.alloc_bytes_remaining
            .set(self.alloc_bytes_remaining.get() - bytes);
        result
    }

    fn allocate_fallback(&self, bytes: usize) -> *mut u8 {
        if bytes > BLOCK_SIZE / 4 {
            // Dedicated block; the current shared block keeps its remainder
            return self.allocate_new_block(bytes);
        }

        // The rest of the current block is wasted
        let block = self.allocate_new_block(BLOCK_SIZE);
        self.alloc_ptr.set(block);
        self.alloc_bytes_remaining.set(BLOCK_SIZE);
        self.bump(bytes)
    }

    fn allocate_new_block(&self, block_bytes: usize) -> *mut u8 {
        let layout = match Layout::from_size_align(block_bytes, ALIGN) {
            Ok(layout) => layout,
            Err(_) => panic!("arena block of {} bytes exceeds the address space", block_bytes),
        };
        // SAFETY: `layout` has non-zero size (callers never request 0 bytes)
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };
        self.blocks.borrow_mut().push(Block { ptr, layout });
        self.memory_usage
            .set(self.memory_usage.get() + block_bytes + std::mem::size_of::<usize>());
        ptr.as_ptr()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for block in self.blocks.get_mut().drain(..) {
            // SAFETY: allocated in `allocate_new_block` with this layout
            unsafe { alloc::dealloc(block.ptr.as_ptr(), block.layout) };
        }
    }
}
