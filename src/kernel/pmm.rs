// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Physical Memory Manager (PMM)
//!
//! Page allocation for GIC tables, ITTs and the command queue. The GIC
//! is handed raw physical addresses, so everything here deals in `PAddr`.
//!
//! # Design
//!
//! [`PageArena`] is a bitmap allocator: one bit per 4KB page, 1 meaning
//! allocated. Blocks of `2^order` pages are naturally aligned to their
//! own size, which is what GITS_BASER, GICR_PENDBASER and friends need.
//! Nothing is ever freed; a harness run is short-lived.
//!
//! # Usage
//!
//! ```rust
//! use gictest::kernel::pmm::{PageArena, PAGE_SIZE};
//!
//! let arena = PageArena::new(0x4000_0000, 64);
//! let table = arena.alloc(4).unwrap(); // 16 pages, 64KB aligned
//! assert_eq!(table % (16 * PAGE_SIZE as u64), 0);
//! ```

use crate::err::{GicError, Result};
use crate::reg::PAddr;
use spin::Mutex;

/// Page size in bytes
pub const PAGE_SIZE: usize = 4096;

/// Page size shift for quick division/multiplication
pub const PAGE_SIZE_SHIFT: u32 = 12;

/// Largest arena the bitmap can describe (32MB)
pub const MAX_ARENA_PAGES: usize = 8192;

const BITMAP_WORDS: usize = MAX_ARENA_PAGES / 64;

/// Convert bytes to number of pages (rounding up)
#[inline]
pub const fn bytes_to_pages(bytes: usize) -> usize {
    (bytes + PAGE_SIZE - 1) / PAGE_SIZE
}

/// Convert a page order to bytes
#[inline]
pub const fn order_to_bytes(order: u32) -> usize {
    PAGE_SIZE << order
}

/// Source of physically contiguous, zeroed pages
pub trait PageAllocator: Sync {
    /// Allocate `2^order` contiguous pages, aligned to their size
    fn alloc_pages(&self, order: u32) -> Result<PAddr>;
}

struct Bitmap {
    words: [u64; BITMAP_WORDS],
    used: usize,
}

impl Bitmap {
    fn is_free(&self, index: usize) -> bool {
        self.words[index / 64] & (1u64 << (index % 64)) == 0
    }

    fn mark(&mut self, index: usize) {
        self.words[index / 64] |= 1u64 << (index % 64);
    }
}

/// Bitmap page allocator over one contiguous RAM region
pub struct PageArena {
    base: PAddr,
    pages: usize,
    bitmap: Mutex<Bitmap>,
}

impl PageArena {
    /// Create an arena of `pages` pages starting at `base`
    ///
    /// `base` is rounded up to a page boundary. Pages beyond
    /// [`MAX_ARENA_PAGES`] are ignored.
    pub const fn new(base: PAddr, pages: usize) -> Self {
        let aligned = (base + PAGE_SIZE as PAddr - 1) & !(PAGE_SIZE as PAddr - 1);
        let pages = if pages > MAX_ARENA_PAGES {
            MAX_ARENA_PAGES
        } else {
            pages
        };
        Self {
            base: aligned,
            pages,
            bitmap: Mutex::new(Bitmap {
                words: [0; BITMAP_WORDS],
                used: 0,
            }),
        }
    }

    /// Allocate `2^order` pages; the block is aligned to its own size
    /// in physical address space
    pub fn alloc(&self, order: u32) -> Result<PAddr> {
        let count = 1usize << order;
        let align = (count * PAGE_SIZE) as PAddr;
        let mut bitmap = self.bitmap.lock();

        // First page index whose address is suitably aligned
        let first = ((self.base + align - 1) & !(align - 1)) - self.base;
        let mut start = (first / PAGE_SIZE as PAddr) as usize;

        while start + count <= self.pages {
            if (start..start + count).all(|i| bitmap.is_free(i)) {
                (start..start + count).for_each(|i| bitmap.mark(i));
                bitmap.used += count;
                let paddr = self.base + (start * PAGE_SIZE) as PAddr;
                log::trace!("pmm: order {} -> {:#x}", order, paddr);
                return Ok(paddr);
            }
            start += count;
        }

        log::error!("pmm: cannot allocate order {} ({} of {} pages used)",
            order, bitmap.used, self.pages);
        Err(GicError::NoMemory { order })
    }

    /// Number of pages handed out so far
    pub fn used_pages(&self) -> usize {
        self.bitmap.lock().used
    }

    /// First address managed by the arena
    pub fn base(&self) -> PAddr {
        self.base
    }

    /// Size of the arena in bytes
    pub fn size(&self) -> usize {
        self.pages * PAGE_SIZE
    }
}

impl PageAllocator for PageArena {
    fn alloc_pages(&self, order: u32) -> Result<PAddr> {
        self.alloc(order)
    }
}

// ============================================================================
// Tests
// ============================================================================
