//! Allocators used for the storage of deferred work.

use crate::error::{Error, Result};
use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory resource used by executors to store queued handlers.
///
/// Implementations are cheap handles: a clone travels inside every task
/// cell it allocates so the cell can be released through the same resource
/// once it has run.
pub trait Allocator: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Allocate memory for `layout`. `layout.size()` is never zero.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Release memory obtained from [`Allocator::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from a call to `allocate` on this allocator (or a
    /// clone of it) with the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Process-wide default allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        let ptr = unsafe { System.alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| Error::allocation(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        System.dealloc(ptr.as_ptr(), layout)
    }
}

#[derive(Debug, Default)]
struct TrackingState {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    live_bytes: AtomicUsize,
    limit: Option<usize>,
}

/// System allocator wrapper that counts what passes through it.
///
/// Clones share their counters. An optional byte limit makes allocations
/// fail once the live total would exceed it.
#[derive(Debug, Clone, Default)]
pub struct TrackingAllocator {
    state: Arc<TrackingState>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: Arc::new(TrackingState {
                limit: Some(limit),
                ..TrackingState::default()
            }),
        }
    }

    pub fn allocations(&self) -> usize {
        self.state.allocations.load(Ordering::Acquire)
    }

    pub fn deallocations(&self) -> usize {
        self.state.deallocations.load(Ordering::Acquire)
    }

    pub fn live_bytes(&self) -> usize {
        self.state.live_bytes.load(Ordering::Acquire)
    }

    /// Whether two handles share the same counters.
    pub fn shares_state(&self, other: &TrackingAllocator) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Allocator for TrackingAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        let previous = self.state.live_bytes.fetch_add(layout.size(), Ordering::AcqRel);
        if let Some(limit) = self.state.limit {
            if previous + layout.size() > limit {
                self.state.live_bytes.fetch_sub(layout.size(), Ordering::AcqRel);
                return Err(Error::allocation(layout));
            }
        }

        match SystemAllocator.allocate(layout) {
            Ok(ptr) => {
                self.state.allocations.fetch_add(1, Ordering::AcqRel);
                Ok(ptr)
            }
            Err(e) => {
                self.state.live_bytes.fetch_sub(layout.size(), Ordering::AcqRel);
                Err(e)
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        SystemAllocator.deallocate(ptr, layout);
        self.state.live_bytes.fetch_sub(layout.size(), Ordering::AcqRel);
        self.state.deallocations.fetch_add(1, Ordering::AcqRel);
    }
}
