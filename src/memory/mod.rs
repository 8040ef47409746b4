//! Memory resources for deferred work.

pub mod allocator;

pub use allocator::{Allocator, SystemAllocator, TrackingAllocator};
