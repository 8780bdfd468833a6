#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-block memory allocator for environments where general-purpose dynamic allocation is
//! undesirable.
//!
//! Memory is carved up once, at startup, into tiers. Each tier is a [`BlockPool`] of a fixed
//! number of equal-size blocks in a single allocation that never moves, grows or shrinks.
//! A [`TieredAllocator`] routes each request to the first tier, in registration order, whose
//! blocks are large enough and which still has a free block:
//!
//! * A request that fits a small tier is served from a larger tier once the small tier is
//!   exhausted ("spillover").
//! * A request that no tier can serve returns `None`. Exhaustion is an expected runtime
//!   condition, not an error.
//! * Freeing an address that no pool owns, or that is already free, is silently ignored.
//!
//! # Overflow detection
//!
//! By default every block payload is followed by a guard region with fixed contents.
//! Writing past the end of a block damages the guard, which is reported when
//! [`TieredAllocator::has_overflow()`] or [`BlockPool::has_overflow()`] is polled.
//!
//! # Thread safety
//!
//! Pools and allocators are thread-mobile but not thread-safe. To share an allocator between
//! threads, guard it with a single mutex.
//!
//! # Example
//!
//! ```
//! use std::num::NonZero;
//!
//! use tiered_pool::{Tier, TieredAllocator};
//!
//! let mut allocator = TieredAllocator::builder()
//!     .tier(Tier::new(NonZero::new(1024).unwrap(), NonZero::new(2).unwrap()))
//!     .tier(Tier::new(NonZero::new(8192).unwrap(), NonZero::new(1).unwrap()))
//!     .build()
//!     .unwrap();
//!
//! let block = allocator.alloc(100, true).expect("the allocator is empty");
//!
//! // SAFETY: The block is at least 100 bytes long and reserved for us.
//! unsafe { block.as_ptr().add(99).write(7) };
//!
//! allocator.free(block.as_ptr());
//! assert!(!allocator.has_overflow());
//! ```

mod block_pool;
mod block_pool_builder;
mod drop_policy;
mod error;
mod guard;
mod slot;
mod tier;
mod tiered_allocator;
mod tiered_allocator_builder;

pub use block_pool::*;
pub use block_pool_builder::*;
pub use drop_policy::*;
pub use error::Error;
pub(crate) use error::Result;
pub use tier::*;
pub use tiered_allocator::*;
pub use tiered_allocator_builder::*;
