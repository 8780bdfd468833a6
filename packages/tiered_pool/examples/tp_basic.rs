//! Basic usage of the `tiered_pool` crate:
//!
//! * Configuring tiers.
//! * Allocating, including spillover into a larger tier.
//! * Freeing.
//! * Polling for overflow.

use std::num::NonZero;

use tiered_pool::{Tier, TieredAllocator};

fn main() {
    let mut allocator = TieredAllocator::builder()
        .tier(Tier::new(
            NonZero::new(1024).unwrap(),
            NonZero::new(2).unwrap(),
        ))
        .tier(Tier::new(
            NonZero::new(8192).unwrap(),
            NonZero::new(1).unwrap(),
        ))
        .build()
        .expect("tiers of this size always fit in memory");

    println!(
        "Allocator has {} tiers with {} free blocks",
        allocator.pool_count(),
        allocator.free_count()
    );

    // The first two requests fit the 1024-byte tier.
    let a = allocator.alloc(512, false).unwrap();
    let b = allocator.alloc(512, false).unwrap();

    // The 1024-byte tier is now full, so the next request spills over.
    let c = allocator.alloc(512, true).unwrap();
    println!(
        "Third block came from the {}-byte tier",
        allocator
            .pools()
            .iter()
            .find(|pool| pool.owns(c.as_ptr()))
            .map(|pool| pool.block_size())
            .unwrap()
    );

    // Every tier that could serve the request is exhausted.
    assert!(allocator.alloc(512, false).is_none());
    println!("Fourth request failed, as expected");

    // Writing one byte past the end of a 1024-byte block damages its guard region.
    // SAFETY: This writes into the guard region that directly follows the payload, which
    // belongs to the pool storage. It is the very mistake we want to demonstrate detecting.
    unsafe {
        a.as_ptr().add(1024).write(0);
    }

    println!("Overflow detected: {}", allocator.has_overflow());

    for block in [a, b, c] {
        allocator.free(block.as_ptr());
    }

    println!(
        "After freeing, {} blocks are free again",
        allocator.free_count()
    );
}
