//! Behavior of the public API as seen by code that owns an allocator for its whole lifetime.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]

use std::collections::HashSet;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::Arc;
use std::{slice, thread};

use new_zealand::nz;
use parking_lot::Mutex;
use tiered_pool::{BlockPool, DropPolicy, Error, Tier, TieredAllocator};

fn bytes<'a>(block: NonNull<u8>, len: usize) -> &'a [u8] {
    unsafe { slice::from_raw_parts(block.as_ptr(), len) }
}

#[test]
fn fresh_pools_are_entirely_free() {
    for count in [1, 2, 17, 100] {
        let pool = BlockPool::new(nz!(8), NonZero::new(count).unwrap());

        assert_eq!(pool.free_count(), count);
    }
}

#[test]
fn pool_serves_exactly_its_capacity_of_distinct_blocks() {
    let mut pool = BlockPool::new(nz!(24), nz!(16));

    let blocks = (0..16)
        .map(|_| pool.acquire(false).unwrap())
        .collect::<HashSet<_>>();

    assert_eq!(blocks.len(), 16);
    assert!(pool.acquire(false).is_none());
}

#[test]
fn released_block_is_served_again() {
    let mut pool = BlockPool::new(nz!(24), nz!(4));

    let blocks = (0..4)
        .map(|_| pool.acquire(false).unwrap())
        .collect::<Vec<_>>();

    pool.release(blocks[2].as_ptr());

    let again = pool.acquire(false).unwrap();

    assert!(blocks.contains(&again));
}

#[test]
fn foreign_release_keeps_free_count() {
    let mut pool = BlockPool::new(nz!(24), nz!(4));
    let mut other = BlockPool::new(nz!(24), nz!(4));

    _ = pool.acquire(false).unwrap();
    let foreign = other.acquire(false).unwrap();

    pool.release(foreign.as_ptr());

    assert_eq!(pool.free_count(), 3);
    assert_eq!(other.free_count(), 3);
}

#[test]
fn cleared_block_is_zero_after_dirty_reuse() {
    let mut pool = BlockPool::new(nz!(64), nz!(1));

    let block = pool.acquire(false).unwrap();
    unsafe { block.as_ptr().write_bytes(0x5A, 64) };
    pool.release(block.as_ptr());

    let block = pool.acquire(true).unwrap();

    assert_eq!(bytes(block, 64), [0; 64]);
}

#[test]
fn spillover_scenario() {
    let mut allocator = TieredAllocator::builder()
        .tier(Tier::new(nz!(1024), nz!(2)))
        .tier(Tier::new(nz!(8192), nz!(1)))
        .build()
        .unwrap();

    let first = allocator.alloc(512, false).unwrap();
    let second = allocator.alloc(512, false).unwrap();

    let small = &allocator.pools()[0];
    assert!(small.owns(first.as_ptr()));
    assert!(small.owns(second.as_ptr()));

    let third = allocator.alloc(512, false).unwrap();
    assert!(allocator.pools()[1].owns(third.as_ptr()));

    assert!(allocator.alloc(512, false).is_none());
}

#[test]
fn overflow_is_detected_only_after_out_of_bounds_write() {
    let mut allocator = TieredAllocator::builder()
        .tier(Tier::new(nz!(32), nz!(4)))
        .build()
        .unwrap();

    let block = allocator.alloc(32, false).unwrap();
    unsafe { block.as_ptr().write_bytes(1, 32) };

    assert!(!allocator.has_overflow());

    unsafe { block.as_ptr().add(32).write(1) };

    assert!(allocator.has_overflow());
    assert_eq!(allocator.pools()[0].overflowed_blocks(), 1);
}

#[test]
fn freed_address_is_next_one_served() {
    let mut allocator = TieredAllocator::builder()
        .tier(Tier::new(nz!(128), nz!(8)))
        .build()
        .unwrap();

    let kept = allocator.alloc(100, false).unwrap();
    let freed = allocator.alloc(100, false).unwrap();

    allocator.free(freed.as_ptr());

    let reused = allocator.alloc(50, false).unwrap();

    assert_eq!(reused, freed);
    assert_ne!(reused, kept);
}

#[test]
fn clear_region_zeroes_requested_bytes() {
    let mut allocator = TieredAllocator::builder()
        .tier(Tier::new(nz!(256), nz!(1)))
        .build()
        .unwrap();

    let block = allocator.alloc(200, false).unwrap();
    unsafe { block.as_ptr().write_bytes(0xEE, 256) };
    allocator.free(block.as_ptr());

    let block = allocator.alloc(200, true).unwrap();

    assert_eq!(bytes(block, 200), [0; 200]);
}

#[test]
fn default_tiers_form_ascending_ladder() {
    let allocator = TieredAllocator::with_default_tiers().unwrap();

    let sizes = allocator
        .pools()
        .iter()
        .map(BlockPool::block_size)
        .collect::<Vec<_>>();

    assert_eq!(sizes, [1024, 8192, 65536]);
    assert_eq!(allocator.free_count(), 3000);
    assert_eq!(allocator.max_block_size(), Some(65536));
}

#[test]
fn caller_built_pools_route_in_given_order() {
    let small = BlockPool::builder()
        .block_size(nz!(16))
        .block_count(nz!(1))
        .build()
        .unwrap();
    let large = BlockPool::new(nz!(4096), nz!(1));

    let mut allocator = TieredAllocator::from_pools(vec![small, large]).unwrap();

    let a = allocator.alloc(8, false).unwrap();
    let b = allocator.alloc(8, false).unwrap();

    assert_eq!(allocator.pools()[0].block_size(), 16);
    assert!(allocator.pools()[0].owns(a.as_ptr()));
    assert!(allocator.pools()[1].owns(b.as_ptr()));
}

#[test]
fn oversized_tier_is_configuration_error() {
    let result = TieredAllocator::builder()
        .tier(Tier::new(NonZero::new(usize::MAX).unwrap(), nz!(2)))
        .build();

    let error = result.unwrap_err();

    assert!(matches!(error, Error::LayoutTooLarge { .. }));
    assert!(error.to_string().contains(&usize::MAX.to_string()));
}

#[test]
fn drop_policy_applies_to_every_tier() {
    let mut allocator = TieredAllocator::builder()
        .tiers([Tier::new(nz!(16), nz!(2)), Tier::new(nz!(64), nz!(2))])
        .drop_policy(DropPolicy::MustNotDropReserved)
        .build()
        .unwrap();

    let blocks = [
        allocator.alloc(10, false).unwrap(),
        allocator.alloc(60, false).unwrap(),
    ];

    for block in blocks {
        allocator.free(block.as_ptr());
    }

    // Nothing is reserved any more, so dropping is allowed.
    drop(allocator);
}

#[test]
fn shared_allocator_behind_mutex() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 200;

    let allocator = Arc::new(Mutex::new(
        TieredAllocator::builder()
            .tier(Tier::new(nz!(64), nz!(2)))
            .tier(Tier::new(nz!(256), nz!(2)))
            .build()
            .unwrap(),
    ));

    let handles = (0..THREADS)
        .map(|thread_index| {
            let allocator = Arc::clone(&allocator);

            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    // Each allocation is freed before the lock is released, so the block never
                    // leaves this thread.
                    let mut allocator = allocator.lock();

                    let block = allocator.alloc(48, true).unwrap();
                    let marker = u8::try_from(thread_index).unwrap();
                    unsafe { block.as_ptr().write_bytes(marker, 48) };
                    allocator.free(block.as_ptr());
                }
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        handle.join().unwrap();
    }

    let allocator = allocator.lock();

    assert_eq!(allocator.free_count(), 4);
    assert!(!allocator.has_overflow());
}
