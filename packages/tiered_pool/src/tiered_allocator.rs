use std::ops::Range;
use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::{BlockPool, Error, Result, Tier, TieredAllocatorBuilder};

/// Routes allocation requests across an ordered list of [`BlockPool`]s.
///
/// An allocation is served by the first pool, in registration order, whose blocks are large
/// enough for the request and which still has a free block. If the natural tier for a request
/// is exhausted, the request spills over into the next large-enough tier. A free is delegated
/// to the pool that owns the address.
///
/// Pools are tried in the order they were registered and are never re-sorted. Register them
/// in ascending block size order to get smallest-fit routing.
///
/// # Thread safety
///
/// The allocator is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]). Callers sharing
/// an allocator between threads must serialize all calls, e.g. with a single mutex.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use tiered_pool::{Tier, TieredAllocator};
///
/// let mut allocator = TieredAllocator::builder()
///     .tier(Tier::new(NonZero::new(1024).unwrap(), NonZero::new(2).unwrap()))
///     .tier(Tier::new(NonZero::new(8192).unwrap(), NonZero::new(1).unwrap()))
///     .build()
///     .unwrap();
///
/// let a = allocator.alloc(512, false).unwrap();
/// let b = allocator.alloc(512, false).unwrap();
///
/// // The 1024-byte tier is exhausted, so this spills over into the 8192-byte tier.
/// let c = allocator.alloc(512, true).unwrap();
/// assert!(allocator.pools()[1].owns(c.as_ptr()));
///
/// // Both tiers are now exhausted.
/// assert!(allocator.alloc(512, false).is_none());
///
/// allocator.free(a.as_ptr());
/// allocator.free(b.as_ptr());
/// allocator.free(c.as_ptr());
/// ```
#[derive(Debug)]
pub struct TieredAllocator {
    pools: Vec<BlockPool>,
}

impl TieredAllocator {
    /// Starts building a new [`TieredAllocator`] from a list of tiers.
    pub fn builder() -> TieredAllocatorBuilder {
        TieredAllocatorBuilder::new()
    }

    /// Creates an allocator with the small/medium/large tiers of [`Tier::DEFAULT_LADDER`].
    ///
    /// # Errors
    ///
    /// Returns an error if the pools cannot be created.
    pub fn with_default_tiers() -> Result<Self> {
        Self::builder().tiers(Tier::DEFAULT_LADDER).build()
    }

    /// Creates an allocator that routes requests across the given pools, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OverlappingPools`] if any two pools manage overlapping address ranges.
    pub fn from_pools(pools: Vec<BlockPool>) -> Result<Self> {
        let ranges = pools
            .iter()
            .map(BlockPool::address_range)
            .collect::<Vec<_>>();

        if let Some((first, second)) = find_overlap(&ranges) {
            return Err(Error::OverlappingPools { first, second });
        }

        if pools
            .windows(2)
            .any(|pair| matches!(pair, [a, b] if a.block_size() > b.block_size()))
        {
            let block_sizes = pools
                .iter()
                .map(BlockPool::block_size)
                .collect::<Vec<_>>();

            warn!(
                ?block_sizes,
                "pools are not registered in ascending block size order, smaller requests may be served by larger blocks"
            );
        }

        debug!(pool_count = pools.len(), "tiered allocator created");

        Ok(Self { pools })
    }

    /// Allocates a block able to hold at least `size` bytes, returning the address of its
    /// payload or `None` if no pool with large enough blocks has a free block.
    ///
    /// If `clear` is set, the block is zeroed up to its full block size.
    #[must_use]
    pub fn alloc(&mut self, size: usize, clear: bool) -> Option<NonNull<u8>> {
        let mut spilled = false;

        for pool in &mut self.pools {
            if pool.block_size() < size {
                continue;
            }

            if let Some(block) = pool.acquire(clear) {
                if spilled {
                    trace!(
                        size,
                        block_size = pool.block_size(),
                        "allocation spilled over into a larger tier"
                    );
                }

                return Some(block);
            }

            spilled = true;
        }

        debug!(
            size,
            "allocation failed, every tier with large enough blocks is exhausted"
        );

        None
    }

    /// Returns a previously allocated block to the pool that owns it.
    ///
    /// Null, addresses not owned by any pool and addresses of blocks that are already free
    /// are ignored.
    pub fn free(&mut self, ptr: *const u8) {
        match self.pools.iter_mut().find(|pool| pool.owns(ptr)) {
            Some(pool) => pool.release(ptr),
            None => trace!(?ptr, "ignoring free of an address no pool owns"),
        }
    }

    /// Whether `ptr` points into the payload of a block of any registered pool.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.pools.iter().any(|pool| pool.owns(ptr))
    }

    /// The registered pools, in registration order.
    #[must_use]
    pub fn pools(&self) -> &[BlockPool] {
        &self.pools
    }

    /// The number of registered pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// The total number of free blocks across all pools.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.pools.iter().map(BlockPool::free_count).sum()
    }

    /// The largest request size any pool can serve, or `None` if no pools are registered.
    #[must_use]
    pub fn max_block_size(&self) -> Option<usize> {
        self.pools.iter().map(BlockPool::block_size).max()
    }

    /// Whether any pool reports a damaged guard region. See [`BlockPool::has_overflow()`].
    #[must_use]
    pub fn has_overflow(&self) -> bool {
        // Every pool is polled, so that every damaged pool gets logged.
        self.pools.iter().filter(|pool| pool.has_overflow()).count() > 0
    }
}

/// Finds the registration positions of the first pair of overlapping address ranges.
fn find_overlap(ranges: &[Range<usize>]) -> Option<(usize, usize)> {
    let mut by_start = ranges.iter().enumerate().collect::<Vec<_>>();
    by_start.sort_unstable_by_key(|(_, range)| range.start);

    by_start.windows(2).find_map(|pair| match pair {
        [(a_position, a), (b_position, b)] if b.start < a.end => {
            Some(((*a_position).min(*b_position), (*a_position).max(*b_position)))
        }
        _ => None,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::ptr;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(TieredAllocator: Send, std::fmt::Debug);
    assert_not_impl_any!(TieredAllocator: Sync);

    fn two_tier_allocator() -> TieredAllocator {
        TieredAllocator::builder()
            .tier(Tier::new(nz!(1024), nz!(2)))
            .tier(Tier::new(nz!(8192), nz!(1)))
            .build()
            .unwrap()
    }

    #[test]
    fn spills_over_into_larger_tier() {
        let mut allocator = two_tier_allocator();

        let a = allocator.alloc(512, false).unwrap();
        let b = allocator.alloc(512, false).unwrap();

        assert!(allocator.pools()[0].owns(a.as_ptr()));
        assert!(allocator.pools()[0].owns(b.as_ptr()));

        let c = allocator.alloc(512, false).unwrap();

        assert!(allocator.pools()[1].owns(c.as_ptr()));

        assert!(allocator.alloc(512, false).is_none());
    }

    #[test]
    fn oversized_request_skips_small_tier() {
        let mut allocator = two_tier_allocator();

        let block = allocator.alloc(1025, false).unwrap();

        assert!(allocator.pools()[1].owns(block.as_ptr()));
        assert_eq!(allocator.pools()[0].free_count(), 2);
    }

    #[test]
    fn exact_block_size_fits() {
        let mut allocator = two_tier_allocator();

        let block = allocator.alloc(1024, false).unwrap();

        assert!(allocator.pools()[0].owns(block.as_ptr()));
    }

    #[test]
    fn request_larger_than_every_tier_fails() {
        let mut allocator = two_tier_allocator();

        assert!(allocator.alloc(8193, false).is_none());
        assert_eq!(allocator.free_count(), 3);
    }

    #[test]
    fn zero_size_request_is_served_by_first_tier() {
        let mut allocator = two_tier_allocator();

        let block = allocator.alloc(0, true).unwrap();

        assert!(allocator.pools()[0].owns(block.as_ptr()));
    }

    #[test]
    fn allocator_without_pools_never_allocates() {
        let mut allocator = TieredAllocator::from_pools(Vec::new()).unwrap();

        assert!(allocator.alloc(1, false).is_none());
        assert_eq!(allocator.pool_count(), 0);
        assert_eq!(allocator.max_block_size(), None);

        allocator.free(ptr::null());
    }

    #[test]
    fn free_returns_block_to_owning_tier() {
        let mut allocator = two_tier_allocator();

        let small = allocator.alloc(10, false).unwrap();
        let large = allocator.alloc(5000, false).unwrap();

        allocator.free(large.as_ptr());

        assert_eq!(allocator.pools()[0].free_count(), 1);
        assert_eq!(allocator.pools()[1].free_count(), 1);

        allocator.free(small.as_ptr());

        assert_eq!(allocator.free_count(), 3);
    }

    #[test]
    fn freed_address_is_reused_first() {
        let mut allocator = two_tier_allocator();

        let block = allocator.alloc(100, false).unwrap();
        allocator.free(block.as_ptr());

        assert_eq!(allocator.alloc(100, false), Some(block));
    }

    #[test]
    fn free_of_foreign_address_is_noop() {
        let mut allocator = two_tier_allocator();
        _ = allocator.alloc(100, false).unwrap();

        let local = [0_u8; 16];
        allocator.free(local.as_ptr());
        allocator.free(ptr::null());

        assert_eq!(allocator.free_count(), 2);
    }

    #[test]
    fn double_free_is_noop() {
        let mut allocator = two_tier_allocator();

        let a = allocator.alloc(100, false).unwrap();
        let _b = allocator.alloc(100, false).unwrap();

        allocator.free(a.as_ptr());
        allocator.free(a.as_ptr());

        assert_eq!(allocator.free_count(), 2);
    }

    #[test]
    fn owns_covers_every_tier() {
        let mut allocator = two_tier_allocator();

        let small = allocator.alloc(1, false).unwrap();
        let large = allocator.alloc(2000, false).unwrap();
        let local = 0_u8;

        assert!(allocator.owns(small.as_ptr()));
        assert!(allocator.owns(large.as_ptr()));
        assert!(!allocator.owns(&raw const local));
    }

    #[test]
    fn max_block_size_is_largest_tier() {
        let allocator = two_tier_allocator();

        assert_eq!(allocator.max_block_size(), Some(8192));
    }

    #[test]
    fn unordered_tiers_are_tried_in_registration_order() {
        let mut allocator = TieredAllocator::builder()
            .tier(Tier::new(nz!(8192), nz!(1)))
            .tier(Tier::new(nz!(1024), nz!(1)))
            .build()
            .unwrap();

        let first = allocator.alloc(10, false).unwrap();
        let second = allocator.alloc(10, false).unwrap();

        assert_eq!(allocator.pools()[0].block_size(), 8192);
        assert!(allocator.pools()[0].owns(first.as_ptr()));
        assert!(allocator.pools()[1].owns(second.as_ptr()));
    }

    #[test]
    fn overflow_in_any_tier_is_reported() {
        let mut allocator = two_tier_allocator();

        assert!(!allocator.has_overflow());

        let block = allocator.alloc(5000, false).unwrap();
        unsafe {
            block.as_ptr().write_bytes(0xAA, 8193);
        }

        assert!(allocator.has_overflow());
        assert!(!allocator.pools()[0].has_overflow());
        assert!(allocator.pools()[1].has_overflow());
    }

    #[test]
    fn clear_zeroes_reused_block() {
        let mut allocator = two_tier_allocator();

        let block = allocator.alloc(64, false).unwrap();
        unsafe {
            block.as_ptr().write_bytes(0xFF, 64);
        }
        allocator.free(block.as_ptr());

        let block = allocator.alloc(64, true).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 64) };

        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn find_overlap_detects_intersecting_ranges() {
        assert_eq!(find_overlap(&[0..10, 20..30, 5..15]), Some((0, 2)));
        assert_eq!(find_overlap(&[20..30, 0..10, 25..26]), Some((0, 2)));
    }

    #[test]
    fn find_overlap_accepts_disjoint_ranges() {
        assert_eq!(find_overlap(&[]), None);
        assert_eq!(find_overlap(&[0..10]), None);
        assert_eq!(find_overlap(&[10..20, 0..10, 20..30]), None);
    }

    #[test]
    fn separately_built_pools_are_accepted() {
        let pools = vec![
            BlockPool::new(nz!(32), nz!(4)),
            BlockPool::new(nz!(64), nz!(4)),
        ];

        let allocator = TieredAllocator::from_pools(pools).unwrap();

        assert_eq!(allocator.pool_count(), 2);
        assert_eq!(allocator.free_count(), 8);
    }
}
