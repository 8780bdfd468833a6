use std::cell::Cell;
use std::marker::PhantomData;

use crate::{BlockPool, DropPolicy, Result, Tier, TieredAllocator};

/// Builder for creating an instance of [`TieredAllocator`].
///
/// Tiers are registered in the order the allocator will try them. Each tier becomes one
/// [`BlockPool`], all of which share the overflow guard and drop policy settings of the builder.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use tiered_pool::{Tier, TieredAllocator};
///
/// let allocator = TieredAllocator::builder()
///     .tier(Tier::new(NonZero::new(64).unwrap(), NonZero::new(16).unwrap()))
///     .tier(Tier::new(NonZero::new(512).unwrap(), NonZero::new(4).unwrap()))
///     .overflow_guard(false)
///     .build()
///     .unwrap();
///
/// assert_eq!(allocator.pool_count(), 2);
/// assert_eq!(allocator.free_count(), 20);
/// ```
#[derive(Debug)]
#[must_use]
pub struct TieredAllocatorBuilder {
    tiers: Vec<Tier>,
    overflow_guard: bool,
    drop_policy: DropPolicy,

    _not_sync: PhantomData<Cell<()>>,
}

impl TieredAllocatorBuilder {
    pub(crate) fn new() -> Self {
        Self {
            tiers: Vec::new(),
            overflow_guard: true,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Registers one more tier after the ones already registered.
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Registers several tiers, in iteration order, after the ones already registered.
    pub fn tiers(mut self, tiers: impl IntoIterator<Item = Tier>) -> Self {
        self.tiers.extend(tiers);
        self
    }

    /// Enables or disables guard regions in every pool. Enabled by default.
    pub fn overflow_guard(mut self, enabled: bool) -> Self {
        self.overflow_guard = enabled;
        self
    }

    /// Sets the [drop policy][DropPolicy] of every pool.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Creates the pools for all registered tiers and the allocator routing across them.
    ///
    /// An allocator without tiers is valid; it fails every allocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage of any tier cannot be described as a single memory
    /// layout, or if pool address ranges overlap.
    pub fn build(self) -> Result<TieredAllocator> {
        let pools = self
            .tiers
            .into_iter()
            .map(|tier| {
                BlockPool::builder()
                    .tier(tier)
                    .overflow_guard(self.overflow_guard)
                    .drop_policy(self.drop_policy)
                    .build()
            })
            .collect::<Result<Vec<_>>>()?;

        TieredAllocator::from_pools(pools)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::num::NonZero;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::Error;

    assert_impl_all!(TieredAllocatorBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(TieredAllocatorBuilder: Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = TieredAllocatorBuilder::new();

        assert!(builder.tiers.is_empty());
        assert!(builder.overflow_guard);
        assert_eq!(builder.drop_policy, DropPolicy::default());
    }

    #[test]
    fn tiers_keep_registration_order() {
        let builder = TieredAllocatorBuilder::new()
            .tier(Tier::new(nz!(64), nz!(1)))
            .tiers([Tier::new(nz!(32), nz!(2)), Tier::new(nz!(128), nz!(3))]);

        assert_eq!(
            builder.tiers,
            [
                Tier::new(nz!(64), nz!(1)),
                Tier::new(nz!(32), nz!(2)),
                Tier::new(nz!(128), nz!(3)),
            ]
        );
    }

    #[test]
    fn build_creates_one_pool_per_tier() {
        let allocator = TieredAllocatorBuilder::new()
            .tier(Tier::new(nz!(64), nz!(1)))
            .tier(Tier::new(nz!(32), nz!(2)))
            .build()
            .unwrap();

        let pools = allocator.pools();

        assert_eq!(pools.len(), 2);
        assert_eq!(pools.first().unwrap().block_size(), 64);
        assert_eq!(pools.last().unwrap().block_count(), 2);
    }

    #[test]
    fn build_applies_shared_settings() {
        let allocator = TieredAllocatorBuilder::new()
            .tiers([Tier::new(nz!(64), nz!(1)), Tier::new(nz!(128), nz!(1))])
            .overflow_guard(false)
            .build()
            .unwrap();

        assert!(
            allocator
                .pools()
                .iter()
                .all(|pool| !pool.has_overflow_guard())
        );
    }

    #[test]
    fn build_without_tiers_is_empty_allocator() {
        let allocator = TieredAllocatorBuilder::new().build().unwrap();

        assert_eq!(allocator.pool_count(), 0);
        assert_eq!(allocator.free_count(), 0);
    }

    #[test]
    fn build_fails_if_any_tier_is_oversized() {
        let result = TieredAllocatorBuilder::new()
            .tier(Tier::new(nz!(64), nz!(1)))
            .tier(Tier::new(NonZero::new(usize::MAX).unwrap(), nz!(1)))
            .build();

        assert!(matches!(result, Err(Error::LayoutTooLarge { .. })));
    }
}
