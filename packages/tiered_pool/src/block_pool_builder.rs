use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::slot::PoolLayout;
use crate::{BlockPool, DropPolicy, Error, Result, Tier};

/// Builder for creating an instance of [`BlockPool`].
///
/// The block size and block count are mandatory, either set individually or together via
/// [`tier()`][Self::tier]. Other settings are optional.
///
/// # Examples
///
/// ```
/// use tiered_pool::{BlockPool, Tier};
///
/// let pool = BlockPool::builder().tier(Tier::SMALL).build().unwrap();
///
/// assert_eq!(pool.block_size(), 1024);
/// assert_eq!(pool.block_count(), 1000);
/// ```
///
/// # Thread safety
///
/// The builder is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]).
#[derive(Debug)]
#[must_use]
pub struct BlockPoolBuilder {
    block_size: Option<NonZero<usize>>,
    block_count: Option<NonZero<usize>>,
    overflow_guard: bool,
    drop_policy: DropPolicy,

    _not_sync: PhantomData<Cell<()>>,
}

impl BlockPoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            block_size: None,
            block_count: None,
            overflow_guard: true,
            drop_policy: DropPolicy::default(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the payload capacity of every block, in bytes.
    pub fn block_size(mut self, block_size: NonZero<usize>) -> Self {
        self.block_size = Some(block_size);
        self
    }

    /// Sets the number of blocks in the pool.
    pub fn block_count(mut self, block_count: NonZero<usize>) -> Self {
        self.block_count = Some(block_count);
        self
    }

    /// Sets both the block size and the block count from a [`Tier`].
    pub fn tier(self, tier: Tier) -> Self {
        self.block_size(tier.block_size())
            .block_count(tier.block_count())
    }

    /// Enables or disables the guard regions used for overflow detection. Enabled by default.
    ///
    /// Without guard regions the blocks are packed more densely but
    /// [`has_overflow()`][BlockPool::has_overflow] always returns `false`.
    pub fn overflow_guard(mut self, enabled: bool) -> Self {
        self.overflow_guard = enabled;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat blocks that
    /// are still reserved when the pool is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the block pool with the specified configuration, allocating all of its storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the block size or block count was not set, or if the pool storage
    /// cannot be described as a single memory layout.
    pub fn build(self) -> Result<BlockPool> {
        let block_size = self.block_size.ok_or(Error::MissingBlockSize)?;
        let block_count = self.block_count.ok_or(Error::MissingBlockCount)?;

        let layout = PoolLayout::calculate(block_size, block_count, self.overflow_guard)?;

        Ok(BlockPool::with_layout(layout, self.drop_policy))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(BlockPoolBuilder: Send, std::fmt::Debug);
    assert_not_impl_any!(BlockPoolBuilder: Sync);

    #[test]
    fn builder_new_creates_default_state() {
        let builder = BlockPoolBuilder::new();

        assert!(builder.block_size.is_none());
        assert!(builder.block_count.is_none());
        assert!(builder.overflow_guard);
        assert_eq!(builder.drop_policy, DropPolicy::default());
    }

    #[test]
    fn tier_sets_size_and_count() {
        let builder = BlockPoolBuilder::new().tier(Tier::new(nz!(48), nz!(3)));

        assert_eq!(builder.block_size, Some(nz!(48)));
        assert_eq!(builder.block_count, Some(nz!(3)));
    }

    #[test]
    fn settings_can_be_overridden() {
        let builder = BlockPoolBuilder::new()
            .tier(Tier::new(nz!(48), nz!(3)))
            .block_count(nz!(5))
            .overflow_guard(false)
            .overflow_guard(true)
            .drop_policy(DropPolicy::MustNotDropReserved);

        assert_eq!(builder.block_size, Some(nz!(48)));
        assert_eq!(builder.block_count, Some(nz!(5)));
        assert!(builder.overflow_guard);
        assert_eq!(builder.drop_policy, DropPolicy::MustNotDropReserved);
    }

    #[test]
    fn build_without_block_size_fails() {
        let result = BlockPoolBuilder::new().block_count(nz!(3)).build();

        assert!(matches!(result, Err(Error::MissingBlockSize)));
    }

    #[test]
    fn build_without_block_count_fails() {
        let result = BlockPoolBuilder::new().block_size(nz!(3)).build();

        assert!(matches!(result, Err(Error::MissingBlockCount)));
    }

    #[test]
    fn build_oversized_fails() {
        let result = BlockPoolBuilder::new()
            .block_size(NonZero::new(usize::MAX).unwrap())
            .block_count(nz!(1))
            .build();

        assert!(matches!(result, Err(Error::LayoutTooLarge { .. })));
    }

    #[test]
    fn build_applies_configuration() {
        let pool = BlockPoolBuilder::new()
            .block_size(nz!(100))
            .block_count(nz!(7))
            .overflow_guard(false)
            .build()
            .unwrap();

        assert_eq!(pool.block_size(), 100);
        assert_eq!(pool.block_count(), 7);
        assert_eq!(pool.free_count(), 7);
        assert!(!pool.has_overflow_guard());
    }

    #[test]
    fn builder_can_move_between_threads() {
        let builder = BlockPoolBuilder::new().tier(Tier::new(nz!(8), nz!(8)));

        let handle = std::thread::spawn(move || builder.build().unwrap());
        let pool = handle.join().unwrap();

        assert_eq!(pool.free_count(), 8);
    }
}
