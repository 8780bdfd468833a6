use std::num::NonZero;

use new_zealand::nz;

/// The configuration of one tier: a pool of `block_count` blocks, each able to hold
/// `block_size` bytes.
///
/// Tiers are registered with a [`TieredAllocator`][crate::TieredAllocator] in the order in
/// which it should try them, typically ascending by block size.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use tiered_pool::Tier;
///
/// let tier = Tier::new(NonZero::new(256).unwrap(), NonZero::new(32).unwrap());
///
/// assert_eq!(tier.block_size().get(), 256);
/// assert_eq!(tier.block_count().get(), 32);
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Tier {
    block_size: NonZero<usize>,
    block_count: NonZero<usize>,
}

impl Tier {
    /// 1000 blocks of 1 KiB.
    pub const SMALL: Self = Self::new(nz!(1024), nz!(1000));

    /// 1000 blocks of 8 KiB.
    pub const MEDIUM: Self = Self::new(nz!(8192), nz!(1000));

    /// 1000 blocks of 64 KiB.
    pub const LARGE: Self = Self::new(nz!(65536), nz!(1000));

    /// The small/medium/large ladder used by
    /// [`TieredAllocator::with_default_tiers()`][crate::TieredAllocator::with_default_tiers].
    pub const DEFAULT_LADDER: [Self; 3] = [Self::SMALL, Self::MEDIUM, Self::LARGE];

    /// Creates a tier of `block_count` blocks of `block_size` bytes each.
    #[must_use]
    pub const fn new(block_size: NonZero<usize>, block_count: NonZero<usize>) -> Self {
        Self {
            block_size,
            block_count,
        }
    }

    /// The payload capacity of every block in the tier, in bytes.
    #[must_use]
    pub const fn block_size(&self) -> NonZero<usize> {
        self.block_size
    }

    /// The number of blocks in the tier.
    #[must_use]
    pub const fn block_count(&self) -> NonZero<usize> {
        self.block_count
    }
}

const _: () = assert!(
    Tier::SMALL.block_size().get() < Tier::MEDIUM.block_size().get()
        && Tier::MEDIUM.block_size().get() < Tier::LARGE.block_size().get(),
    "the default ladder must be strictly ascending by block size"
);
