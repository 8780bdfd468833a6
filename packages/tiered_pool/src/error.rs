use thiserror::Error;

/// Errors that can occur when configuring block pools or a tiered allocator.
///
/// Runtime conditions are not errors: an exhausted allocator returns `None`, a bad free is
/// ignored and guard damage is reported by polling [`has_overflow()`][1].
///
/// [1]: crate::BlockPool::has_overflow
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A block pool was built without specifying the size of its blocks.
    #[error("block pool configuration is missing the block size")]
    MissingBlockSize,

    /// A block pool was built without specifying how many blocks it holds.
    #[error("block pool configuration is missing the block count")]
    MissingBlockCount,

    /// The storage for the requested pool cannot be described as a single memory layout,
    /// typically because `block_size * block_count` overflows the address space.
    #[error(
        "block pool of {block_count} blocks of {block_size} bytes does not fit in a single memory layout"
    )]
    LayoutTooLarge {
        /// Requested payload capacity of every block, in bytes.
        block_size: usize,

        /// Requested number of blocks.
        block_count: usize,
    },

    /// Two pools registered with the same allocator manage overlapping address ranges, which
    /// would make it ambiguous which pool owns a freed address.
    #[error("pools at registration positions {first} and {second} manage overlapping address ranges")]
    OverlappingPools {
        /// Registration position of the first pool in the overlapping pair.
        first: usize,

        /// Registration position of the second pool in the overlapping pair.
        second: usize,
    },
}

/// A specialized `Result` type for pool configuration, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
