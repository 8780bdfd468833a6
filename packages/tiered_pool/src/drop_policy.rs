/// Determines what happens when a [`BlockPool`][crate::BlockPool] is dropped while some of its
/// blocks are still reserved.
///
/// The pool storage is always returned to the system when the pool is dropped, after which
/// every address the pool ever handed out is dangling. By default this is allowed.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use tiered_pool::{BlockPool, DropPolicy};
///
/// let pool = BlockPool::builder()
///     .block_size(NonZero::new(64).unwrap())
///     .block_count(NonZero::new(4).unwrap())
///     .drop_policy(DropPolicy::MustNotDropReserved)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.free_count(), 4);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool may be dropped with blocks still reserved. This is the default.
    #[default]
    MayDropReserved,

    /// The pool will panic if it still has reserved blocks when it is dropped.
    ///
    /// This may be valuable when callers keep raw addresses into the pool and the pool is
    /// only expected to be torn down after all of them have been freed.
    MustNotDropReserved,
}
