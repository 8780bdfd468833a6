use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error};
use std::num::NonZero;
use std::ops::Range;
use std::ptr::NonNull;
use std::{fmt, mem, thread};

use tracing::{debug, trace, warn};

use crate::slot::{PoolLayout, SlotMeta, SlotPosition};
use crate::{BlockPoolBuilder, DropPolicy, guard};

/// A fixed number of equal-size memory blocks, allocated once and never moved.
///
/// Blocks are handed out by [`acquire()`][1] as raw addresses and returned by
/// [`release()`][2]. The pool never grows or shrinks: once every block is reserved,
/// [`acquire()`][1] returns `None` until a block is released.
///
/// Free blocks are tracked as a stack of slot indexes, so both operations are O(1) and the
/// most recently released block is the next one to be handed out.
///
/// # Out of band access
///
/// The pool never creates references to block payloads. Callers access the memory behind the
/// returned addresses from unsafe code; each address is valid for reads and writes of
/// [`block_size()`][3] bytes until the block is released or the pool is dropped, and is aligned
/// to 16 bytes.
///
/// # Overflow detection
///
/// Unless disabled via the [builder][4], every payload is followed by a small guard region
/// whose contents are fixed when the pool is created. Writing past the end of a payload
/// damages the guard, which [`has_overflow()`][5] reports the next time it is polled.
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`]) but not thread-safe ([`Sync`]). All bookkeeping
/// mutations take `&mut self`; callers sharing a pool between threads must wrap it in a mutex.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use tiered_pool::BlockPool;
///
/// let mut pool = BlockPool::new(NonZero::new(64).unwrap(), NonZero::new(2).unwrap());
///
/// let block = pool.acquire(true).unwrap();
/// assert_eq!(pool.free_count(), 1);
///
/// // SAFETY: The block is 64 bytes long and reserved for us.
/// unsafe { block.as_ptr().write(42) };
///
/// pool.release(block.as_ptr());
/// assert_eq!(pool.free_count(), 2);
/// ```
///
/// [1]: Self::acquire
/// [2]: Self::release
/// [3]: Self::block_size
/// [4]: BlockPoolBuilder::overflow_guard
/// [5]: Self::has_overflow
pub struct BlockPool {
    layout: PoolLayout,

    /// Start of the single storage allocation holding every block payload and guard.
    storage: NonNull<u8>,

    slots: Box<[SlotMeta]>,

    /// Head of the stack of vacant slots. Equal to the block count when the pool is full.
    next_free_index: usize,

    reserved_count: usize,

    drop_policy: DropPolicy,
}

impl BlockPool {
    /// Creates a pool of `block_count` blocks of `block_size` bytes each, with overflow
    /// detection enabled and the default [drop policy][DropPolicy].
    ///
    /// Use the [builder][Self::builder] to customize the pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool storage cannot be described as a single memory layout.
    #[must_use]
    pub fn new(block_size: NonZero<usize>, block_count: NonZero<usize>) -> Self {
        let layout = PoolLayout::calculate(block_size, block_count, true)
            .unwrap_or_else(|e| panic!("cannot create block pool: {e}"));

        Self::with_layout(layout, DropPolicy::default())
    }

    /// Starts building a new [`BlockPool`].
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZero;
    ///
    /// use tiered_pool::BlockPool;
    ///
    /// let pool = BlockPool::builder()
    ///     .block_size(NonZero::new(128).unwrap())
    ///     .block_count(NonZero::new(8).unwrap())
    ///     .overflow_guard(false)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert!(!pool.has_overflow_guard());
    /// ```
    pub fn builder() -> BlockPoolBuilder {
        BlockPoolBuilder::new()
    }

    pub(crate) fn with_layout(layout: PoolLayout, drop_policy: DropPolicy) -> Self {
        let storage_layout = layout.storage();

        // Zeroed so that a block handed out without clearing is still initialized memory.
        // SAFETY: The storage layout is never zero-sized because both the block size and the
        // block count are non-zero.
        let storage = NonNull::new(unsafe { alloc_zeroed(storage_layout) })
            .unwrap_or_else(|| handle_alloc_error(storage_layout));

        let block_count = layout.block_count().get();

        // For the last slot, this points one past the end, which terminates the free stack.
        let slots = (0..block_count)
            .map(|index| SlotMeta::Vacant {
                next_free_index: index.wrapping_add(1),
            })
            .collect::<Box<[_]>>();

        let pool = Self {
            layout,
            storage,
            slots,
            next_free_index: 0,
            reserved_count: 0,
            drop_policy,
        };

        if pool.has_overflow_guard() {
            for index in 0..block_count {
                // SAFETY: The guard pointer stays within the storage we just allocated and
                // nothing else knows about the storage yet.
                unsafe {
                    guard::establish(pool.guard_ptr(index));
                }
            }
        }

        debug!(
            block_size = pool.block_size(),
            block_count,
            stride = pool.layout.stride(),
            overflow_guard = pool.has_overflow_guard(),
            "block pool created"
        );

        pool
    }

    /// The payload capacity of every block in the pool, in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.layout.block_size().get()
    }

    /// The total number of blocks in the pool, reserved or free.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.layout.block_count().get()
    }

    /// The number of blocks currently available to [`acquire()`][Self::acquire].
    #[must_use]
    pub fn free_count(&self) -> usize {
        // Cannot underflow because we never reserve more blocks than exist.
        self.block_count().wrapping_sub(self.reserved_count)
    }

    /// The number of blocks currently handed out.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Mutating this only shows up via debug integrity checks.
    pub fn reserved_count(&self) -> usize {
        self.reserved_count
    }

    /// Whether every block is reserved.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.next_free_index >= self.block_count()
    }

    /// Whether no block is reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reserved_count == 0
    }

    /// Whether the blocks of this pool are followed by guard regions.
    #[must_use]
    pub fn has_overflow_guard(&self) -> bool {
        self.layout.guard_len() > 0
    }

    /// The span of addresses occupied by the pool storage, including guard regions and
    /// padding between blocks.
    #[must_use]
    pub fn address_range(&self) -> Range<usize> {
        let start = self.storage.as_ptr().addr();

        // Cannot overflow because the allocation exists in the address space.
        start..start.wrapping_add(self.layout.storage().size())
    }

    /// Reserves a free block and returns the address of its payload, or `None` if every block
    /// is already reserved.
    ///
    /// If `clear` is set, the first [`block_size()`][Self::block_size] bytes of the block are
    /// zeroed before returning. Otherwise the block holds whatever its previous user left
    /// behind, or zeroes if it has never been handed out. The guard region is never touched.
    #[must_use]
    pub fn acquire(&mut self, clear: bool) -> Option<NonNull<u8>> {
        if self.is_full() {
            trace!(block_size = self.block_size(), "block pool exhausted");
            return None;
        }

        // Pop the next free index from the stack of free slots.
        let index = self.next_free_index;

        let slot = self
            .slots
            .get_mut(index)
            .expect("free stack head is in bounds when the pool is not full");

        self.next_free_index = match mem::replace(slot, SlotMeta::Reserved) {
            SlotMeta::Vacant { next_free_index } => next_free_index,
            SlotMeta::Reserved => panic!(
                "slot {index} at the head of the free stack was already reserved in pool of {}-byte blocks",
                self.layout.block_size()
            ),
        };

        // Cannot overflow because there are at most block_count reservations.
        self.reserved_count = self.reserved_count.wrapping_add(1);

        let payload = self.payload_ptr(index);

        if clear {
            // SAFETY: The payload is block_size bytes within our storage and we just reserved it,
            // so nobody else is supposed to be using it.
            unsafe {
                payload.write_bytes(0, self.block_size());
            }
        }

        #[cfg(debug_assertions)]
        self.integrity_check();

        trace!(block_size = self.block_size(), index, clear, "block acquired");

        Some(payload)
    }

    /// Returns a reserved block to the pool.
    ///
    /// Addresses that are not the payload start of a reserved block of this pool are ignored:
    /// null, addresses of other pools or objects, addresses inside a payload and blocks that
    /// are already free all leave the pool unchanged.
    pub fn release(&mut self, ptr: *const u8) {
        let Some(index) = self.block_index_of(ptr) else {
            trace!(
                block_size = self.block_size(),
                ?ptr,
                "ignoring release of an address that is not a block start"
            );
            return;
        };

        if self.slots.get(index) != Some(&SlotMeta::Reserved) {
            trace!(
                block_size = self.block_size(),
                index,
                "ignoring release of a block that is already free"
            );
            return;
        }

        let next_free_index = self.next_free_index;

        *self
            .slots
            .get_mut(index)
            .expect("block_index_of() only returns indexes within the pool") =
            SlotMeta::Vacant { next_free_index };

        // Push the released slot onto the free stack.
        self.next_free_index = index;

        // Cannot underflow because we just observed a reserved slot.
        self.reserved_count = self.reserved_count.wrapping_sub(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        trace!(block_size = self.block_size(), index, "block released");
    }

    /// Whether `ptr` points into the payload of one of this pool's blocks.
    ///
    /// Addresses in guard regions or alignment padding between blocks are not owned, and
    /// neither is null.
    #[must_use]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.position_of(ptr)
            .is_some_and(|position| position.offset_in_block < self.block_size())
    }

    /// Whether any block shows a damaged guard region, meaning something was written past the
    /// end of a block payload at some point since the pool was created.
    ///
    /// This does not say which block overflowed and the damage is never repaired, so once this
    /// returns `true` it keeps doing so. Always `false` if the pool has no guard regions.
    ///
    /// Callers must ensure no other thread is writing to blocks of this pool during the call.
    #[must_use]
    pub fn has_overflow(&self) -> bool {
        let overflowed = self.overflowed_blocks();

        if overflowed > 0 {
            warn!(
                block_size = self.block_size(),
                overflowed, "block pool guard regions are damaged"
            );
        }

        overflowed > 0
    }

    /// The number of blocks whose guard region no longer holds its initial contents.
    ///
    /// Callers must ensure no other thread is writing to blocks of this pool during the call.
    #[must_use]
    pub fn overflowed_blocks(&self) -> usize {
        if !self.has_overflow_guard() {
            return 0;
        }

        (0..self.block_count())
            // SAFETY: Every guard region lies within our storage and was initialized in the
            // ctor. The caller guarantees that nobody writes to the blocks concurrently.
            .filter(|&index| !unsafe { guard::is_intact(self.guard_ptr(index)) })
            .count()
    }

    fn position_of(&self, ptr: *const u8) -> Option<SlotPosition> {
        let offset = ptr.addr().checked_sub(self.storage.as_ptr().addr())?;

        self.layout.position_of(offset)
    }

    /// The index of the block whose payload starts exactly at `ptr`, if any.
    fn block_index_of(&self, ptr: *const u8) -> Option<usize> {
        self.position_of(ptr)
            .filter(|position| position.offset_in_block == 0)
            .map(|position| position.index)
    }

    fn payload_ptr(&self, index: usize) -> NonNull<u8> {
        let offset = self.layout.payload_offset(index);

        // SAFETY: The offset was bounds-checked by the layout and stays within our storage.
        unsafe { self.storage.add(offset) }
    }

    fn guard_ptr(&self, index: usize) -> NonNull<u8> {
        let offset = self.layout.guard_offset(index);

        // SAFETY: The offset was bounds-checked by the layout and stays within our storage.
        unsafe { self.storage.add(offset) }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let block_count = self.block_count();

        let observed_reserved_count = self
            .slots
            .iter()
            .filter(|slot| **slot == SlotMeta::Reserved)
            .count();

        assert_eq!(
            self.reserved_count,
            observed_reserved_count,
            "reserved count {} does not match the observed reserved count {} in pool of {}-byte blocks",
            self.reserved_count,
            observed_reserved_count,
            self.block_size()
        );

        // Walk the free stack. It must visit exactly the vacant slots, each once.
        let mut visited = 0_usize;
        let mut index = self.next_free_index;

        while index != block_count {
            assert!(
                visited < block_count,
                "free stack of pool of {}-byte blocks contains a cycle",
                self.block_size()
            );

            index = match self.slots.get(index) {
                Some(SlotMeta::Vacant { next_free_index }) => *next_free_index,
                Some(SlotMeta::Reserved) => panic!(
                    "free stack of pool of {}-byte blocks links to reserved slot {index}",
                    self.block_size()
                ),
                None => panic!(
                    "free stack of pool of {}-byte blocks links to out-of-bounds slot {index}",
                    self.block_size()
                ),
            };

            visited = visited.wrapping_add(1);
        }

        assert_eq!(
            visited,
            self.free_count(),
            "free stack of pool of {}-byte blocks has {visited} entries but {} blocks are free",
            self.block_size(),
            self.free_count()
        );
    }
}

impl fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPool")
            .field("block_size", &self.block_size())
            .field("block_count", &self.block_count())
            .field("free_count", &self.free_count())
            .field("overflow_guard", &self.has_overflow_guard())
            .field("address_range", &self.address_range())
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl Drop for BlockPool {
    fn drop(&mut self) {
        let reserved_count = self.reserved_count;

        // SAFETY: The storage was allocated in the ctor with this exact layout and is not
        // deallocated anywhere else.
        unsafe {
            dealloc(self.storage.as_ptr(), self.layout.storage());
        }

        // We free the memory first so a failed check does not also leak the storage.
        // If we are already panicking, a second panic would only obscure the original one.
        if self.drop_policy == DropPolicy::MustNotDropReserved && !thread::panicking() {
            assert!(
                reserved_count == 0,
                "dropped a block pool with {reserved_count} reserved blocks - this is forbidden by DropPolicy::MustNotDropReserved"
            );
        }
    }
}

// SAFETY: The raw storage pointer is exclusively owned by the pool and carries no thread
// affinity, so the pool can move between threads. It is not Sync because bookkeeping
// mutations are not synchronized.
unsafe impl Send for BlockPool {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::collections::HashSet;
    use std::fmt::Debug;
    use std::sync::Arc;
    use std::{ptr, slice};

    use new_zealand::nz;
    use parking_lot::Mutex;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::guard::GUARD_LEN;

    assert_impl_all!(BlockPool: Send, Debug);
    assert_not_impl_any!(BlockPool: Sync);

    const TEST_BLOCK_SIZE: usize = 4;
    const TEST_BLOCK_COUNT: usize = 10;

    fn test_pool() -> BlockPool {
        BlockPool::new(
            NonZero::new(TEST_BLOCK_SIZE).unwrap(),
            NonZero::new(TEST_BLOCK_COUNT).unwrap(),
        )
    }

    fn block_bytes<'a>(block: NonNull<u8>, len: usize) -> &'a [u8] {
        unsafe { slice::from_raw_parts(block.as_ptr(), len) }
    }

    #[test]
    fn smoke_test() {
        let mut pool = BlockPool::new(nz!(16), nz!(3));

        let a = pool.acquire(false).unwrap();
        let b = pool.acquire(false).unwrap();
        let c = pool.acquire(false).unwrap();

        unsafe {
            a.as_ptr().write(1);
            b.as_ptr().write(2);
            c.as_ptr().write(3);
        }

        assert!(pool.is_full());
        assert_eq!(pool.reserved_count(), 3);

        pool.release(b.as_ptr());

        assert_eq!(pool.free_count(), 1);

        let d = pool.acquire(false).unwrap();

        unsafe {
            assert_eq!(a.as_ptr().read(), 1);
            assert_eq!(c.as_ptr().read(), 3);
        }

        assert_eq!(d, b);
        assert!(pool.is_full());
    }

    #[test]
    fn all_blocks_free_after_creation() {
        let pool = test_pool();

        assert_eq!(pool.free_count(), TEST_BLOCK_COUNT);
        assert_eq!(pool.block_count(), TEST_BLOCK_COUNT);
        assert!(pool.is_empty());
        assert!(!pool.is_full());
    }

    #[test]
    fn block_size_is_as_configured() {
        let pool = test_pool();

        assert_eq!(pool.block_size(), TEST_BLOCK_SIZE);
    }

    #[test]
    fn acquire_until_exhausted() {
        let mut pool = test_pool();

        let blocks = (0..TEST_BLOCK_COUNT)
            .map(|_| pool.acquire(false).unwrap())
            .collect::<HashSet<_>>();

        assert_eq!(blocks.len(), TEST_BLOCK_COUNT);
        assert_eq!(pool.free_count(), 0);
        assert!(pool.acquire(false).is_none());
        assert!(pool.acquire(true).is_none());
    }

    #[test]
    fn blocks_are_aligned_and_disjoint() {
        let mut pool = BlockPool::new(nz!(20), nz!(5));

        let mut addresses = (0..5)
            .map(|_| pool.acquire(false).unwrap().as_ptr().addr())
            .collect::<Vec<_>>();
        addresses.sort_unstable();

        for address in &addresses {
            assert_eq!(address % 16, 0);
        }

        for pair in addresses.windows(2) {
            assert!(pair[1] - pair[0] >= 20 + GUARD_LEN);
        }
    }

    #[test]
    fn release_makes_block_available_again() {
        let mut pool = test_pool();

        let block = pool.acquire(false).unwrap();
        pool.release(block.as_ptr());

        assert_eq!(pool.free_count(), TEST_BLOCK_COUNT);
    }

    #[test]
    fn release_then_acquire_reuses_released_block() {
        let mut pool = test_pool();

        let _a = pool.acquire(false).unwrap();
        let b = pool.acquire(false).unwrap();
        let _c = pool.acquire(false).unwrap();

        pool.release(b.as_ptr());

        assert_eq!(pool.acquire(false), Some(b));
    }

    #[test]
    fn release_of_full_pool_block_allows_acquire() {
        let mut pool = test_pool();

        let blocks = (0..TEST_BLOCK_COUNT)
            .map(|_| pool.acquire(false).unwrap())
            .collect::<Vec<_>>();

        assert!(pool.acquire(false).is_none());

        pool.release(blocks[3].as_ptr());

        assert_eq!(pool.acquire(false), Some(blocks[3]));
    }

    #[test]
    fn release_unknown_address_is_noop() {
        let mut pool = test_pool();
        _ = pool.acquire(false).unwrap();

        let local = [0_u8; 10];
        pool.release(local.as_ptr());

        assert_eq!(pool.free_count(), TEST_BLOCK_COUNT - 1);
    }

    #[test]
    fn release_null_is_noop() {
        let mut pool = test_pool();
        _ = pool.acquire(false).unwrap();

        pool.release(ptr::null());

        assert_eq!(pool.free_count(), TEST_BLOCK_COUNT - 1);
    }

    #[test]
    fn release_interior_address_is_noop() {
        let mut pool = test_pool();
        let block = pool.acquire(false).unwrap();

        pool.release(unsafe { block.as_ptr().add(1) });

        assert_eq!(pool.free_count(), TEST_BLOCK_COUNT - 1);
    }

    #[test]
    fn double_release_is_noop() {
        let mut pool = test_pool();
        let a = pool.acquire(false).unwrap();
        let _b = pool.acquire(false).unwrap();

        pool.release(a.as_ptr());
        pool.release(a.as_ptr());

        assert_eq!(pool.free_count(), TEST_BLOCK_COUNT - 1);
    }

    #[test]
    fn release_of_never_acquired_block_is_noop() {
        let mut pool = test_pool();
        let a = pool.acquire(false).unwrap();

        // The next block in storage has never been handed out.
        let neighbor = unsafe { a.as_ptr().add(pool.layout.stride()) };
        assert!(pool.owns(neighbor));

        pool.release(neighbor);

        assert_eq!(pool.free_count(), TEST_BLOCK_COUNT - 1);
    }

    #[test]
    fn acquire_cleared_zeroes_previously_used_block() {
        let mut pool = test_pool();

        let blocks = (0..TEST_BLOCK_COUNT)
            .map(|_| pool.acquire(false).unwrap())
            .collect::<Vec<_>>();

        for block in &blocks {
            unsafe {
                block.as_ptr().write_bytes(1, TEST_BLOCK_SIZE);
            }
        }

        for block in &blocks {
            pool.release(block.as_ptr());
        }

        assert_eq!(pool.free_count(), TEST_BLOCK_COUNT);

        let block = pool.acquire(true).unwrap();

        assert_eq!(block_bytes(block, TEST_BLOCK_SIZE), [0; TEST_BLOCK_SIZE]);
    }

    #[test]
    fn acquire_uncleared_fresh_blocks_read_as_zero() {
        let mut pool = test_pool();

        let blocks = (0..TEST_BLOCK_COUNT)
            .map(|_| pool.acquire(false).unwrap())
            .collect::<Vec<_>>();

        for block in &blocks {
            assert_eq!(block_bytes(*block, TEST_BLOCK_SIZE), [0; TEST_BLOCK_SIZE]);
        }
    }

    #[test]
    fn acquire_uncleared_keeps_previous_contents() {
        let mut pool = test_pool();

        let block = pool.acquire(false).unwrap();
        unsafe {
            block.as_ptr().write_bytes(7, TEST_BLOCK_SIZE);
        }
        pool.release(block.as_ptr());

        let block = pool.acquire(false).unwrap();

        assert_eq!(block_bytes(block, TEST_BLOCK_SIZE), [7; TEST_BLOCK_SIZE]);
    }

    #[test]
    fn acquire_cleared_leaves_guard_untouched() {
        let mut pool = test_pool();

        for _ in 0..TEST_BLOCK_COUNT {
            _ = pool.acquire(true).unwrap();
        }

        assert!(!pool.has_overflow());
    }

    #[test]
    fn written_memory_reads_back() {
        let mut pool = test_pool();

        let block = pool.acquire(true).unwrap();
        unsafe {
            block.as_ptr().write_bytes(1, TEST_BLOCK_SIZE);
        }

        assert_eq!(block_bytes(block, TEST_BLOCK_SIZE), [1; TEST_BLOCK_SIZE]);
        assert!(!pool.has_overflow());
    }

    #[test]
    fn write_past_block_end_is_detected() {
        let mut pool = test_pool();

        let block = pool.acquire(false).unwrap();

        unsafe {
            block.as_ptr().write_bytes(1, TEST_BLOCK_SIZE + 1);
        }

        assert!(pool.has_overflow());
        assert_eq!(pool.overflowed_blocks(), 1);
    }

    #[test]
    fn overflow_stays_detected_after_release() {
        let mut pool = test_pool();

        let block = pool.acquire(false).unwrap();

        unsafe {
            block.as_ptr().add(TEST_BLOCK_SIZE + GUARD_LEN - 1).write(0);
        }

        pool.release(block.as_ptr());

        assert!(pool.has_overflow());
    }

    #[test]
    fn pool_without_guard_never_reports_overflow() {
        let mut pool = BlockPool::builder()
            .block_size(nz!(16))
            .block_count(nz!(2))
            .overflow_guard(false)
            .build()
            .unwrap();

        let block = pool.acquire(false).unwrap();

        // Without a guard, the first byte past the payload is the next block.
        unsafe {
            block.as_ptr().write_bytes(1, 17);
        }

        assert!(!pool.has_overflow());
        assert_eq!(pool.overflowed_blocks(), 0);
    }

    #[test]
    fn owns_payload_addresses_only() {
        let mut pool = test_pool();
        let block = pool.acquire(false).unwrap();

        assert!(pool.owns(block.as_ptr()));
        assert!(pool.owns(unsafe { block.as_ptr().add(TEST_BLOCK_SIZE - 1) }));

        // Guard region.
        assert!(!pool.owns(unsafe { block.as_ptr().add(TEST_BLOCK_SIZE) }));

        let local = 0_u8;
        assert!(!pool.owns(&raw const local));
        assert!(!pool.owns(ptr::null()));
    }

    #[test]
    fn owns_does_not_depend_on_reservation() {
        let mut pool = test_pool();
        let block = pool.acquire(false).unwrap();

        pool.release(block.as_ptr());

        assert!(pool.owns(block.as_ptr()));
    }

    #[test]
    fn address_range_covers_all_blocks() {
        let mut pool = test_pool();
        let range = pool.address_range();

        for _ in 0..TEST_BLOCK_COUNT {
            let address = pool.acquire(false).unwrap().as_ptr().addr();
            assert!(range.contains(&address));
        }

        assert!(!pool.owns(ptr::without_provenance(range.end)));
    }

    #[test]
    fn separate_pools_do_not_own_each_other() {
        let mut a = test_pool();
        let mut b = test_pool();

        let block_a = a.acquire(false).unwrap();
        let block_b = b.acquire(false).unwrap();

        assert!(!a.owns(block_b.as_ptr()));
        assert!(!b.owns(block_a.as_ptr()));

        a.release(block_b.as_ptr());
        assert_eq!(a.free_count(), TEST_BLOCK_COUNT - 1);
        assert_eq!(b.free_count(), TEST_BLOCK_COUNT - 1);
    }

    #[test]
    fn debug_output_names_geometry() {
        let pool = test_pool();
        let output = format!("{pool:?}");

        assert!(output.contains("BlockPool"));
        assert!(output.contains("block_size: 4"));
        assert!(output.contains("free_count: 10"));
    }

    #[test]
    fn multithreaded_via_mutex() {
        let pool = Arc::new(Mutex::new(test_pool()));

        let handles = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut pool = pool.lock();
                        let block = pool.acquire(true).unwrap();
                        pool.release(block.as_ptr());
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.lock().free_count(), TEST_BLOCK_COUNT);
    }

    #[test]
    #[should_panic]
    fn drop_reserved_with_forbidding_policy_panics() {
        let mut pool = BlockPool::builder()
            .block_size(nz!(8))
            .block_count(nz!(2))
            .drop_policy(DropPolicy::MustNotDropReserved)
            .build()
            .unwrap();

        _ = pool.acquire(false).unwrap();
    }

    #[test]
    fn drop_empty_with_forbidding_policy_ok() {
        let mut pool = BlockPool::builder()
            .block_size(nz!(8))
            .block_count(nz!(2))
            .drop_policy(DropPolicy::MustNotDropReserved)
            .build()
            .unwrap();

        let block = pool.acquire(false).unwrap();
        pool.release(block.as_ptr());

        drop(pool);
    }

    #[test]
    fn drop_reserved_with_default_policy_ok() {
        let mut pool = test_pool();
        _ = pool.acquire(false).unwrap();

        drop(pool);
    }

    #[test]
    #[should_panic]
    fn oversized_pool_panics() {
        drop(BlockPool::new(NonZero::new(usize::MAX).unwrap(), nz!(2)));
    }
}
