use std::alloc::Layout;
use std::num::NonZero;

use crate::guard::GUARD_LEN;
use crate::{Error, Result};

/// Alignment of every block payload. This is the largest fundamental alignment on the
/// platforms we target, so any value that fits in a block can be placed at its start.
pub(crate) const BLOCK_ALIGNMENT: usize = 16;

/// Bookkeeping for one block of a [`BlockPool`][crate::BlockPool].
///
/// Vacant slots form an intrusive stack of free indexes: each vacant slot stores the index of
/// the next vacant slot, with an index equal to the block count terminating the stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum SlotMeta {
    /// The block has been handed out and not yet released.
    Reserved,

    /// The block is available for the next acquire.
    Vacant { next_free_index: usize },
}

/// Where an address falls within the storage of a pool, relative to the block grid.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SlotPosition {
    /// Index of the block whose stride contains the address.
    pub(crate) index: usize,

    /// Offset of the address from the start of that block's payload.
    pub(crate) offset_in_block: usize,
}

/// Precomputed memory layout of a pool: where each block payload and guard region lives
/// inside the single contiguous storage allocation.
///
/// ```text
/// | payload 0 | guard 0 | pad | payload 1 | guard 1 | pad | ... |
/// |<-------- stride -------->|
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct PoolLayout {
    block_size: NonZero<usize>,
    block_count: NonZero<usize>,

    /// Zero when overflow detection is disabled.
    guard_len: usize,

    /// Distance in bytes between the starts of two consecutive payloads.
    stride: usize,

    /// Layout of the whole storage allocation.
    storage: Layout,
}

impl PoolLayout {
    /// Calculates the layout of a pool with the given geometry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LayoutTooLarge`] if the storage would not fit in a single allocation.
    pub(crate) fn calculate(
        block_size: NonZero<usize>,
        block_count: NonZero<usize>,
        overflow_guard: bool,
    ) -> Result<Self> {
        let too_large = || Error::LayoutTooLarge {
            block_size: block_size.get(),
            block_count: block_count.get(),
        };

        let guard_len = if overflow_guard { GUARD_LEN } else { 0 };

        let block_with_guard = block_size
            .get()
            .checked_add(guard_len)
            .ok_or_else(too_large)?;

        // Padding every block up to the alignment keeps all payloads aligned.
        let stride = Layout::from_size_align(block_with_guard, BLOCK_ALIGNMENT)
            .map_err(|_| too_large())?
            .pad_to_align()
            .size();

        let total_size = stride
            .checked_mul(block_count.get())
            .ok_or_else(too_large)?;

        let storage =
            Layout::from_size_align(total_size, BLOCK_ALIGNMENT).map_err(|_| too_large())?;

        Ok(Self {
            block_size,
            block_count,
            guard_len,
            stride,
            storage,
        })
    }

    pub(crate) fn block_size(&self) -> NonZero<usize> {
        self.block_size
    }

    pub(crate) fn block_count(&self) -> NonZero<usize> {
        self.block_count
    }

    pub(crate) fn guard_len(&self) -> usize {
        self.guard_len
    }

    pub(crate) fn stride(&self) -> usize {
        self.stride
    }

    pub(crate) fn storage(&self) -> Layout {
        self.storage
    }

    /// Offset of the payload of block `index` from the start of the storage.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub(crate) fn payload_offset(&self, index: usize) -> usize {
        assert!(
            index < self.block_count.get(),
            "block {index} index out of bounds in pool of {} blocks",
            self.block_count
        );

        // Cannot overflow because we checked in `calculate()` that all blocks fit in the storage.
        index.wrapping_mul(self.stride)
    }

    /// Offset of the guard region of block `index` from the start of the storage.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub(crate) fn guard_offset(&self, index: usize) -> usize {
        // Cannot overflow because the guard lies within the block's stride.
        self.payload_offset(index)
            .wrapping_add(self.block_size.get())
    }

    /// Maps an offset from the start of the storage to the block grid, or `None` if the
    /// offset lies past the end of the storage.
    pub(crate) fn position_of(&self, offset: usize) -> Option<SlotPosition> {
        if offset >= self.storage.size() {
            return None;
        }

        #[expect(
            clippy::integer_division,
            reason = "we want the index of the stride containing the offset"
        )]
        let index = offset / self.stride;

        Some(SlotPosition {
            index,
            // Cannot underflow because index * stride <= offset by construction.
            offset_in_block: offset.wrapping_sub(index.wrapping_mul(self.stride)),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn stride_includes_guard_and_padding() {
        let layout = PoolLayout::calculate(nz!(4), nz!(10), true).unwrap();

        // 4 payload bytes + 8 guard bytes, padded up to 16.
        assert_eq!(layout.stride(), 16);
        assert_eq!(layout.guard_len(), GUARD_LEN);
        assert_eq!(layout.storage().size(), 160);
        assert_eq!(layout.storage().align(), BLOCK_ALIGNMENT);
    }

    #[test]
    fn stride_without_guard_is_padded_payload() {
        let layout = PoolLayout::calculate(nz!(1024), nz!(2), false).unwrap();

        assert_eq!(layout.stride(), 1024);
        assert_eq!(layout.guard_len(), 0);
        assert_eq!(layout.storage().size(), 2048);
    }

    #[test]
    fn exact_multiple_of_alignment_still_gets_guard_space() {
        let layout = PoolLayout::calculate(nz!(32), nz!(1), true).unwrap();

        assert_eq!(layout.stride(), 48);
    }

    #[test]
    fn payload_and_guard_offsets() {
        let layout = PoolLayout::calculate(nz!(20), nz!(3), true).unwrap();

        // 20 + 8 = 28, padded to 32.
        assert_eq!(layout.payload_offset(0), 0);
        assert_eq!(layout.payload_offset(2), 64);
        assert_eq!(layout.guard_offset(0), 20);
        assert_eq!(layout.guard_offset(1), 52);
    }

    #[test]
    #[should_panic]
    fn payload_offset_out_of_bounds_panics() {
        let layout = PoolLayout::calculate(nz!(20), nz!(3), true).unwrap();

        _ = layout.payload_offset(3);
    }

    #[test]
    fn position_of_maps_to_block_grid() {
        let layout = PoolLayout::calculate(nz!(20), nz!(3), true).unwrap();

        assert_eq!(
            layout.position_of(0),
            Some(SlotPosition {
                index: 0,
                offset_in_block: 0
            })
        );
        assert_eq!(
            layout.position_of(37),
            Some(SlotPosition {
                index: 1,
                offset_in_block: 5
            })
        );
        assert_eq!(
            layout.position_of(95),
            Some(SlotPosition {
                index: 2,
                offset_in_block: 31
            })
        );
        assert_eq!(layout.position_of(96), None);
    }

    #[test]
    fn oversized_geometry_is_rejected() {
        let result = PoolLayout::calculate(NonZero::new(usize::MAX).unwrap(), nz!(1), true);
        assert!(matches!(result, Err(Error::LayoutTooLarge { .. })));

        let result = PoolLayout::calculate(
            nz!(1_048_576),
            NonZero::new(usize::MAX >> 4).unwrap(),
            false,
        );
        assert!(matches!(result, Err(Error::LayoutTooLarge { .. })));
    }
}
