//! The guard region that trails every block payload when overflow detection is enabled.
//!
//! The region is filled with a fixed pattern once, when the pool is created. Nothing in the
//! pool ever writes to it again, so any difference from the pattern means somebody wrote past
//! the end of a block payload.

use std::ptr::NonNull;
use std::slice;

/// Number of guard bytes following each payload.
pub(crate) const GUARD_LEN: usize = 8;

/// Value of every guard byte as established at pool creation.
pub(crate) const GUARD_PATTERN: u8 = 0xFD;

/// Writes the guard pattern to the `GUARD_LEN` bytes starting at `guard`.
///
/// # Safety
///
/// `guard` must be valid for writes of `GUARD_LEN` bytes.
pub(crate) unsafe fn establish(guard: NonNull<u8>) {
    // SAFETY: Forwarding the validity requirement to the caller.
    unsafe {
        guard.write_bytes(GUARD_PATTERN, GUARD_LEN);
    }
}

/// Whether the `GUARD_LEN` bytes starting at `guard` still hold the guard pattern.
///
/// # Safety
///
/// `guard` must be valid for reads of `GUARD_LEN` initialized bytes and no other thread may
/// be writing to them for the duration of the call.
#[must_use]
pub(crate) unsafe fn is_intact(guard: NonNull<u8>) -> bool {
    // SAFETY: Forwarding the validity and exclusivity requirements to the caller.
    let bytes = unsafe { slice::from_raw_parts(guard.as_ptr().cast_const(), GUARD_LEN) };

    bytes.iter().all(|&b| b == GUARD_PATTERN)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    reason = "test code indexes fixed-size arrays"
)]
mod tests {
    use super::*;

    #[test]
    fn established_guard_is_intact() {
        let mut region = [0_u8; GUARD_LEN];
        let guard = NonNull::from(&mut region).cast::<u8>();

        // SAFETY: The region is exactly GUARD_LEN bytes and exclusively ours.
        unsafe {
            establish(guard);
            assert!(is_intact(guard));
        }

        assert!(region.iter().all(|&b| b == GUARD_PATTERN));
    }

    #[test]
    fn any_changed_byte_breaks_the_guard() {
        for damaged in 0..GUARD_LEN {
            let mut region = [GUARD_PATTERN; GUARD_LEN];
            region[damaged] = 0;

            let guard = NonNull::from(&mut region).cast::<u8>();

            // SAFETY: The region is exactly GUARD_LEN bytes and exclusively ours.
            assert!(!unsafe { is_intact(guard) });
        }
    }

    #[test]
    fn zeroed_region_is_not_intact() {
        let mut region = [0_u8; GUARD_LEN];
        let guard = NonNull::from(&mut region).cast::<u8>();

        // SAFETY: The region is exactly GUARD_LEN bytes and exclusively ours.
        assert!(!unsafe { is_intact(guard) });
    }
}
