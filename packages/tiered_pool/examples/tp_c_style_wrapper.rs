//! A process-wide allocator with a C-style `alloc`/`free` surface:
//!
//! * The tier configuration is supplied once, at first use.
//! * A single mutex serializes every call, as the allocator itself is not thread-safe.
//! * Failures are signaled with null, and freeing null or unknown pointers is harmless.

use std::ptr;
use std::sync::LazyLock;
use std::thread;

use parking_lot::Mutex;
use tiered_pool::TieredAllocator;

static ALLOCATOR: LazyLock<Mutex<TieredAllocator>> = LazyLock::new(|| {
    Mutex::new(
        TieredAllocator::with_default_tiers().expect("the default tiers always fit in memory"),
    )
});

/// Allocates a region of at least `size` bytes, zeroed if `clear_region` is set.
/// Returns null if no tier can serve the request.
fn em_alloc(size: usize, clear_region: bool) -> *mut u8 {
    ALLOCATOR
        .lock()
        .alloc(size, clear_region)
        .map_or(ptr::null_mut(), |block| block.as_ptr())
}

/// Makes a previously allocated region available again.
fn em_free(ptr: *mut u8) {
    ALLOCATOR.lock().free(ptr);
}

fn main() {
    let handles = (0..4_u8)
        .map(|worker| {
            thread::spawn(move || {
                let region = em_alloc(4000, true);
                assert!(!region.is_null());

                // SAFETY: The region is at least 4000 bytes long and reserved for this thread.
                unsafe {
                    region.write_bytes(worker, 4000);
                }

                em_free(region);
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        handle.join().unwrap();
    }

    // Too large for any tier.
    assert!(em_alloc(1 << 20, false).is_null());

    // Both of these are ignored.
    em_free(ptr::null_mut());
    em_free(em_alloc(16, false).wrapping_add(1));

    let allocator = ALLOCATOR.lock();
    println!(
        "Free blocks per tier: {:?}",
        allocator
            .pools()
            .iter()
            .map(|pool| (pool.block_size(), pool.free_count()))
            .collect::<Vec<_>>()
    );
    println!("Overflow detected: {}", allocator.has_overflow());
}
