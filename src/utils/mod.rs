pub mod deadline;

use std::alloc::{self, Layout};

use crate::error::Error;

/// Returns the calling thread's current `errno`.
#[inline]
pub fn errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

/// Allocates a zeroed `T` on the heap, reporting exhaustion as `ENOMEM` instead of aborting.
///
/// # Safety
///
/// The all-zero bit pattern must be a valid `T`, and `T` must not be zero-sized.
pub unsafe fn try_box_zeroed<T>() -> Result<Box<T>, Error> {
    let layout = Layout::new::<T>();
    debug_assert_ne!(layout.size(), 0);

    let ptr = alloc::alloc_zeroed(layout).cast::<T>();
    if ptr.is_null() {
        return Err(Error::Os(libc::ENOMEM));
    }

    // SAFETY: `ptr` was allocated by the global allocator with the layout of `T` and holds a
    // valid zeroed `T`.
    Ok(Box::from_raw(ptr))
}

#[cfg(test)]
mod tests {
    use super::try_box_zeroed;

    #[test]
    fn test_try_box_zeroed() {
        let value = unsafe { try_box_zeroed::<[u64; 8]>() }.unwrap();
        assert_eq!(*value, [0; 8]);
    }
}
