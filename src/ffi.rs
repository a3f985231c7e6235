//! C ABI for foreign runtimes.
//!
//! Every function returns `0` on success, one of the negative codes in [`crate::error`] for
//! a rejected handle state or a timeout, or a positive `errno` passed through from the OS.
//! [`classic_sync_barrier_wait`] additionally returns [`BARRIER_SERIAL_THREAD`] on one thread
//! per cycle.
//!
//! Handles are single machine words the caller zero-initializes and passes back by address.
//! A null handle pointer is rejected with `EINVAL`.
//!
//! # Safety
//!
//! For all functions:
//! * A non-null `handle` must point to a word that is either zero or was last written by one of
//!   these functions, and that is valid for the duration of the call.
//! * `init` and `destroy` must not run concurrently with any other call on the same handle.
//!
//! [`BARRIER_SERIAL_THREAD`]: crate::error::BARRIER_SERIAL_THREAD
use core::ffi::{c_int, c_uint};
use core::time::Duration;

use crate::barrier::BarrierHandle;
use crate::error::{result_code, Error, BARRIER_SERIAL_THREAD, SUCCESS};
use crate::semaphore::SemaphoreHandle;

#[inline]
unsafe fn with_ref<T>(handle: *const T, f: impl FnOnce(&T) -> c_int) -> c_int {
    match unsafe { handle.as_ref() } {
        Some(handle) => f(handle),
        None => libc::EINVAL,
    }
}

#[inline]
unsafe fn with_mut<T>(handle: *mut T, f: impl FnOnce(&mut T) -> c_int) -> c_int {
    match unsafe { handle.as_mut() } {
        Some(handle) => f(handle),
        None => libc::EINVAL,
    }
}

#[inline]
fn non_negative(value: c_int) -> Result<c_uint, Error> {
    c_uint::try_from(value).map_err(|_| Error::Os(libc::EINVAL))
}

/// Binds `handle` to a new semaphore with `initial_count` units.
///
/// # Safety
///
/// See the [module documentation](self).
#[no_mangle]
pub unsafe extern "C" fn classic_sync_semaphore_init(
    handle: *mut SemaphoreHandle,
    initial_count: c_int,
) -> c_int {
    unsafe {
        with_mut(handle, |handle| {
            result_code(non_negative(initial_count).and_then(|count| handle.init(count)))
        })
    }
}

/// Blocks until a unit of the semaphore is available and takes it.
///
/// # Safety
///
/// See the [module documentation](self).
#[no_mangle]
pub unsafe extern "C" fn classic_sync_semaphore_acquire(handle: *const SemaphoreHandle) -> c_int {
    unsafe { with_ref(handle, |handle| result_code(handle.acquire())) }
}

/// Returns a unit to the semaphore.
///
/// # Safety
///
/// See the [module documentation](self).
#[no_mangle]
pub unsafe extern "C" fn classic_sync_semaphore_release(handle: *const SemaphoreHandle) -> c_int {
    unsafe { with_ref(handle, |handle| result_code(handle.release())) }
}

/// Blocks until a unit is available or `nanos` nanoseconds have passed.
///
/// # Safety
///
/// See the [module documentation](self).
#[no_mangle]
pub unsafe extern "C" fn classic_sync_semaphore_acquire_timed(
    handle: *const SemaphoreHandle,
    nanos: i64,
) -> c_int {
    unsafe {
        with_ref(handle, |handle| {
            let res = match u64::try_from(nanos) {
                Ok(nanos) => handle.acquire_timeout(Duration::from_nanos(nanos)),
                Err(_) => Err(Error::Os(libc::EINVAL)),
            };
            result_code(res)
        })
    }
}

/// Destroys the semaphore and resets `handle` to zero.
///
/// # Safety
///
/// See the [module documentation](self). No thread may be blocked on the semaphore.
#[no_mangle]
pub unsafe extern "C" fn classic_sync_semaphore_destroy(handle: *mut SemaphoreHandle) -> c_int {
    unsafe { with_mut(handle, |handle| result_code(handle.destroy())) }
}

/// Binds `handle` to a new barrier for `parties` threads.
///
/// # Safety
///
/// See the [module documentation](self).
#[no_mangle]
pub unsafe extern "C" fn classic_sync_barrier_init(
    handle: *mut BarrierHandle,
    parties: c_int,
) -> c_int {
    unsafe {
        with_mut(handle, |handle| {
            result_code(non_negative(parties).and_then(|parties| handle.init(parties)))
        })
    }
}

/// Waits until all parties arrived at the barrier.
///
/// Returns [`BARRIER_SERIAL_THREAD`] on one released thread per cycle and `0` on the others.
///
/// # Safety
///
/// See the [module documentation](self).
#[no_mangle]
pub unsafe extern "C" fn classic_sync_barrier_wait(handle: *const BarrierHandle) -> c_int {
    unsafe {
        with_ref(handle, |handle| match handle.wait() {
            Ok(res) if res.is_leader() => BARRIER_SERIAL_THREAD,
            Ok(_) => SUCCESS,
            Err(err) => err.code(),
        })
    }
}

/// Destroys the barrier and resets `handle` to zero.
///
/// # Safety
///
/// See the [module documentation](self). No thread may be blocked on the barrier.
#[no_mangle]
pub unsafe extern "C" fn classic_sync_barrier_destroy(handle: *mut BarrierHandle) -> c_int {
    unsafe { with_mut(handle, |handle| result_code(handle.destroy())) }
}

#[cfg(test)]
mod tests {
    use core::ptr;

    use super::*;
    use crate::error::{ERR_DOUBLE_INIT, ERR_UNINITIALIZED};

    #[test]
    fn test_null_handle() {
        unsafe {
            assert_eq!(classic_sync_semaphore_init(ptr::null_mut(), 1), libc::EINVAL);
            assert_eq!(classic_sync_semaphore_acquire(ptr::null()), libc::EINVAL);
            assert_eq!(classic_sync_semaphore_release(ptr::null()), libc::EINVAL);
            assert_eq!(classic_sync_semaphore_acquire_timed(ptr::null(), 0), libc::EINVAL);
            assert_eq!(classic_sync_semaphore_destroy(ptr::null_mut()), libc::EINVAL);

            assert_eq!(classic_sync_barrier_init(ptr::null_mut(), 1), libc::EINVAL);
            assert_eq!(classic_sync_barrier_wait(ptr::null()), libc::EINVAL);
            assert_eq!(classic_sync_barrier_destroy(ptr::null_mut()), libc::EINVAL);
        }
    }

    #[test]
    fn test_negative_arguments() {
        let mut sem = SemaphoreHandle::new();
        let mut barrier = BarrierHandle::new();

        unsafe {
            assert_eq!(classic_sync_semaphore_init(&mut sem, -1), libc::EINVAL);
            assert!(!sem.is_bound());

            assert_eq!(classic_sync_semaphore_init(&mut sem, 0), SUCCESS);
            assert_eq!(classic_sync_semaphore_acquire_timed(&sem, -1), libc::EINVAL);

            assert_eq!(classic_sync_barrier_init(&mut barrier, -3), libc::EINVAL);
            assert!(!barrier.is_bound());
        }
    }

    #[test]
    fn test_state_codes() {
        let mut sem = SemaphoreHandle::new();
        let mut barrier = BarrierHandle::new();

        unsafe {
            assert_eq!(classic_sync_semaphore_release(&sem), ERR_UNINITIALIZED);
            assert_eq!(classic_sync_barrier_wait(&barrier), ERR_UNINITIALIZED);

            assert_eq!(classic_sync_semaphore_init(&mut sem, 1), SUCCESS);
            assert_eq!(classic_sync_semaphore_init(&mut sem, 1), ERR_DOUBLE_INIT);

            assert_eq!(classic_sync_barrier_init(&mut barrier, 1), SUCCESS);
            assert_eq!(classic_sync_barrier_init(&mut barrier, 1), ERR_DOUBLE_INIT);
            assert_eq!(classic_sync_barrier_wait(&barrier), BARRIER_SERIAL_THREAD);
        }
    }
}
