//! Process-private POSIX counting semaphores.
//!
//! [`SemaphoreHandle`] is the word-sized slot handed across the C boundary. [`Semaphore`] owns
//! a bound handle and hands out [`Permit`]s for Rust callers.
use core::cell::UnsafeCell;
use core::ffi::c_uint;
use core::mem;
use core::time::Duration;

use crate::error::{Error, Result};
use crate::utils::deadline::{deadline_after, realtime_now};
use crate::utils::{errno, try_box_zeroed};

// `sem_init` documents 0 as private to the threads of the calling process.
const PROCESS_PRIVATE: libc::c_int = 0;

/// Heap-pinned `sem_t`. Never moved after `sem_init`.
struct RawSemaphore {
    inner: UnsafeCell<libc::sem_t>,
}

// SAFETY: `sem_t` operations are thread-safe, all access goes through the `sem_*` functions.
unsafe impl Sync for RawSemaphore {}

impl RawSemaphore {
    #[inline]
    fn as_ptr(&self) -> *mut libc::sem_t {
        self.inner.get()
    }

    fn value(&self) -> Result<i32> {
        let mut value = 0;
        // SAFETY: `self` is initialized and `value` is valid for writes.
        if unsafe { libc::sem_getvalue(self.as_ptr(), &mut value) } != 0 {
            return Err(Error::Os(errno()));
        }

        Ok(value)
    }
}

/// An opaque, word-sized slot that is either uninitialized or bound to one OS semaphore.
///
/// A zeroed handle is uninitialized. [`init`] binds it, [`destroy`] unbinds it again. All
/// other operations take `&self` and may run concurrently from any number of threads.
///
/// Dropping a bound handle destroys the semaphore. No thread may be blocked on it at that
/// point, which the borrow checker guarantees for Rust callers.
///
/// # Examples
///
/// ```
/// use classic_sync::{Error, SemaphoreHandle};
///
/// let mut handle = SemaphoreHandle::new();
/// assert_eq!(handle.acquire(), Err(Error::UninitializedAccess));
///
/// handle.init(1).unwrap();
/// handle.acquire().unwrap();
/// handle.release().unwrap();
///
/// handle.destroy().unwrap();
/// assert!(!handle.is_bound());
/// ```
///
/// [`init`]: Self::init
/// [`destroy`]: Self::destroy
#[repr(transparent)]
pub struct SemaphoreHandle {
    resource: Option<Box<RawSemaphore>>,
}

const _: () = assert!(mem::size_of::<SemaphoreHandle>() == mem::size_of::<usize>());

impl SemaphoreHandle {
    /// Creates a new uninitialized handle.
    #[inline]
    pub const fn new() -> Self {
        Self { resource: None }
    }

    /// Returns `true` if the handle is bound to an OS semaphore.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.resource.is_some()
    }

    /// Binds the handle to a new semaphore holding `count` units.
    ///
    /// Fails with [`Error::DoubleInit`] if the handle is already bound, leaving the existing
    /// semaphore untouched. If the OS refuses the semaphore the handle stays uninitialized.
    pub fn init(&mut self, count: c_uint) -> Result<()> {
        if self.resource.is_some() {
            tracing::debug!(count, "semaphore init on bound handle");
            return Err(Error::DoubleInit);
        }

        // SAFETY: A zeroed `sem_t` is a valid, if not yet usable, value and is not zero-sized.
        let sem = unsafe { try_box_zeroed::<RawSemaphore>() }?;

        // SAFETY: `sem` is heap allocated and stays at this address until it is freed.
        let res = unsafe { libc::sem_init(sem.as_ptr(), PROCESS_PRIVATE, count) };
        if res != 0 {
            let code = errno();
            tracing::warn!(count, code, "sem_init failed");
            // `sem` was never initialized, freeing it is all that is needed.
            return Err(Error::Os(code));
        }

        self.resource = Some(sem);
        tracing::trace!(count, "semaphore bound");
        Ok(())
    }

    /// Blocks until a unit is available and takes it.
    ///
    /// Interrupted waits are restarted.
    pub fn acquire(&self) -> Result<()> {
        let sem = self.bound()?;

        loop {
            // SAFETY: `sem` is initialized.
            if unsafe { libc::sem_wait(sem.as_ptr()) } == 0 {
                return Ok(());
            }

            match errno() {
                libc::EINTR => continue,
                code => return Err(Error::Os(code)),
            }
        }
    }

    /// Blocks until a unit is available or `timeout` has elapsed.
    ///
    /// Returns [`Error::TimedOut`] if the deadline passed first. The deadline is absolute, so
    /// interrupted waits are restarted without extending it.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        let sem = self.bound()?;
        let deadline = deadline_after(realtime_now()?, timeout);

        loop {
            // SAFETY: `sem` is initialized and `deadline` is a normalized timespec.
            if unsafe { libc::sem_timedwait(sem.as_ptr(), &deadline) } == 0 {
                return Ok(());
            }

            match errno() {
                libc::EINTR => continue,
                libc::ETIMEDOUT => return Err(Error::TimedOut),
                code => return Err(Error::Os(code)),
            }
        }
    }

    /// Like [`acquire_timeout`] with the timeout given in nanoseconds.
    ///
    /// [`acquire_timeout`]: Self::acquire_timeout
    #[inline]
    pub fn acquire_timed(&self, nanos: u64) -> Result<()> {
        self.acquire_timeout(Duration::from_nanos(nanos))
    }

    /// Takes a unit if one is available without blocking. Returns `false` if none was.
    pub fn try_acquire(&self) -> Result<bool> {
        let sem = self.bound()?;

        loop {
            // SAFETY: `sem` is initialized.
            if unsafe { libc::sem_trywait(sem.as_ptr()) } == 0 {
                return Ok(true);
            }

            match errno() {
                libc::EINTR => continue,
                libc::EAGAIN => return Ok(false),
                code => return Err(Error::Os(code)),
            }
        }
    }

    /// Returns a unit to the semaphore, waking one blocked acquirer if there is any.
    ///
    /// Fails with `EOVERFLOW` if the count is already at `SEM_VALUE_MAX`.
    pub fn release(&self) -> Result<()> {
        let sem = self.bound()?;

        // SAFETY: `sem` is initialized.
        if unsafe { libc::sem_post(sem.as_ptr()) } != 0 {
            let code = errno();
            tracing::warn!(code, "sem_post failed");
            return Err(Error::Os(code));
        }

        Ok(())
    }

    /// Returns the current count of the semaphore.
    ///
    /// The value may be stale by the time it is returned.
    pub fn value(&self) -> Result<i32> {
        self.bound()?.value()
    }

    /// Destroys the semaphore and resets the handle to uninitialized.
    ///
    /// The memory is freed and the handle reset even if `sem_destroy` reports an error, which
    /// is still returned. No thread may be blocked in [`acquire`] while this runs.
    ///
    /// [`acquire`]: Self::acquire
    pub fn destroy(&mut self) -> Result<()> {
        let Some(sem) = self.resource.take() else {
            tracing::debug!("semaphore destroy on uninitialized handle");
            return Err(Error::UninitializedAccess);
        };

        // SAFETY: `sem` is initialized and, per the contract above, has no waiters.
        let res = match unsafe { libc::sem_destroy(sem.as_ptr()) } {
            0 => Ok(()),
            _ => Err(Error::Os(errno())),
        };
        drop(sem);

        tracing::trace!(ok = res.is_ok(), "semaphore destroyed");
        res
    }

    /// Returns the bound semaphore or [`Error::UninitializedAccess`].
    #[inline]
    fn bound(&self) -> Result<&RawSemaphore> {
        match &self.resource {
            Some(sem) => Ok(sem),
            None => {
                tracing::debug!("semaphore access on uninitialized handle");
                Err(Error::UninitializedAccess)
            }
        }
    }
}

impl Default for SemaphoreHandle {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SemaphoreHandle {
    fn drop(&mut self) {
        if self.is_bound() {
            let _ = self.destroy();
        }
    }
}

impl core::fmt::Debug for SemaphoreHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("SemaphoreHandle");
        match self.resource.as_deref().map(RawSemaphore::value) {
            Some(Ok(value)) => s.field("value", &value),
            Some(Err(err)) => s.field("value", &err),
            None => s.field("value", &"<uninitialized>"),
        };
        s.finish()
    }
}

/// A counting semaphore that is bound for its entire lifetime.
///
/// Acquired units are handed out as [`Permit`]s which return the unit when dropped.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use classic_sync::Semaphore;
///
/// let semaphore = Arc::new(Semaphore::new(0).unwrap());
///
/// let handle = semaphore.clone();
/// let thread = thread::spawn(move || {
///     handle.acquire().unwrap().forget();
/// });
///
/// semaphore.release().unwrap();
/// thread.join().unwrap();
/// assert_eq!(semaphore.available_permits().unwrap(), 0);
/// ```
#[derive(Debug)]
pub struct Semaphore {
    handle: SemaphoreHandle,
}

impl Semaphore {
    /// Creates a new `Semaphore` with the starting number of permits.
    pub fn new(permits: c_uint) -> Result<Self> {
        let mut handle = SemaphoreHandle::new();
        handle.init(permits)?;
        Ok(Self { handle })
    }

    /// Returns the number of permits currently available.
    #[inline]
    pub fn available_permits(&self) -> Result<usize> {
        // Linux never reports waiters as a negative count, but POSIX allows it.
        self.handle
            .value()
            .map(|value| usize::try_from(value).unwrap_or(0))
    }

    /// Adds a single permit, waking one waiting thread if there is any.
    #[inline]
    pub fn release(&self) -> Result<()> {
        self.handle.release()
    }

    /// Blocks until a permit is available.
    #[inline]
    pub fn acquire(&self) -> Result<Permit<'_>> {
        self.handle.acquire()?;
        Ok(Permit { semaphore: self })
    }

    /// Blocks until a permit is available or `timeout` has elapsed.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use classic_sync::{Error, Semaphore};
    ///
    /// let semaphore = Semaphore::new(0).unwrap();
    /// let res = semaphore.acquire_timeout(Duration::from_millis(10));
    /// assert_eq!(res.unwrap_err(), Error::TimedOut);
    /// ```
    #[inline]
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Permit<'_>> {
        self.handle.acquire_timeout(timeout)?;
        Ok(Permit { semaphore: self })
    }

    /// Tries to acquire a permit without blocking. Returns `None` if no permit is available.
    ///
    /// # Examples
    ///
    /// ```
    /// use classic_sync::Semaphore;
    ///
    /// let semaphore = Semaphore::new(1).unwrap();
    ///
    /// let permit = semaphore.try_acquire().unwrap().unwrap();
    /// assert!(semaphore.try_acquire().unwrap().is_none());
    ///
    /// drop(permit);
    /// assert!(semaphore.try_acquire().unwrap().is_some());
    /// ```
    pub fn try_acquire(&self) -> Result<Option<Permit<'_>>> {
        if self.handle.try_acquire()? {
            Ok(Some(Permit { semaphore: self }))
        } else {
            Ok(None)
        }
    }
}

/// A permit acquired from a [`Semaphore`].
///
/// The permit is returned to the owning semaphore when dropped unless `forget` is called.
///
/// [`forget`]: Self::forget
#[derive(Debug)]
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl<'a> Permit<'a> {
    /// Drops the permit without returning it back to the owning [`Semaphore`].
    #[inline]
    pub fn forget(self) {
        mem::forget(self);
    }
}

impl<'a> Drop for Permit<'a> {
    fn drop(&mut self) {
        if let Err(err) = self.semaphore.release() {
            tracing::warn!(%err, "failed to return permit to semaphore");
        }
    }
}
