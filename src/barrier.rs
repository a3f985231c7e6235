//! Reusable POSIX barriers for a fixed number of threads.
use core::cell::UnsafeCell;
use core::ffi::c_uint;
use core::mem;
use core::ptr;

use crate::error::{Error, Result, BARRIER_SERIAL_THREAD};
use crate::utils::try_box_zeroed;

/// Heap-pinned `pthread_barrier_t` together with the party count it was created for.
struct RawBarrier {
    inner: UnsafeCell<libc::pthread_barrier_t>,
    parties: c_uint,
}

// SAFETY: `pthread_barrier_t` operations are thread-safe, all access goes through the
// `pthread_barrier_*` functions. `parties` is only written before the barrier is shared.
unsafe impl Sync for RawBarrier {}

impl RawBarrier {
    #[inline]
    fn as_ptr(&self) -> *mut libc::pthread_barrier_t {
        self.inner.get()
    }
}

/// An opaque, word-sized slot that is either uninitialized or bound to one OS barrier.
///
/// The barrier releases its waiters once `parties` threads have called [`wait`] and then
/// starts counting the next cycle. A zeroed handle is uninitialized.
///
/// [`destroy`] must not be called while any thread is blocked in [`wait`]. The OS leaves that
/// case undefined and the handle does not detect it.
///
/// [`wait`]: Self::wait
/// [`destroy`]: Self::destroy
#[repr(transparent)]
pub struct BarrierHandle {
    resource: Option<Box<RawBarrier>>,
}

const _: () = assert!(mem::size_of::<BarrierHandle>() == mem::size_of::<usize>());

impl BarrierHandle {
    /// Creates a new uninitialized handle.
    #[inline]
    pub const fn new() -> Self {
        Self { resource: None }
    }

    /// Returns `true` if the handle is bound to an OS barrier.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.resource.is_some()
    }

    /// Returns the party count the barrier was created for.
    pub fn parties(&self) -> Result<c_uint> {
        self.bound().map(|barrier| barrier.parties)
    }

    /// Binds the handle to a new barrier for `parties` threads.
    ///
    /// `parties` must be at least 1, otherwise the OS rejects it with `EINVAL`. On failure the
    /// handle stays uninitialized.
    pub fn init(&mut self, parties: c_uint) -> Result<()> {
        if self.resource.is_some() {
            tracing::debug!(parties, "barrier init on bound handle");
            return Err(Error::DoubleInit);
        }

        // SAFETY: A zeroed `RawBarrier` is a valid value and is not zero-sized.
        let mut barrier = unsafe { try_box_zeroed::<RawBarrier>() }?;
        barrier.parties = parties;

        // SAFETY: `barrier` is heap allocated and stays at this address until it is freed.
        let res = unsafe { libc::pthread_barrier_init(barrier.as_ptr(), ptr::null(), parties) };
        if res != 0 {
            tracing::warn!(parties, code = res, "pthread_barrier_init failed");
            return Err(Error::Os(res));
        }

        self.resource = Some(barrier);
        tracing::trace!(parties, "barrier bound");
        Ok(())
    }

    /// Blocks until `parties` threads are waiting, then releases all of them.
    ///
    /// Exactly one thread of every cycle receives a result with [`is_leader`] set.
    ///
    /// [`is_leader`]: BarrierWaitResult::is_leader
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        let barrier = self.bound()?;

        // SAFETY: `barrier` is initialized.
        match unsafe { libc::pthread_barrier_wait(barrier.as_ptr()) } {
            0 => Ok(BarrierWaitResult { is_leader: false }),
            BARRIER_SERIAL_THREAD => Ok(BarrierWaitResult { is_leader: true }),
            code => {
                tracing::warn!(code, "pthread_barrier_wait failed");
                Err(Error::Os(code))
            }
        }
    }

    /// Destroys the barrier and resets the handle to uninitialized.
    ///
    /// The memory is freed and the handle reset even if `pthread_barrier_destroy` reports an
    /// error, which is still returned.
    pub fn destroy(&mut self) -> Result<()> {
        let Some(barrier) = self.resource.take() else {
            tracing::debug!("barrier destroy on uninitialized handle");
            return Err(Error::UninitializedAccess);
        };

        // SAFETY: `barrier` is initialized and the caller guarantees it has no waiters.
        let res = unsafe { libc::pthread_barrier_destroy(barrier.as_ptr()) };
        drop(barrier);

        tracing::trace!(code = res, "barrier destroyed");
        match res {
            0 => Ok(()),
            code => Err(Error::Os(code)),
        }
    }

    #[inline]
    fn bound(&self) -> Result<&RawBarrier> {
        match &self.resource {
            Some(barrier) => Ok(barrier),
            None => {
                tracing::debug!("barrier access on uninitialized handle");
                Err(Error::UninitializedAccess)
            }
        }
    }
}

impl Default for BarrierHandle {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BarrierHandle {
    fn drop(&mut self) {
        if self.is_bound() {
            let _ = self.destroy();
        }
    }
}

impl core::fmt::Debug for BarrierHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BarrierHandle")
            .field("parties", &self.resource.as_ref().map(|b| b.parties))
            .finish()
    }
}

/// The outcome of a successful barrier wait.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
}

impl BarrierWaitResult {
    /// Returns `true` for exactly one thread of every cycle.
    #[inline]
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

/// A reusable barrier that is bound for its entire lifetime.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use classic_sync::Barrier;
///
/// let barrier = Arc::new(Barrier::new(3).unwrap());
///
/// let threads: Vec<_> = (0..3)
///     .map(|_| {
///         let barrier = barrier.clone();
///         thread::spawn(move || barrier.wait().unwrap().is_leader())
///     })
///     .collect();
///
/// let leaders = threads
///     .into_iter()
///     .map(|t| t.join().unwrap())
///     .filter(|&leader| leader)
///     .count();
/// assert_eq!(leaders, 1);
/// ```
#[derive(Debug)]
pub struct Barrier {
    handle: BarrierHandle,
    parties: c_uint,
}

impl Barrier {
    /// Creates a new `Barrier` that releases its waiters once `parties` threads arrived.
    pub fn new(parties: c_uint) -> Result<Self> {
        let mut handle = BarrierHandle::new();
        handle.init(parties)?;
        Ok(Self { handle, parties })
    }

    /// Returns the number of threads needed to release the barrier.
    #[inline]
    pub fn parties(&self) -> c_uint {
        self.parties
    }

    /// Waits until all parties arrived at the barrier.
    #[inline]
    pub fn wait(&self) -> Result<BarrierWaitResult> {
        self.handle.wait()
    }
}
