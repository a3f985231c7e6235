//! Error type shared by [`SemaphoreHandle`] and [`BarrierHandle`], and its mapping onto the
//! numeric result convention of the C surface.
//!
//! [`SemaphoreHandle`]: crate::SemaphoreHandle
//! [`BarrierHandle`]: crate::BarrierHandle
use core::ffi::c_int;

use std::io;

use thiserror::Error;

/// Result code returned on success.
pub const SUCCESS: c_int = 0;

/// Result code for an operation on a handle that was never initialized or was destroyed.
pub const ERR_UNINITIALIZED: c_int = -90021;

/// Result code for `init` on a handle that is already bound.
pub const ERR_DOUBLE_INIT: c_int = -90022;

/// Result code for a timed acquire whose deadline passed.
pub const ERR_TIMED_OUT: c_int = -90023;

/// Returned by a barrier wait on exactly one of the released parties per cycle.
///
/// Same value as `PTHREAD_BARRIER_SERIAL_THREAD` in glibc and musl `<pthread.h>`.
pub const BARRIER_SERIAL_THREAD: c_int = -1;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// An error returned by a handle operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum Error {
    /// The handle is not bound to an OS resource.
    #[error("use of uninitialized handle")]
    UninitializedAccess,
    /// `init` was called on a handle that is already bound.
    #[error("handle is already initialized")]
    DoubleInit,
    /// The deadline of a timed acquire elapsed before a unit became available.
    #[error("semaphore wait timed out")]
    TimedOut,
    /// The underlying primitive failed with the contained `errno` value.
    #[error("{}", os_message(.0))]
    Os(i32),
}

impl Error {
    /// Returns the numeric result code of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use classic_sync::error::{Error, ERR_TIMED_OUT};
    ///
    /// assert_eq!(Error::TimedOut.code(), ERR_TIMED_OUT);
    /// assert_eq!(Error::Os(libc::EINVAL).code(), libc::EINVAL);
    /// ```
    pub const fn code(self) -> c_int {
        match self {
            Self::UninitializedAccess => ERR_UNINITIALIZED,
            Self::DoubleInit => ERR_DOUBLE_INIT,
            Self::TimedOut => ERR_TIMED_OUT,
            Self::Os(code) => code,
        }
    }

    /// Classifies a numeric result code. Returns `None` for [`SUCCESS`].
    ///
    /// This has no knowledge of which operation produced `code`, so
    /// [`BARRIER_SERIAL_THREAD`] is reported as `Os(-1)`. Callers decoding a barrier wait
    /// result should check for it first.
    pub const fn from_code(code: c_int) -> Option<Self> {
        match code {
            SUCCESS => None,
            ERR_UNINITIALIZED => Some(Self::UninitializedAccess),
            ERR_DOUBLE_INIT => Some(Self::DoubleInit),
            ERR_TIMED_OUT => Some(Self::TimedOut),
            code => Some(Self::Os(code)),
        }
    }

    /// Returns `true` if this is [`Error::TimedOut`].
    #[inline]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// Returns the `errno` value if the error came from the OS.
    #[inline]
    pub const fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Os(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Os(code) => io::Error::from_raw_os_error(code),
            Error::TimedOut => io::Error::new(io::ErrorKind::TimedOut, err),
            Error::UninitializedAccess | Error::DoubleInit => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
        }
    }
}

fn os_message(code: &i32) -> io::Error {
    io::Error::from_raw_os_error(*code)
}

/// Flattens a unit result into the numeric convention.
#[inline]
pub(crate) fn result_code(res: Result<()>) -> c_int {
    match res {
        Ok(()) => SUCCESS,
        Err(err) => err.code(),
    }
}
