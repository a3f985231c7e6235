//! Process-local POSIX counting semaphores and reusable barriers behind word-sized handles.
//!
//! [`SemaphoreHandle`] and [`BarrierHandle`] are the slots a foreign runtime stores and passes
//! back on every call. Each is either uninitialized or bound to exactly one OS resource, and
//! every operation reports failure as an [`Error`] instead of panicking. The [`ffi`] module
//! flattens those results into plain integers.
//!
//! [`Semaphore`] and [`Barrier`] are owned wrappers for Rust callers that are bound from
//! construction until drop.
#[cfg(not(target_os = "linux"))]
compile_error!("classic-sync requires `sem_timedwait` and `pthread_barrier_t`, only Linux is supported.");

pub mod barrier;
pub mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod semaphore;

mod utils;

#[cfg(test)]
mod test_utils;

pub use barrier::{Barrier, BarrierHandle, BarrierWaitResult};
pub use error::{Error, Result};
pub use semaphore::{Permit, Semaphore, SemaphoreHandle};
