//! This library offers a table of locks where individual locks can be locked/unlocked by key.
//! It initially considers all keys as "unlocked", but they can be locked
//! and if a second thread tries to acquire a lock for the same key, they will have to wait.
//! Threads locking different keys don't wait for each other.
//!
//! ```
//! use keylock::{KeyLock, SyncKeyLock};
//!
//! let table = SyncKeyLock::new();
//! let guard1 = table.lock(4);
//! let guard2 = table.lock(5);
//!
//! // This next line would cause a deadlock because `4` is already locked on this thread
//! // let guard3 = table.lock(4);
//!
//! // After dropping the corresponding guard, we can lock it again
//! std::mem::drop(guard1);
//! let guard3 = table.lock(4);
//! ```
//!
//! There are three ways to hold a key:
//! - [KeyLock::with_lock] runs a closure while holding the key.
//! - [KeyLock::lock] and [KeyLock::lock_owned] return a [KeyGuard] that releases the key when it is dropped
//!   or when [KeyGuard::unlock] is called.
//! - [KeyLock::acquire] and [KeyLock::release] lock and unlock a key without a guard, for callers that
//!   need to release from a place that can't hold on to a guard.
//!
//! ```
//! use keylock::{KeyLock, StringKeyLock};
//!
//! let table = StringKeyLock::new();
//! let updated = table.with_lock("record-7".to_string(), || {
//!     // Nobody else holds "record-7" while this runs
//!     "updated"
//! });
//! assert_eq!("updated", updated);
//! assert_eq!(0, table.num_active_keys());
//! ```
//!
//! You can use an arbitrary type to index locks by, as long as that type implements [PartialEq] + [Eq] + [Hash](std::hash::Hash) + [Clone] + [Debug](std::fmt::Debug).
//!
//! Under the hood, a [KeyLock] is a [HashMap](std::collections::HashMap) of reference counted locks,
//! with some logic making sure there aren't any race conditions when accessing the hash map.
//! An entry only lives as long as some thread holds or waits for its key.
//!
//! If the `tokio` feature is enabled, then this crate also offers [TokioKeyLock] which allows locks to be held across `await` points.

#![deny(missing_docs)]

mod error;
mod exclusion;
mod guard;
mod table;

pub use error::{ReleaseError, TryLockError};
pub use exclusion::{BlockingExclusion, Exclusion};
pub use guard::KeyGuard;
pub use table::table_sync::{StringKeyLock, SyncKeyLock};
pub use table::{KeyLock, KeyLockImpl};

#[cfg(feature = "tokio")]
pub use exclusion::TokioExclusion;
#[cfg(feature = "tokio")]
pub use table::table_async::{AsyncKeyLock, TokioKeyLock};
