use crate::exclusion::BlockingExclusion;

/// [SyncKeyLock] is an implementation of [KeyLock](crate::KeyLock) (see [KeyLock](crate::KeyLock) for API details) that can be used
/// in synchronous code. It is a little faster than [TokioKeyLock](crate::TokioKeyLock) but acquiring its locks blocks the thread.
///
/// [SyncKeyLock] is based on top of [parking_lot::Mutex] and [parking_lot::Condvar]. Its locks are not poisoned
/// when a thread panics while holding them, the lock is simply released.
pub type SyncKeyLock<K> = super::KeyLockImpl<K, BlockingExclusion>;

/// A [SyncKeyLock] for the common case of string keys, for example record ids.
///
/// ```
/// use keylock::{KeyLock, StringKeyLock};
///
/// let table = StringKeyLock::new();
/// let guard = table.lock("user-17".to_string());
/// assert!(table.is_locked("user-17"));
/// assert!(!table.is_locked("user-18"));
/// ```
pub type StringKeyLock = SyncKeyLock<String>;
