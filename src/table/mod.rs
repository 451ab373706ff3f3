use parking_lot::{Mutex, MutexGuard};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::error::{ReleaseError, TryLockError};
use crate::exclusion::Exclusion;
use crate::guard::KeyGuard;

/// A table of locks where individual locks can be locked/unlocked by key.
/// It initially considers all keys as "unlocked", but they can be locked
/// and if a second thread tries to acquire a lock for the same key, they will have to wait.
/// Threads locking different keys never wait for each other.
///
/// This trait is implemented by [SyncKeyLock](crate::SyncKeyLock) and, if the `tokio` feature is enabled,
/// by [TokioKeyLock](crate::TokioKeyLock). [SyncKeyLock](crate::SyncKeyLock) is a little faster
/// but its locks cannot be acquired from asynchronous code without blocking the executor.
///
/// ```
/// use keylock::{KeyLock, SyncKeyLock};
///
/// let table = SyncKeyLock::new();
/// let guard1 = table.lock(4);
/// let guard2 = table.lock(5);
///
/// // This next line would deadlock because `4` is already locked on this thread
/// // let guard3 = table.lock(4);
///
/// // After dropping the corresponding guard, we can lock it again
/// std::mem::drop(guard1);
/// let guard3 = table.lock(4);
/// ```
///
/// You can use an arbitrary type to index locks by, as long as that type implements [PartialEq] + [Eq] + [Hash] + [Clone] + [Debug].
///
/// ```
/// use keylock::{KeyLock, SyncKeyLock};
///
/// #[derive(PartialEq, Eq, Hash, Clone, Debug)]
/// struct CustomLockKey(u32);
///
/// let table = SyncKeyLock::new();
/// let guard = table.lock(CustomLockKey(4));
/// ```
///
/// Under the hood, a [KeyLock] is a [HashMap] of reference counted locks. An entry only exists
/// while at least one thread holds or waits for its key, so memory usage is proportional to the
/// number of keys in use, not to the number of keys ever used.
pub trait KeyLock<K>: Default
where
    K: Eq + PartialEq + Hash + Clone + Debug,
{
    /// A handle to a held lock.
    /// The guard internally borrows the [KeyLock], so the [KeyLock] will not be dropped while a guard exists.
    /// The lock is automatically released whenever the guard is dropped, at which point [KeyLock::lock] or [KeyLock::lock_owned] with the same key will succeed yet again.
    type Guard<'a>: Debug
    where
        Self: 'a;

    /// An owned handle to a held lock.
    /// This guard is only available from a [KeyLock] that is wrapped in an [Arc]. It is identical to [KeyLock::Guard], except that rather than borrowing the [KeyLock], it clones the [Arc], incrementing the reference count.
    /// This means that unlike [KeyLock::Guard], it will have the `'static` lifetime and can be moved to other threads.
    type OwnedGuard: Debug;

    /// Create a new table where no key is locked
    #[inline]
    fn new() -> Self {
        Self::default()
    }

    /// Return the number of keys that are currently locked or waited for
    fn num_active_keys(&self) -> usize;

    /// Return the number of threads that currently hold or wait for the lock of the given key.
    /// This is `0` if the key isn't locked.
    fn ref_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized;

    /// Return true if any thread currently holds or waits for the lock of the given key.
    #[inline]
    fn is_locked<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ref_count(key) > 0
    }

    /// Lock a key without returning a guard. It has to be released again with [KeyLock::release].
    ///
    /// If the key is currently locked by a different thread, then the current thread blocks until it becomes available.
    /// Prefer [KeyLock::lock] or [KeyLock::with_lock], which release the key automatically.
    ///
    /// Examples
    /// -----
    /// ```
    /// use keylock::{KeyLock, SyncKeyLock};
    ///
    /// let table = SyncKeyLock::new();
    /// table.acquire("some-key".to_string());
    /// assert!(table.is_locked("some-key"));
    /// table.release("some-key").unwrap();
    /// assert!(!table.is_locked("some-key"));
    /// ```
    fn acquire(&self, key: K);

    /// Release a key that was locked with [KeyLock::acquire]. This wakes up the next waiter, if any.
    ///
    /// This can be called from a different thread than the one that acquired the key.
    /// Each call releases one acquisition, so releasing twice after acquiring once
    /// releases somebody else's lock.
    ///
    /// Errors
    /// -----
    /// If the key isn't locked, the table is left untouched and [ReleaseError::NotLocked] is returned.
    fn release<Q>(&self, key: &Q) -> Result<(), ReleaseError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized;

    /// Lock a key.
    ///
    /// If the lock with this key is currently locked by a different thread, then the current thread blocks until it becomes available.
    /// Upon returning, the thread is the only thread with the lock held. A RAII guard is returned to allow scoped unlock
    /// of the lock. When the guard goes out of scope, the lock will be unlocked.
    ///
    /// Locking a key in the thread which already holds the lock for it deadlocks.
    ///
    /// Panics
    /// -----
    /// If this is called through [TokioKeyLock](crate::TokioKeyLock), then this function will panic when called from an `async` context.
    ///
    /// Examples
    /// -----
    /// ```
    /// use keylock::{KeyLock, SyncKeyLock};
    ///
    /// let table = SyncKeyLock::new();
    /// let guard1 = table.lock(4);
    /// let guard2 = table.lock(5);
    ///
    /// // After unlocking the corresponding guard, we can lock it again
    /// guard1.unlock();
    /// let guard3 = table.lock(4);
    /// ```
    fn lock(&self, key: K) -> Self::Guard<'_>;

    /// Lock a key.
    ///
    /// This is similar to [KeyLock::lock], but it works on an `Arc<KeyLock>` instead of a [KeyLock] and
    /// returns a guard that keeps the [KeyLock] alive through that [Arc]. Such a guard can be moved
    /// to a different thread and released there.
    ///
    /// Examples
    /// -----
    /// ```
    /// use keylock::{KeyLock, SyncKeyLock};
    /// use std::sync::Arc;
    ///
    /// let table = Arc::new(SyncKeyLock::new());
    /// let guard = table.lock_owned(4);
    /// std::thread::spawn(move || guard.unlock()).join().unwrap();
    /// assert!(!table.is_locked(&4));
    /// ```
    fn lock_owned(self: &Arc<Self>, key: K) -> Self::OwnedGuard;

    /// Attempts to acquire the lock with the given key.
    ///
    /// If the lock could not be acquired at this time, then [Err] is returned and the table is left unchanged.
    /// Otherwise, a RAII guard is returned. The lock will be unlocked when the guard is dropped.
    ///
    /// This function does not block.
    ///
    /// Errors
    /// -----
    /// If the lock could not be acquired because it is already locked, then this call will return [TryLockError::WouldBlock].
    ///
    /// Examples
    /// -----
    /// ```
    /// use keylock::{KeyLock, SyncKeyLock, TryLockError};
    ///
    /// let table = SyncKeyLock::new();
    /// let guard1 = table.lock(4);
    ///
    /// let guard2 = table.try_lock(4);
    /// assert_eq!(TryLockError::WouldBlock, guard2.unwrap_err());
    ///
    /// std::mem::drop(guard1);
    /// let guard2 = table.try_lock(4).unwrap();
    /// ```
    fn try_lock(&self, key: K) -> Result<Self::Guard<'_>, TryLockError>;

    /// Attempts to acquire the lock with the given key.
    ///
    /// This is similar to [KeyLock::try_lock], but it works on an `Arc<KeyLock>` and returns an owned guard,
    /// see [KeyLock::lock_owned].
    ///
    /// This function does not block.
    ///
    /// Errors
    /// -----
    /// If the lock could not be acquired because it is already locked, then this call will return [TryLockError::WouldBlock].
    fn try_lock_owned(self: &Arc<Self>, key: K) -> Result<Self::OwnedGuard, TryLockError>;

    /// Lock a key, run `f` and unlock the key again.
    ///
    /// The key is unlocked on every exit path of `f`, including panics.
    /// Whatever `f` returns, for example a [Result], is passed through unchanged.
    ///
    /// Examples
    /// -----
    /// ```
    /// use keylock::{KeyLock, SyncKeyLock};
    ///
    /// let table = SyncKeyLock::new();
    /// let result: Result<u32, String> = table.with_lock("record-7", || Err("update failed".to_string()));
    /// assert_eq!(Err("update failed".to_string()), result);
    /// assert!(!table.is_locked("record-7"));
    /// ```
    #[inline]
    fn with_lock<F, R>(&self, key: K, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.lock(key);
        f()
    }
}

/// Bookkeeping for a key that at least one thread holds or waits for.
struct LockEntry<E> {
    // Waiters clone this Arc so they can block on it after releasing the table lock
    exclusion: Arc<E>,
    ref_count: usize,
}

impl<E: Exclusion> LockEntry<E> {
    fn new() -> Self {
        Self {
            exclusion: Arc::new(E::default()),
            ref_count: 0,
        }
    }
}

/// This struct implements both [SyncKeyLock](crate::SyncKeyLock) and [TokioKeyLock](crate::TokioKeyLock). See [KeyLock] for the API.
pub struct KeyLockImpl<K, E>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
{
    // The table lock is only held for bookkeeping, never while waiting for the
    // per-key exclusion, so it can always be a synchronous mutex.
    entries: Mutex<HashMap<K, LockEntry<E>>>,
}

impl<K, E> Default for KeyLockImpl<K, E>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
{
    #[inline]
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, E> Debug for KeyLockImpl<K, E>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self._entries();
        f.debug_map()
            .entries(entries.iter().map(|(key, entry)| (key, entry.ref_count)))
            .finish()
    }
}

impl<K, E> KeyLock<K> for KeyLockImpl<K, E>
where
    K: Eq + PartialEq + Hash + Clone + Debug + 'static,
    E: Exclusion + 'static,
{
    type Guard<'a> = KeyGuard<K, E, &'a Self>
    where
        Self: 'a;
    type OwnedGuard = KeyGuard<K, E, Arc<KeyLockImpl<K, E>>>;

    #[inline]
    fn num_active_keys(&self) -> usize {
        self._entries().len()
    }

    fn ref_count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self._entries()
            .get(key)
            .map(|entry| entry.ref_count)
            .unwrap_or(0)
    }

    fn acquire(&self, key: K) {
        self._acquire(&key);
    }

    fn release<Q>(&self, key: &Q) -> Result<(), ReleaseError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
    {
        self._release(key)
    }

    fn lock(&self, key: K) -> Self::Guard<'_> {
        Self::_lock(self, key)
    }

    fn lock_owned(self: &Arc<Self>, key: K) -> Self::OwnedGuard {
        Self::_lock(Arc::clone(self), key)
    }

    fn try_lock(&self, key: K) -> Result<Self::Guard<'_>, TryLockError> {
        Self::_try_lock(self, key)
    }

    fn try_lock_owned(self: &Arc<Self>, key: K) -> Result<Self::OwnedGuard, TryLockError> {
        Self::_try_lock(Arc::clone(self), key)
    }
}

impl<K, E> KeyLockImpl<K, E>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
{
    /// Create a new table where no key is locked, with room for `capacity` simultaneously
    /// active keys before the table has to reallocate.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    #[inline]
    fn _entries(&self) -> MutexGuard<'_, HashMap<K, LockEntry<E>>> {
        self.entries.lock()
    }

    /// Register interest in `key`, creating its entry if necessary, and return the
    /// exclusion to wait on. The table lock is released before this returns.
    pub(crate) fn _register(&self, key: &K) -> Arc<E> {
        let mut entries = self._entries();
        if !entries.contains_key(key) {
            trace!(?key, "Creating lock entry");
            entries.insert(key.clone(), LockEntry::new());
        }
        let entry = entries
            .get_mut(key)
            .expect("We just made sure the entry exists");
        entry.ref_count += 1;
        trace!(?key, ref_count = entry.ref_count, "Registered for key");
        Arc::clone(&entry.exclusion)
    }

    /// Undo a [Self::_register] whose caller never acquired the exclusion.
    pub(crate) fn _unregister(&self, key: &K) {
        let mut entries = self._entries();
        let entry = match entries.get_mut(key) {
            Some(entry) => entry,
            None => {
                // Somebody released the key more often than it was acquired and took our registration with it.
                warn!(?key, "Gave up waiting for a key whose entry was already released");
                return;
            }
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        trace!(?key, ref_count = entry.ref_count, "Gave up waiting for key");
        if entry.ref_count == 0 {
            entries.remove(key);
            trace!(?key, "Removed lock entry");
        }
    }

    fn _acquire(&self, key: &K) {
        let exclusion = self._register(key);
        // Now we have an Arc::clone of the exclusion for this key and the table lock is already unlocked,
        // so other threads can access the table while we wait.
        // If waiting unwinds, the pending registration takes itself back out of the table.
        let pending = PendingAcquire::new(self, key);
        exclusion.lock();
        pending.disarm();
    }

    fn _lock<S: Deref<Target = Self>>(this: S, key: K) -> KeyGuard<K, E, S> {
        this._acquire(&key);
        KeyGuard::new(this, key)
    }

    fn _try_lock<S: Deref<Target = Self>>(
        this: S,
        key: K,
    ) -> Result<KeyGuard<K, E, S>, TryLockError> {
        {
            let mut entries = this._entries();
            if let Some(entry) = entries.get_mut(&key) {
                // try_lock never blocks, so it's fine to call it while holding the table lock.
                if !entry.exclusion.try_lock() {
                    return Err(TryLockError::WouldBlock);
                }
                entry.ref_count += 1;
                trace!(?key, ref_count = entry.ref_count, "Registered for key");
            } else {
                let mut entry = LockEntry::<E>::new();
                let locked = entry.exclusion.try_lock();
                assert!(locked, "A freshly created exclusion can't be locked");
                entry.ref_count = 1;
                trace!(?key, "Creating lock entry");
                entries.insert(key.clone(), entry);
            }
        }
        Ok(KeyGuard::new(this, key))
    }

    pub(crate) fn _release<Q>(&self, key: &Q) -> Result<(), ReleaseError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
    {
        let mut entries = self._entries();
        let entry = match entries.get_mut(key) {
            Some(entry) => entry,
            None => {
                warn!(?key, "Tried to release a key that isn't locked");
                return Err(ReleaseError::NotLocked);
            }
        };

        // Unlocking wakes up the next waiter for this key, if any. It will get the exclusion
        // but can't touch the table before we're done here because we hold the table lock.
        entry.exclusion.unlock();
        entry.ref_count -= 1;
        trace!(?key, ref_count = entry.ref_count, "Released key");

        if entry.ref_count == 0 {
            // Nobody holds or waits for this key anymore. New lockers would have to register
            // through the table lock we're holding, so we can clean up without race conditions.
            let remove_result = entries.remove(key);
            assert!(
                remove_result.is_some(),
                "We just got this entry above from the hash map, it cannot have vanished since then"
            );
            trace!(?key, "Removed lock entry");
        }
        Ok(())
    }
}

/// A registration for a key whose exclusion hasn't been acquired yet.
/// Dropping it without calling [PendingAcquire::disarm] rolls the registration back,
/// which happens when waiting for the exclusion panics or an async lock future is dropped.
pub(crate) struct PendingAcquire<'a, K, E>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
{
    table: &'a KeyLockImpl<K, E>,
    key: &'a K,
}

impl<'a, K, E> PendingAcquire<'a, K, E>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
{
    pub(crate) fn new(table: &'a KeyLockImpl<K, E>, key: &'a K) -> Self {
        Self { table, key }
    }

    /// The exclusion was acquired, keep the registration.
    pub(crate) fn disarm(self) {
        std::mem::forget(self);
    }
}

impl<'a, K, E> Drop for PendingAcquire<'a, K, E>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
{
    fn drop(&mut self) {
        self.table._unregister(self.key);
    }
}


#[cfg(feature = "tokio")]
pub mod table_async;
pub mod table_sync;
