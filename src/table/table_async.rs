use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use crate::exclusion::TokioExclusion;
use crate::guard::KeyGuard;
use crate::table::{KeyLock, PendingAcquire};

/// [TokioKeyLock] is an implementation of [AsyncKeyLock] (see [AsyncKeyLock] for API details) and is based
/// on top of [tokio::sync::Mutex]. This means the table can be used in asynchronous code and its locks
/// can be held across `await` points. It is a little slower than [SyncKeyLock](crate::SyncKeyLock).
///
/// This table is only available if the `tokio` crate feature is enabled.
///
/// This implementation can also be used in synchronous code since it also implements the [KeyLock] API,
/// but it will panic if you call [KeyLock::lock], [KeyLock::lock_owned], [KeyLock::acquire] or [KeyLock::with_lock]
/// from an `async` context, see the documentation of [tokio::sync::Mutex::blocking_lock].
pub type TokioKeyLock<K> = super::KeyLockImpl<K, TokioExclusion>;

/// The asynchronous API of a [KeyLock]. Waiting for a key suspends the task instead of blocking the thread.
///
/// If a future returned by one of these methods is dropped before it acquired the lock, it leaves
/// the table as if it was never called.
///
/// ```
/// use keylock::{AsyncKeyLock, KeyLock, TokioKeyLock};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let table = TokioKeyLock::new();
/// let guard1 = table.lock_async(4).await;
/// let guard2 = table.lock_async(5).await;
///
/// // After dropping the corresponding guard, we can lock it again
/// std::mem::drop(guard1);
/// let guard3 = table.lock_async(4).await;
/// # }
/// ```
#[async_trait]
pub trait AsyncKeyLock<K>: KeyLock<K>
where
    K: Eq + PartialEq + Hash + Clone + Debug + Send,
{
    /// Lock a key, waiting asynchronously until it becomes available.
    ///
    /// See [KeyLock::lock] for details on the returned guard.
    async fn lock_async(&self, key: K) -> Self::Guard<'_>;

    /// Lock a key, waiting asynchronously until it becomes available.
    ///
    /// See [KeyLock::lock_owned] for details on the returned guard.
    async fn lock_owned_async<'a>(self: &'a Arc<Self>, key: K) -> Self::OwnedGuard;

    /// Lock a key, run the future returned by `f` to completion and unlock the key again.
    ///
    /// The key stays locked across the `await` points of that future. It is unlocked on every
    /// exit path, including panics and the returned future being dropped.
    async fn with_lock_async<F, Fut, R>(&self, key: K, f: F) -> R
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = R> + Send,
        R: Send;
}

#[async_trait]
impl<K> AsyncKeyLock<K> for TokioKeyLock<K>
where
    K: Eq + PartialEq + Hash + Clone + Debug + Send + Sync + 'static,
{
    async fn lock_async(&self, key: K) -> Self::Guard<'_> {
        Self::_lock_async(self, key).await
    }

    async fn lock_owned_async<'a>(self: &'a Arc<Self>, key: K) -> Self::OwnedGuard {
        Self::_lock_async(Arc::clone(self), key).await
    }

    async fn with_lock_async<F, Fut, R>(&self, key: K, f: F) -> R
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = R> + Send,
        R: Send,
    {
        let _guard = Self::_lock_async(self, key).await;
        f().await
    }
}

impl<K> TokioKeyLock<K>
where
    K: Eq + PartialEq + Hash + Clone + Debug + Send + Sync + 'static,
{
    async fn _lock_async<S: Deref<Target = Self>>(
        this: S,
        key: K,
    ) -> KeyGuard<K, TokioExclusion, S> {
        let exclusion = this._register(&key);
        // Now we have an Arc::clone of the exclusion for this key, and the table lock is already unlocked so other tasks can access the table.
        // The following waits until the exclusion for this key is acquired. If this future is dropped
        // while waiting, the pending registration takes itself back out of the table.
        let pending = PendingAcquire::new(&*this, &key);
        exclusion.lock_async().await;
        pending.disarm();
        KeyGuard::new(this, key)
    }
}
