//! Binary lock primitives used for the individual keys of a [KeyLockImpl](crate::KeyLockImpl).
//!
//! Unlike a regular mutex, an [Exclusion] doesn't hand out a guard. It is locked and
//! unlocked through separate calls, which can happen on different threads. The
//! [KeyLockImpl](crate::KeyLockImpl) takes care of pairing them up.

use parking_lot::{Condvar, Mutex};

/// A lock that can be locked by at most one owner at a time.
pub trait Exclusion: Default + Send + Sync {
    /// Block the current thread until the lock is acquired.
    fn lock(&self);

    /// Acquire the lock if it is currently free. Returns `true` if it was acquired.
    fn try_lock(&self) -> bool;

    /// Release the lock, waking up one waiter if there is any.
    ///
    /// This can be called from a different thread than the one that acquired the lock.
    /// Calling it on a lock that isn't locked does nothing.
    fn unlock(&self);
}

/// [Exclusion] for synchronous code, a locked flag guarded by a [parking_lot::Mutex]
/// plus a [parking_lot::Condvar] for the waiters.
#[derive(Debug, Default)]
pub struct BlockingExclusion {
    locked: Mutex<bool>,
    released: Condvar,
}

impl Exclusion for BlockingExclusion {
    fn lock(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.released.wait(&mut locked);
        }
        *locked = true;
    }

    fn try_lock(&self) -> bool {
        let mut locked = self.locked.lock();
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    fn unlock(&self) {
        let mut locked = self.locked.lock();
        *locked = false;
        std::mem::drop(locked);
        self.released.notify_one();
    }
}

#[cfg(feature = "tokio")]
pub use self::tokio_exclusion::TokioExclusion;

#[cfg(feature = "tokio")]
mod tokio_exclusion {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::OwnedMutexGuard;

    use super::Exclusion;

    /// [Exclusion] based on [tokio::sync::Mutex]. It can be awaited from async code and
    /// its waiters are served in FIFO order.
    ///
    /// The owned guard of the tokio mutex is parked inside the exclusion while it is
    /// locked, so that [Exclusion::unlock] can release it from anywhere.
    ///
    /// This is only available if the `tokio` crate feature is enabled.
    #[derive(Debug, Default)]
    pub struct TokioExclusion {
        mutex: Arc<tokio::sync::Mutex<()>>,
        held: Mutex<Option<OwnedMutexGuard<()>>>,
    }

    impl TokioExclusion {
        /// Wait until the lock is acquired without blocking the thread.
        ///
        /// Dropping the returned future before it completes leaves the lock untouched.
        pub async fn lock_async(&self) {
            let guard = Arc::clone(&self.mutex).lock_owned().await;
            self._store(guard);
        }

        fn _store(&self, guard: OwnedMutexGuard<()>) {
            let previous = self.held.lock().replace(guard);
            assert!(
                previous.is_none(),
                "We just acquired the tokio mutex, so nobody else can have a guard for it"
            );
        }
    }

    impl Exclusion for TokioExclusion {
        /// Panics if called from within an async runtime, see [tokio::sync::Mutex::blocking_lock].
        fn lock(&self) {
            let guard = Arc::clone(&self.mutex).blocking_lock_owned();
            self._store(guard);
        }

        fn try_lock(&self) -> bool {
            match Arc::clone(&self.mutex).try_lock_owned() {
                Ok(guard) => {
                    self._store(guard);
                    true
                }
                Err(_) => false,
            }
        }

        fn unlock(&self) {
            // Take the guard out first so it gets dropped after `held` is unlocked again.
            let guard = self.held.lock().take();
            std::mem::drop(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BlockingExclusion, Exclusion};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn test_lock_unlock<E: Exclusion>() {
        let exclusion = E::default();
        exclusion.lock();
        assert!(!exclusion.try_lock());
        exclusion.unlock();
        assert!(exclusion.try_lock());
        exclusion.unlock();
    }

    fn test_unlock_unlocked_is_noop<E: Exclusion>() {
        let exclusion = E::default();
        exclusion.unlock();
        assert!(exclusion.try_lock());
        assert!(!exclusion.try_lock());
        exclusion.unlock();
    }

    fn test_unlock_from_other_thread<E: Exclusion + 'static>() {
        let exclusion = Arc::new(E::default());
        exclusion.lock();

        let counter = Arc::new(AtomicU32::new(0));
        let child = {
            let exclusion = Arc::clone(&exclusion);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                exclusion.lock();
                counter.fetch_add(1, Ordering::SeqCst);
                exclusion.unlock();
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert_eq!(0, counter.load(Ordering::SeqCst));

        // Release the lock from a thread that didn't acquire it
        let releaser = {
            let exclusion = Arc::clone(&exclusion);
            thread::spawn(move || exclusion.unlock())
        };
        releaser.join().unwrap();

        child.join().unwrap();
        assert_eq!(1, counter.load(Ordering::SeqCst));
        assert!(exclusion.try_lock());
    }

    #[test]
    fn blocking_lock_unlock() {
        test_lock_unlock::<BlockingExclusion>();
    }

    #[test]
    fn blocking_unlock_unlocked_is_noop() {
        test_unlock_unlocked_is_noop::<BlockingExclusion>();
    }

    #[test]
    fn blocking_unlock_from_other_thread() {
        test_unlock_from_other_thread::<BlockingExclusion>();
    }

    #[cfg(feature = "tokio")]
    mod tokio_based {
        use super::super::{Exclusion, TokioExclusion};

        #[test]
        fn lock_unlock() {
            super::test_lock_unlock::<TokioExclusion>();
        }

        #[test]
        fn unlock_unlocked_is_noop() {
            super::test_unlock_unlocked_is_noop::<TokioExclusion>();
        }

        #[test]
        fn unlock_from_other_thread() {
            super::test_unlock_from_other_thread::<TokioExclusion>();
        }

        #[tokio::test]
        async fn lock_async_waits_for_unlock() {
            let exclusion = TokioExclusion::default();
            exclusion.lock_async().await;
            assert!(!exclusion.try_lock());

            let waiting = tokio::time::timeout(
                std::time::Duration::from_millis(50),
                exclusion.lock_async(),
            )
            .await;
            assert!(waiting.is_err(), "lock_async must not complete while locked");

            exclusion.unlock();
            exclusion.lock_async().await;
            exclusion.unlock();
        }
    }
}
