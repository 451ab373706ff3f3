use std::fmt::{self, Debug};
use std::hash::Hash;
use std::ops::Deref;
use tracing::trace;

use crate::exclusion::Exclusion;
use crate::table::KeyLockImpl;

/// A RAII implementation of a scoped lock for a key of a [KeyLock](crate::KeyLock). When this instance is dropped (falls out of scope), the key will be unlocked.
///
/// The guard is the release capability for the key. It can be released exactly once, either by
/// dropping it or by calling [KeyGuard::unlock], which consumes it.
#[must_use = "if unused the key will immediately unlock"]
pub struct KeyGuard<K, E, P>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
    P: Deref<Target = KeyLockImpl<K, E>>,
{
    table: P,
    key: K,
}

impl<K, E, P> KeyGuard<K, E, P>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
    P: Deref<Target = KeyLockImpl<K, E>>,
{
    /// Only to be called once the exclusion for `key` is acquired and registered in `table`.
    pub(crate) fn new(table: P, key: K) -> Self {
        Self { table, key }
    }

    /// The key this guard holds the lock for.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Unlock the key. This is the same as dropping the guard.
    #[inline]
    pub fn unlock(self) {
        std::mem::drop(self);
    }
}

impl<K, E, P> Drop for KeyGuard<K, E, P>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
    P: Deref<Target = KeyLockImpl<K, E>>,
{
    fn drop(&mut self) {
        // This can only fail if somebody released our key through KeyLock::release without owning it.
        // There is nothing left to unlock for us then.
        if let Err(err) = self.table._release(&self.key) {
            trace!(key = ?self.key, %err, "Guard found its key already released");
        }
    }
}

impl<K, E, P> Debug for KeyGuard<K, E, P>
where
    K: Eq + PartialEq + Hash + Clone + Debug,
    E: Exclusion,
    P: Deref<Target = KeyLockImpl<K, E>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyGuard({:?})", self.key)
    }
}
