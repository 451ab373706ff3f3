use thiserror::Error;

/// Errors that can happen when calling [KeyLock::try_lock](crate::KeyLock::try_lock) or
/// [KeyLock::try_lock_owned](crate::KeyLock::try_lock_owned).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryLockError {
    /// The lock could not be acquired at this time because the key is currently locked.
    #[error("The lock could not be acquired at this time because the key is currently locked")]
    WouldBlock,
}

/// Errors that can happen when calling [KeyLock::release](crate::KeyLock::release).
///
/// A failed release never changes the table, so it is safe to ignore this error if
/// the caller doesn't care about detecting unbalanced acquire/release pairs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseError {
    /// There is no holder and no waiter for this key, so there was nothing to release.
    #[error("Tried to release a key that isn't locked")]
    NotLocked,
}
