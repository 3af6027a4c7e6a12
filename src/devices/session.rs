//! Single update session guard.
//!
//! At most one update attempt may own the slot and the transfer state at
//! a time. Acquisition is an atomic test-and-set that hands back a token;
//! the session ends when the token is dropped, on every return path.
use core::sync::atomic::{AtomicBool, Ordering};

/// Process wide session flag for firmware that runs a single updater.
pub static UPDATE_IN_PROGRESS: InProgress = InProgress::new();

pub struct InProgress(AtomicBool);

/// Proof of owning the update session. Releases it when dropped.
#[must_use = "the session is released as soon as the token is dropped"]
pub struct SessionToken<'a> {
    flag: &'a InProgress,
}

impl InProgress {
    pub const fn new() -> Self { Self(AtomicBool::new(false)) }

    /// Claims the session, or returns `None` if someone else holds it.
    pub fn try_acquire(&self) -> Option<SessionToken<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionToken { flag: self })
    }

    pub fn is_active(&self) -> bool { self.0.load(Ordering::Acquire) }
}

impl Default for InProgress {
    fn default() -> Self { Self::new() }
}

impl Drop for SessionToken<'_> {
    fn drop(&mut self) { self.flag.0.store(false, Ordering::Release); }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_one_token_exists_at_a_time() {
        // Given
        let flag = InProgress::new();
        let first = flag.try_acquire();

        // Then
        assert!(first.is_some());
        assert!(flag.is_active());
        assert!(flag.try_acquire().is_none());

        // When
        drop(first);

        // Then
        assert!(!flag.is_active());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn session_ends_on_early_return() {
        fn attempt(flag: &InProgress) -> Result<(), ()> {
            let _token = flag.try_acquire().ok_or(())?;
            Err(())
        }

        let flag = InProgress::new();
        assert!(attempt(&flag).is_err());
        assert!(!flag.is_active());
    }
}
