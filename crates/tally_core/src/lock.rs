//! Per-user import gate.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use tally_store::UserId;
use tracing::debug;

/// Serializes imports per user.
///
/// At most one guard per user exists at a time; imports for different
/// users proceed independently. Exports never take the gate.
#[derive(Debug, Default)]
pub struct UserLocks {
    busy: Mutex<HashSet<UserId>>,
    released: Condvar,
}

impl UserLocks {
    /// Creates an empty gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other guard is held for `user`, then takes one.
    pub fn acquire(&self, user: UserId) -> UserGuard<'_> {
        let mut busy = self.busy.lock();
        if busy.contains(&user) {
            debug!(%user, "waiting for in-flight import");
        }
        while busy.contains(&user) {
            self.released.wait(&mut busy);
        }
        busy.insert(user);
        UserGuard { locks: self, user }
    }

    /// Takes a guard for `user` if none is held.
    pub fn try_acquire(&self, user: UserId) -> Option<UserGuard<'_>> {
        let mut busy = self.busy.lock();
        if !busy.insert(user) {
            return None;
        }
        Some(UserGuard { locks: self, user })
    }

    /// Returns whether a guard is currently held for `user`.
    #[must_use]
    pub fn is_locked(&self, user: UserId) -> bool {
        self.busy.lock().contains(&user)
    }
}

/// Proof of exclusive import access for one user. Released on drop.
#[derive(Debug)]
pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    user: UserId,
}

impl UserGuard<'_> {
    /// The user this guard is held for.
    #[must_use]
    pub fn user(&self) -> UserId {
        self.user
    }
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        self.locks.busy.lock().remove(&self.user);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn one_guard_per_user() {
        let locks = UserLocks::new();
        let guard = locks.acquire(UserId(1));
        assert!(locks.try_acquire(UserId(1)).is_none());
        assert!(locks.try_acquire(UserId(2)).is_some());
        drop(guard);
        assert!(!locks.is_locked(UserId(1)));
        assert!(locks.try_acquire(UserId(1)).is_some());
    }

    #[test]
    fn same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = locks.acquire(UserId(7));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
