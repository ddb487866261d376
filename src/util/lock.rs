//! Poison-tolerant guards for the few std locks shared across tasks.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn lock<'a, T>(
    mutex: &'a Mutex<T>,
    owner: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| recover(poisoned, owner, op, "mutex"))
}

pub(crate) fn read<'a, T>(
    rwlock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    rwlock
        .read()
        .unwrap_or_else(|poisoned| recover(poisoned, owner, op, "rwlock.read"))
}

pub(crate) fn write<'a, T>(
    rwlock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    rwlock
        .write()
        .unwrap_or_else(|poisoned| recover(poisoned, owner, op, "rwlock.write"))
}

fn recover<G>(
    poisoned: PoisonError<G>,
    owner: &'static str,
    op: &'static str,
    kind: &'static str,
) -> G {
    warn!(
        op,
        owner,
        lock_kind = kind,
        "recovered poisoned lock; state may be stale"
    );
    poisoned.into_inner()
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn mutex_guard_survives_poisoning() {
        let mutex = Mutex::new(1);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = mutex.lock().expect("first lock");
            panic!("poison");
        }));

        *lock(&mutex, "tests", "write") += 1;
        assert_eq!(*lock(&mutex, "tests", "read"), 2);
    }

    #[test]
    fn rwlock_guard_survives_poisoning() {
        let rwlock = RwLock::new("a");

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = rwlock.write().expect("first lock");
            panic!("poison");
        }));

        *write(&rwlock, "tests", "write") = "b";
        assert_eq!(*read(&rwlock, "tests", "read"), "b");
    }
}
