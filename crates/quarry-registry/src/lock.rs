//! Per-item reentrant, upgradeable read/write lock
//!
//! One `ItemLock` instance is shared by every `RepositoryItemUid` referencing
//! the same (repository, path) coordinate, see `UidFactory`. The lock keeps a
//! per-thread acquisition stack: every `lock()` call must be paired with
//! exactly one `unlock()`, which pops the most recent level and restores the
//! previous one rather than fully releasing.
//!
//! Semantics:
//! - `Read` is shared; requesting it while already holding the lock (at any
//!   level) is a balanced no-op push
//! - `Create`/`Update`/`Delete` are exclusive; requesting one while holding
//!   only `Read` upgrades in place. An upgrading thread gives up its shared
//!   hold before contending, otherwise two upgrading readers would wait on
//!   each other forever
//! - popping an exclusive level with a shared level below downgrades
//!   atomically, without re-contending for the shared hold
//!
//! Unbalanced `unlock()` is a caller defect and panics.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::thread::{self, ThreadId};

/// Intent of the operation the caller is about to perform on the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    /// Create, update and delete all map to the exclusive lock level.
    pub fn is_exclusive(self) -> bool {
        !matches!(self, Action::Read)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Shared,
    Exclusive,
}

#[derive(Default)]
struct LockState {
    /// Thread currently holding the exclusive level, if any.
    writer: Option<ThreadId>,
    /// Threads currently holding the shared level (never contains the writer).
    readers: HashSet<ThreadId>,
    /// Per-thread acquisition stacks; entries are removed when they empty.
    stacks: HashMap<ThreadId, Vec<Level>>,
}

/// Reentrant, upgradeable read/write lock for one item coordinate.
pub struct ItemLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ItemLock {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    /// Acquire the lock at the level implied by `action`, blocking as needed.
    pub fn lock(&self, action: Action) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if !action.is_exclusive() {
            let depth = state.stacks.get(&me).map_or(0, Vec::len);
            if depth == 0 {
                while state.writer.is_some() {
                    self.released.wait(&mut state);
                }
                state.readers.insert(me);
            }
            // already holding at any level: shared is subsumed, push only
            state.stacks.entry(me).or_default().push(Level::Shared);
        } else if state.writer == Some(me) {
            state.stacks.entry(me).or_default().push(Level::Exclusive);
        } else {
            // upgrading: release our shared participation before contending
            state.readers.remove(&me);
            while state.writer.is_some() || !state.readers.is_empty() {
                self.released.wait(&mut state);
            }
            state.writer = Some(me);
            state.stacks.entry(me).or_default().push(Level::Exclusive);
        }
    }

    /// Pop one level off the calling thread's acquisition stack.
    ///
    /// Panics on unbalanced use (more unlocks than locks): that is a defect in
    /// the caller, not a recoverable condition.
    pub fn unlock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        let Some(stack) = state.stacks.get_mut(&me) else {
            panic!("unbalanced unlock: thread holds no lock on this item");
        };
        let popped = stack.pop().unwrap_or_else(|| {
            panic!("unbalanced unlock: thread holds no lock on this item")
        });
        let still_exclusive = stack.contains(&Level::Exclusive);
        let empty = stack.is_empty();
        if empty {
            state.stacks.remove(&me);
        }

        match popped {
            Level::Exclusive if !still_exclusive => {
                state.writer = None;
                if !empty {
                    // downgrade: shared levels below stay valid
                    state.readers.insert(me);
                }
                self.released.notify_all();
            }
            Level::Shared if empty => {
                state.readers.remove(&me);
                self.released.notify_all();
            }
            _ => {}
        }
    }

    /// Number of threads currently holding the shared level.
    pub fn read_holder_count(&self) -> usize {
        self.state.lock().readers.len()
    }

    /// Number of threads currently holding the exclusive level (0 or 1).
    pub fn write_holder_count(&self) -> usize {
        usize::from(self.state.lock().writer.is_some())
    }

    pub fn is_locked(&self) -> bool {
        let state = self.state.lock();
        state.writer.is_some() || !state.readers.is_empty()
    }
}

impl std::fmt::Debug for ItemLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ItemLock")
            .field("writer", &state.writer)
            .field("readers", &state.readers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn test_reentrant_read() {
        let lock = ItemLock::new();
        lock.lock(Action::Read);
        lock.lock(Action::Read);
        assert_eq!(lock.read_holder_count(), 1);
        lock.unlock();
        assert_eq!(lock.read_holder_count(), 1);
        lock.unlock();
        assert_eq!(lock.read_holder_count(), 0);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_read_under_write_is_balanced_noop() {
        let lock = ItemLock::new();
        lock.lock(Action::Create);
        lock.lock(Action::Read);
        assert_eq!(lock.write_holder_count(), 1);
        assert_eq!(lock.read_holder_count(), 0);
        lock.unlock(); // pops the read level, still exclusive
        assert_eq!(lock.write_holder_count(), 1);
        lock.unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_upgrade_and_downgrade() {
        let lock = ItemLock::new();
        lock.lock(Action::Read);
        lock.lock(Action::Delete); // upgrade without releasing read first
        assert_eq!(lock.write_holder_count(), 1);
        assert_eq!(lock.read_holder_count(), 0);
        lock.unlock(); // back to shared
        assert_eq!(lock.write_holder_count(), 0);
        assert_eq!(lock.read_holder_count(), 1);
        lock.unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    #[should_panic(expected = "unbalanced unlock")]
    fn test_unbalanced_unlock_panics() {
        let lock = ItemLock::new();
        lock.lock(Action::Read);
        lock.unlock();
        lock.unlock();
    }

    #[test]
    fn test_write_excludes_readers() {
        let lock = Arc::new(ItemLock::new());
        lock.lock(Action::Create);

        let contender = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || {
                lock.lock(Action::Read);
                let seen_writer = lock.write_holder_count();
                lock.unlock();
                seen_writer
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(lock.read_holder_count(), 0);
        lock.unlock();

        // reader only got in after the writer fully released
        assert_eq!(contender.join().unwrap(), 0);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_concurrent_upgrades_do_not_deadlock() {
        let lock = Arc::new(ItemLock::new());
        let barrier = Arc::new(Barrier::new(2));
        let in_critical = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let lock = Arc::clone(&lock);
            let barrier = Arc::clone(&barrier);
            let in_critical = Arc::clone(&in_critical);
            let overlaps = Arc::clone(&overlaps);
            handles.push(std::thread::spawn(move || {
                lock.lock(Action::Read);
                barrier.wait();
                lock.lock(Action::Update); // both upgrade concurrently
                if in_critical.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(20));
                in_critical.fetch_sub(1, Ordering::SeqCst);
                lock.unlock();
                lock.unlock();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(lock.read_holder_count(), 0);
        assert_eq!(lock.write_holder_count(), 0);
    }

    #[test]
    fn test_balanced_multithreaded_sequences_reach_zero() {
        let lock = Arc::new(ItemLock::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(std::thread::spawn(move || {
                for round in 0..50 {
                    if (i + round) % 3 == 0 {
                        lock.lock(Action::Read);
                        lock.lock(Action::Create);
                        lock.lock(Action::Read);
                        lock.unlock();
                        lock.unlock();
                        lock.unlock();
                    } else {
                        lock.lock(Action::Read);
                        lock.unlock();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(lock.read_holder_count(), 0);
        assert_eq!(lock.write_holder_count(), 0);
        assert!(!lock.is_locked());
    }
}
