//! Child-Status Arena and Wait Synchronization
//!
//! Each process owns one [`ChildTable`]: one record per child it has spawned
//! and not yet reaped. Children hold a `Weak` reference to their parent's
//! table and signal through it *by id* - a child never touches any other part
//! of its parent's state.
//!
//! # Lost-wakeup discipline
//! The table's mutex guards both the exited-flag write and the decision to
//! wake, and the waiter registers with the scheduler
//! ([`Scheduler::prepare_block`]) before releasing that mutex. A wake landing
//! between the release and the subsequent [`Scheduler::block`] is therefore
//! consumed by `block` instead of lost. Wakeups may be spurious; the waiter
//! re-checks the record under the lock after every one.

use alloc::vec::Vec;

use spin::Mutex;

use crate::hal::Scheduler;
use crate::proc::Pid;

/// Status of one child, owned by the parent.
#[derive(Debug)]
struct ChildRecord {
    pid: Pid,
    exited: bool,
    code: i32,
}

#[derive(Debug)]
struct Inner {
    records: Vec<ChildRecord>,
    /// Child id the owner is currently blocked waiting for, if any.
    waiting_for: Option<Pid>,
}

/// Parent-owned arena of child-status records.
#[derive(Debug)]
pub struct ChildTable {
    owner: Pid,
    inner: Mutex<Inner>,
}

impl ChildTable {
    /// Create an empty table owned by process `owner`.
    pub fn new(owner: Pid) -> Self {
        Self {
            owner,
            inner: Mutex::new(Inner {
                records: Vec::new(),
                waiting_for: None,
            }),
        }
    }

    /// Record a freshly spawned child as running.
    ///
    /// Must happen before the child first runs, so its exit always finds a
    /// record to update. At most one record per live child id.
    pub fn register(&self, child: Pid) {
        let mut inner = self.inner.lock();
        debug_assert!(
            inner.records.iter().all(|r| r.pid != child),
            "child {child} registered twice"
        );
        inner.records.push(ChildRecord {
            pid: child,
            exited: false,
            code: 0,
        });
    }

    /// Mark `child` as exited with `code`, waking the owner if it is blocked
    /// waiting for exactly this child.
    ///
    /// Called by the exiting child, exactly once. The write and the wake
    /// happen under one lock so a concurrent `wait` observes them atomically.
    /// A child whose record was already discarded (parent reaped another way
    /// or is tearing down) finds nothing to update, which is fine.
    pub fn post_exit(&self, child: Pid, code: i32, sched: &dyn Scheduler) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.records.iter_mut().find(|r| r.pid == child) {
            record.exited = true;
            record.code = code;
            if inner.waiting_for == Some(child) {
                sched.wake(self.owner);
            }
        }
    }

    /// Block until `child` has exited, reap its record, and return its exit
    /// code.
    ///
    /// Returns `None` without blocking when `child` is not an unreaped child
    /// of the owner: never spawned by it, already reaped by an earlier wait,
    /// or simply someone else's pid. A given child can be waited on
    /// successfully exactly once.
    pub fn wait(&self, child: Pid, sched: &dyn Scheduler) -> Option<i32> {
        let mut inner = self.inner.lock();
        inner.records.iter().find(|r| r.pid == child)?;
        inner.waiting_for = Some(child);

        loop {
            // Re-find by id after every wakeup: positions only move under
            // this lock, but re-scanning keeps no index across the unlock.
            match inner.records.iter().position(|r| r.pid == child) {
                Some(idx) if inner.records[idx].exited => {
                    inner.waiting_for = None;
                    let record = inner.records.swap_remove(idx);
                    return Some(record.code);
                }
                Some(_) => {}
                // Only the owner removes records, and the owner is blocked
                // right here; treat a vanished record as unwaitable.
                None => {
                    inner.waiting_for = None;
                    return None;
                }
            }

            sched.prepare_block(self.owner);
            drop(inner);
            sched.block(self.owner);
            inner = self.inner.lock();
        }
    }

    /// Drop every remaining record, running or exited.
    ///
    /// Used when the owner itself terminates without having reaped them;
    /// still-running children continue independently and their later exits
    /// find no record.
    pub fn discard_all(&self) {
        let mut inner = self.inner.lock();
        inner.records.clear();
        inner.waiting_for = None;
    }

    /// Whether an unreaped record for `child` exists (running or exited).
    pub fn is_tracking(&self, child: Pid) -> bool {
        self.inner.lock().records.iter().any(|r| r.pid == child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ParkScheduler;

    const PARENT: Pid = Pid(1);
    const CHILD: Pid = Pid(2);

    #[test]
    fn wait_on_exited_child_returns_code_once() {
        let sched = ParkScheduler::new();
        let table = ChildTable::new(PARENT);
        table.register(CHILD);
        table.post_exit(CHILD, 7, &sched);

        assert_eq!(table.wait(CHILD, &sched), Some(7));
        // Reaped: the second wait fails without blocking.
        assert_eq!(table.wait(CHILD, &sched), None);
    }

    #[test]
    fn wait_on_non_child_fails_immediately() {
        let sched = ParkScheduler::new();
        let table = ChildTable::new(PARENT);
        table.register(CHILD);

        assert_eq!(table.wait(Pid(99), &sched), None);
    }

    #[test]
    fn exit_of_discarded_child_is_a_no_op() {
        let sched = ParkScheduler::new();
        let table = ChildTable::new(PARENT);
        table.register(CHILD);
        table.discard_all();

        table.post_exit(CHILD, 3, &sched);
        assert!(!table.is_tracking(CHILD));
    }

    #[test]
    fn register_tracks_until_reaped() {
        let sched = ParkScheduler::new();
        let table = ChildTable::new(PARENT);
        table.register(CHILD);
        assert!(table.is_tracking(CHILD));

        table.post_exit(CHILD, 0, &sched);
        assert!(table.is_tracking(CHILD));

        table.wait(CHILD, &sched);
        assert!(!table.is_tracking(CHILD));
    }
}
