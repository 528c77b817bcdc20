//! Counting semaphore with FIFO wakeup order (`spec.md` §4.F, testable property #6).
//!
//! Grounded on `kernel/sync.c`'s `sem_t`: a count plus an explicit wait queue. `down` blocks
//! whenever the count is already zero by marking the calling task `Waiting` and yielding; `up`
//! increments the count and wakes the longest-waiting blocked task, never any other one, so N
//! tasks blocked on the same semaphore are released in the order they blocked.

use alloc::collections::VecDeque;

use spin::Mutex;

use crate::sched;
use crate::sched::task::{TaskId, TaskState};

struct Inner {
    count: isize,
    waiters: VecDeque<TaskId>,
}

pub struct Semaphore {
    inner: Mutex<Inner>,
}

impl Semaphore {
    pub const fn new(initial: isize) -> Self {
        Semaphore { inner: Mutex::new(Inner { count: initial, waiters: VecDeque::new() }) }
    }

    /// Block until a unit is available, then take it.
    pub fn down(&self) {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.count > 0 {
                    inner.count -= 1;
                    return;
                }
                let me = sched::current_id();
                if !inner.waiters.contains(&me) {
                    inner.waiters.push_back(me);
                }
            }
            sched::set_state(sched::current_id(), TaskState::Waiting);
            sched::yield_now();
        }
    }

    /// Take a unit only if one is immediately available, without blocking.
    pub fn try_down(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.count > 0 {
            inner.count -= 1;
            true
        } else {
            false
        }
    }

    /// Release a unit and wake the longest-waiting blocked task, if any.
    pub fn up(&self) {
        let mut inner = self.inner.lock();
        inner.count += 1;
        let waiter = inner.waiters.pop_front();
        drop(inner);
        if let Some(task) = waiter {
            sched::set_state(task, TaskState::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_down_respects_count() {
        let sem = Semaphore::new(1);
        assert!(sem.try_down());
        assert!(!sem.try_down());
        sem.up();
        assert!(sem.try_down());
    }

    #[test]
    fn up_before_any_down_just_grows_the_count() {
        let sem = Semaphore::new(0);
        sem.up();
        sem.up();
        assert!(sem.try_down());
        assert!(sem.try_down());
        assert!(!sem.try_down());
    }
}
