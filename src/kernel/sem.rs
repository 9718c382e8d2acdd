//! Counting semaphores with LIFO blocked lists.
//!
//! Blocked tasks are threaded through the process table itself: each
//! PCB carries a `next_blocked` slot index, and the semaphore holds the
//! list head. New waiters are prepended and wakes pop the head, so the
//! wake order is last-in first-out by design.
//!
//! `wait` never suspends by itself: it reports `MustBlock` and leaves
//! the long-jump back to the scheduler to its trap-context caller.
//! Scheduling is cooperative on a single hart, so the table mutations
//! here are never interleaved.

use spin::Mutex;

use crate::kernel::task::{self, ProcState, ProcTable, PROC_TABLE};

pub const MAX_SEMS: usize = 32;

pub struct Semaphore {
    pub id: i32,
    pub value: i32,
    /// PID that created it; informational.
    pub owner_pid: i32,
    /// Head of the blocked list (process-table slot index).
    pub blocked_head: Option<usize>,
    pub in_use: bool,
}

impl Semaphore {
    const fn unused() -> Self {
        Self {
            id: 0,
            value: 0,
            owner_pid: 0,
            blocked_head: None,
            in_use: false,
        }
    }
}

/// What a `wait` means for the calling task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The decrement stayed non-negative; the caller keeps running.
    Acquired,
    /// The caller has been queued and must be suspended.
    MustBlock,
    /// No such semaphore.
    NotFound,
}

pub struct SemTable {
    slots: [Semaphore; MAX_SEMS],
    next_id: i32,
}

impl SemTable {
    pub const fn new() -> Self {
        Self {
            slots: [const { Semaphore::unused() }; MAX_SEMS],
            next_id: 1,
        }
    }

    pub fn init(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Semaphore::unused();
        }
        self.next_id = 1;
    }

    fn slot_of(&self, id: i32) -> Option<usize> {
        if id <= 0 {
            return None;
        }
        self.slots.iter().position(|s| s.in_use && s.id == id)
    }

    pub fn get(&self, id: i32) -> Option<&Semaphore> {
        self.slot_of(id).map(|idx| &self.slots[idx])
    }

    pub fn used(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }

    /// A negative `initial` pre-arms the semaphore: the first
    /// `|initial|` signals wake nobody.
    pub fn create(&mut self, initial: i32, owner_pid: i32) -> Option<i32> {
        let idx = self.slots.iter().position(|s| !s.in_use)?;
        let id = self.next_id;
        self.next_id += 1;
        self.slots[idx] = Semaphore {
            id,
            value: initial,
            owner_pid,
            blocked_head: None,
            in_use: true,
        };
        Some(id)
    }

    pub fn wait(&mut self, procs: &mut ProcTable, current_pid: i32, id: i32) -> WaitOutcome {
        let Some(idx) = self.slot_of(id) else {
            return WaitOutcome::NotFound;
        };

        self.slots[idx].value -= 1;
        if self.slots[idx].value >= 0 {
            return WaitOutcome::Acquired;
        }

        let Some(pidx) = procs.slot_of_pid(current_pid) else {
            // No task context to suspend; undo the decrement.
            self.slots[idx].value += 1;
            return WaitOutcome::NotFound;
        };

        let waiter = procs.get_mut(pidx);
        waiter.state = ProcState::BlockedSem;
        waiter.blocked_sem_id = id;
        waiter.next_blocked = self.slots[idx].blocked_head;
        self.slots[idx].blocked_head = Some(pidx);
        WaitOutcome::MustBlock
    }

    /// Readies at most the list head; the woken task is never
    /// dispatched inline.
    pub fn signal(&mut self, procs: &mut ProcTable, id: i32) -> bool {
        let Some(idx) = self.slot_of(id) else {
            return false;
        };

        self.slots[idx].value += 1;
        if self.slots[idx].value <= 0 {
            if let Some(head) = self.slots[idx].blocked_head {
                self.slots[idx].blocked_head = procs.get(head).next_blocked;
                let woken = procs.get_mut(head);
                woken.state = ProcState::Ready;
                woken.blocked_sem_id = -1;
                woken.next_blocked = None;
            }
        }
        true
    }

    /// Refused while tasks are blocked on the semaphore, so nothing is
    /// left stranded in `BlockedSem`.
    pub fn destroy(&mut self, id: i32) -> bool {
        let Some(idx) = self.slot_of(id) else {
            return false;
        };
        if self.slots[idx].blocked_head.is_some() {
            return false;
        }
        self.slots[idx] = Semaphore::unused();
        true
    }

    pub fn wait_list_len(&self, procs: &ProcTable, id: i32) -> usize {
        let mut len = 0;
        if let Some(idx) = self.slot_of(id) {
            let mut cursor = self.slots[idx].blocked_head;
            while let Some(pidx) = cursor {
                len += 1;
                cursor = procs.get(pidx).next_blocked;
            }
        }
        len
    }
}

pub(crate) static SEM_TABLE: Mutex<SemTable> = Mutex::new(SemTable::new());

pub fn sem_create(initial: i32) -> i32 {
    SEM_TABLE
        .lock()
        .create(initial, task::current_pid())
        .unwrap_or(-1)
}

pub fn sem_wait(id: i32) -> WaitOutcome {
    let mut sems = SEM_TABLE.lock();
    let mut procs = PROC_TABLE.lock();
    sems.wait(&mut procs, task::current_pid(), id)
}

pub fn sem_signal(id: i32) -> bool {
    let mut sems = SEM_TABLE.lock();
    let mut procs = PROC_TABLE.lock();
    sems.signal(&mut procs, id)
}

pub fn sem_destroy(id: i32) -> bool {
    SEM_TABLE.lock().destroy(id)
}

pub fn sem_value(id: i32) -> Option<i32> {
    SEM_TABLE.lock().get(id).map(|s| s.value)
}
