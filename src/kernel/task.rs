//! Process table and the cooperative dispatcher.
//!
//! Tasks own a bump-allocated stack and an entry address. Dispatch is a
//! plain subroutine call on the task's stack; control comes back either
//! by the entry returning or by the trap handler rewriting `mepc` to
//! the saved kernel continuation. Suspension happens only at `ecall`.

use core::sync::atomic::{AtomicI32, Ordering::Relaxed};

use log::{error, info};
use spin::Mutex;

use crate::arch;
use crate::mem::{self, BumpAllocator};

pub const MAX_PROCS: usize = 16;
pub const DEFAULT_STACK_SIZE: usize = 4096;
/// Per-slot name storage; names are capped at 15 characters.
pub const NAME_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcState {
    Free,
    Ready,
    Running,
    BlockedSem,
    Zombie,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedError {
    TableFull,
    OutOfMemory,
}

pub struct Process {
    pub pid: i32,
    name: [u8; NAME_LEN],
    name_len: usize,
    pub entry: usize,
    pub stack_base: usize,
    pub stack_size: usize,
    pub stack_top: usize,
    pub state: ProcState,
    /// Valid only in `BlockedSem`, else -1.
    pub blocked_sem_id: i32,
    /// Threads this slot into a semaphore wait list (slot index).
    pub next_blocked: Option<usize>,
}

impl Process {
    const fn free_slot() -> Self {
        Self {
            pid: 0,
            name: [0; NAME_LEN],
            name_len: 0,
            entry: 0,
            stack_base: 0,
            stack_size: 0,
            stack_top: 0,
            state: ProcState::Free,
            blocked_sem_id: -1,
            next_blocked: None,
        }
    }

    fn clear(&mut self) {
        *self = Self::free_slot();
    }

    fn set_name(&mut self, name: &str) {
        let src = if name.is_empty() { "proc" } else { name };
        let len = src.len().min(NAME_LEN - 1);
        self.name[..len].copy_from_slice(&src.as_bytes()[..len]);
        self.name_len = len;
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("?")
    }
}

pub struct ProcTable {
    slots: [Process; MAX_PROCS],
    next_pid: i32,
}

impl ProcTable {
    pub const fn new() -> Self {
        Self {
            slots: [const { Process::free_slot() }; MAX_PROCS],
            next_pid: 1,
        }
    }

    pub fn init(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.next_pid = 1;
    }

    pub fn slots(&self) -> &[Process] {
        &self.slots
    }

    pub fn get(&self, idx: usize) -> &Process {
        &self.slots[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Process {
        &mut self.slots[idx]
    }

    pub fn slot_of_pid(&self, pid: i32) -> Option<usize> {
        if pid <= 0 {
            return None;
        }
        self.slots.iter().position(|p| p.pid == pid)
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|p| p.state != ProcState::Free).count()
    }

    pub fn next_pid(&self) -> i32 {
        self.next_pid
    }

    fn free_slot_idx(&self) -> Option<usize> {
        self.slots.iter().position(|p| p.state == ProcState::Free)
    }

    fn install(
        &mut self,
        idx: usize,
        entry: usize,
        stack_base: usize,
        stack_size: usize,
        name: &str,
    ) -> i32 {
        let pid = self.next_pid;
        self.next_pid += 1;

        let slot = &mut self.slots[idx];
        slot.pid = pid;
        slot.entry = entry;
        slot.stack_base = stack_base;
        slot.stack_size = stack_size;
        slot.stack_top = (stack_base + stack_size) & !0xF;
        slot.set_name(name);
        slot.state = ProcState::Ready;
        slot.blocked_sem_id = -1;
        slot.next_blocked = None;
        pid
    }

    /// Creates a task in `Ready`. The slot is not consumed when the
    /// stack allocation fails.
    pub fn create(
        &mut self,
        heap: &mut BumpAllocator,
        entry: usize,
        name: &str,
        stack_size: usize,
    ) -> Result<i32, SchedError> {
        let idx = self.free_slot_idx().ok_or(SchedError::TableFull)?;
        let stack = heap.alloc(stack_size).ok_or(SchedError::OutOfMemory)?;
        Ok(self.install(idx, entry, stack, stack_size, name))
    }

    /// Copies a flat position-independent image into a fresh code
    /// buffer and creates a task whose entry is the buffer base.
    pub fn create_from_binary(
        &mut self,
        heap: &mut BumpAllocator,
        image: &[u8],
        name: &str,
        stack_size: usize,
    ) -> Result<i32, SchedError> {
        let idx = self.free_slot_idx().ok_or(SchedError::TableFull)?;
        let regions = mem::alloc_process_memory(heap, image.len(), stack_size)
            .ok_or(SchedError::OutOfMemory)?;
        unsafe {
            core::ptr::copy_nonoverlapping(image.as_ptr(), regions.code as *mut u8, image.len());
        }
        Ok(self.install(idx, regions.code, regions.stack, stack_size, name))
    }

    /// Circular scan from `start_idx`; the first `Ready` or `Running`
    /// slot wins. `BlockedSem`, `Zombie` and `Free` are skipped.
    pub fn find_next_ready(&self, start_idx: usize) -> Option<usize> {
        (0..MAX_PROCS)
            .map(|off| (start_idx + off) % MAX_PROCS)
            .find(|&i| matches!(self.slots[i].state, ProcState::Ready | ProcState::Running))
    }

    pub fn terminate(&mut self, pid: i32) {
        if let Some(idx) = self.slot_of_pid(pid) {
            self.slots[idx].state = ProcState::Zombie;
        }
    }

    /// Post-dispatch reaping. A slot still `Running` at return came
    /// back by natural return without reporting an exit; it is a zombie
    /// by the task lifecycle and is released the same way.
    pub fn reap_after_dispatch(&mut self, pid: i32) {
        if let Some(idx) = self.slot_of_pid(pid) {
            match self.slots[idx].state {
                ProcState::Zombie | ProcState::Running => self.slots[idx].clear(),
                _ => {}
            }
        }
    }
}

pub(crate) static PROC_TABLE: Mutex<ProcTable> = Mutex::new(ProcTable::new());

static CURRENT: AtomicI32 = AtomicI32::new(-1);

pub fn current_pid() -> i32 {
    CURRENT.load(Relaxed)
}

#[cfg(test)]
pub(crate) fn set_current(pid: i32) {
    CURRENT.store(pid, Relaxed);
}

pub fn scheduler_init() -> bool {
    PROC_TABLE.lock().init();
    CURRENT.store(-1, Relaxed);
    true
}

pub fn proc_count() -> usize {
    PROC_TABLE.lock().count()
}

pub fn with_table<R>(f: impl FnOnce(&ProcTable) -> R) -> R {
    f(&PROC_TABLE.lock())
}

pub fn terminate_process(pid: i32) {
    PROC_TABLE.lock().terminate(pid);
}

/// Yield path of the trap handler: an interrupted `Running` task goes
/// back to `Ready` so the round-robin scan picks it up again.
pub(crate) fn yield_current() {
    let pid = current_pid();
    let mut table = PROC_TABLE.lock();
    if let Some(idx) = table.slot_of_pid(pid) {
        if table.get(idx).state == ProcState::Running {
            table.get_mut(idx).state = ProcState::Ready;
        }
    }
}

pub fn create_process(entry: usize, name: &str, stack_size: usize) -> i32 {
    let mut heap = mem::KERNEL_HEAP.lock();
    let result = PROC_TABLE.lock().create(&mut heap, entry, name, stack_size);
    drop(heap);
    report_created(name, result)
}

pub fn create_process_from_binary(image: &[u8], name: &str, stack_size: usize) -> i32 {
    let mut heap = mem::KERNEL_HEAP.lock();
    let result = PROC_TABLE
        .lock()
        .create_from_binary(&mut heap, image, name, stack_size);
    drop(heap);
    report_created(name, result)
}

fn report_created(name: &str, result: Result<i32, SchedError>) -> i32 {
    match result {
        Ok(pid) => {
            info!("(scheduler) Process created for '{}' [PID {}].", name, pid);
            pid
        }
        Err(err) => {
            error!("(scheduler) Failed to create process '{}': {:?}", name, err);
            -1
        }
    }
}

/// Dispatch: establish the kernel continuation, switch to the task
/// stack and call its entry. `__dispatch_task` returns once the task
/// has exited, yielded or blocked; the reaping pass then runs on the
/// restored kernel stack.
fn run_process(idx: usize) {
    let (pid, entry, stack_top) = {
        let mut table = PROC_TABLE.lock();
        let slot = table.get_mut(idx);
        if slot.state == ProcState::Free || slot.entry == 0 {
            return;
        }
        slot.state = ProcState::Running;
        (slot.pid, slot.entry, slot.stack_top)
    };

    info!("(scheduler) Starting process...");
    CURRENT.store(pid, Relaxed);
    unsafe { arch::__dispatch_task(entry, stack_top) };
    scheduler_process_return();
}

/// Runs after every dispatch, back on the kernel stack: reap the slot
/// if the task is gone and clear the current marker.
pub fn scheduler_process_return() {
    let pid = CURRENT.load(Relaxed);
    PROC_TABLE.lock().reap_after_dispatch(pid);
    CURRENT.store(-1, Relaxed);
}

/// Synchronous dispatch of one task; returns once it has been reaped
/// or has yielded. -1 when the pid does not exist.
pub fn scheduler_run_pid(pid: i32) -> i32 {
    let idx = match PROC_TABLE.lock().slot_of_pid(pid) {
        Some(idx) => idx,
        None => return -1,
    };
    run_process(idx);
    info!("(scheduler) Process finished or exited...");
    0
}

/// Top-level scheduler loop: make sure the shell exists, then
/// round-robin over runnable tasks, idling on `wfi` when there are
/// none.
pub fn scheduler_main() -> ! {
    info!("(scheduler) Entering main loop...");

    if proc_count() == 0 {
        let pid = create_process(
            crate::shell::shell_main as usize,
            "shell",
            DEFAULT_STACK_SIZE,
        );
        if pid < 0 {
            error!("(scheduler) Failed to create shell process...");
        }
    }

    let mut cursor = 0usize;
    loop {
        let next = PROC_TABLE.lock().find_next_ready(cursor);
        match next {
            Some(idx) => {
                cursor = (idx + 1) % MAX_PROCS;
                run_process(idx);
            }
            None => idle_wait(),
        }
    }
}

fn idle_wait() {
    #[cfg(target_arch = "riscv64")]
    unsafe {
        core::arch::asm!("wfi")
    };
    #[cfg(not(target_arch = "riscv64"))]
    core::hint::spin_loop();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_heap(bytes: usize) -> (Vec<u8>, BumpAllocator) {
        let mut backing = vec![0u8; bytes];
        let start = backing.as_mut_ptr() as usize;
        let mut heap = BumpAllocator::empty();
        heap.init(start, start + bytes);
        (backing, heap)
    }

    fn assert_free_iff_pid_zero(table: &ProcTable) {
        for p in table.slots() {
            assert_eq!(
                p.state == ProcState::Free,
                p.pid == 0,
                "slot state/pid invariant broken"
            );
        }
    }

    #[test]
    fn init_is_idempotent() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(64 * 1024);
        table.create(&mut heap, 0x1000, "a", 512).unwrap();
        table.init();
        table.init();
        assert_eq!(table.count(), 0);
        assert_eq!(table.next_pid(), 1);
        assert_free_iff_pid_zero(&table);
    }

    #[test]
    fn pids_are_strictly_increasing() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(64 * 1024);
        let a = table.create(&mut heap, 0x1000, "a", 512).unwrap();
        let b = table.create(&mut heap, 0x1000, "b", 512).unwrap();
        table.terminate(a);
        table.reap_after_dispatch(a);
        let c = table.create(&mut heap, 0x1000, "c", 512).unwrap();
        assert!(a < b && b < c, "pids must not be reused");
    }

    #[test]
    fn stack_top_is_sixteen_byte_aligned() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(64 * 1024);
        for size in [512usize, 1000, 4096] {
            let pid = table.create(&mut heap, 0x1000, "t", size).unwrap();
            let idx = table.slot_of_pid(pid).unwrap();
            let slot = table.get(idx);
            assert_eq!(slot.stack_top % 16, 0);
            assert!(slot.stack_top <= slot.stack_base + slot.stack_size);
            assert!(slot.stack_top > slot.stack_base);
        }
    }

    #[test]
    fn seventeenth_create_fails_without_mutation() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(1 << 20);
        for _ in 0..MAX_PROCS {
            table.create(&mut heap, 0x1000, "t", 512).unwrap();
        }
        let next_pid = table.next_pid();
        assert_eq!(
            table.create(&mut heap, 0x1000, "extra", 512),
            Err(SchedError::TableFull)
        );
        assert_eq!(table.next_pid(), next_pid);
        assert_eq!(table.count(), MAX_PROCS);
        assert_free_iff_pid_zero(&table);
    }

    #[test]
    fn allocation_failure_does_not_consume_the_slot() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(64);
        assert_eq!(
            table.create(&mut heap, 0x1000, "big", 4096),
            Err(SchedError::OutOfMemory)
        );
        assert_eq!(table.count(), 0);
        assert_eq!(table.next_pid(), 1);
        assert_free_iff_pid_zero(&table);
    }

    #[test]
    fn terminate_and_reap_restores_the_slot() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(64 * 1024);
        let pid = table.create(&mut heap, 0x1000, "victim", 512).unwrap();
        table.terminate(pid);
        table.reap_after_dispatch(pid);
        assert_eq!(table.count(), 0);
        assert_eq!(table.slot_of_pid(pid), None);
        assert_free_iff_pid_zero(&table);
        // Only next_pid differs from the pre-create state.
        assert_eq!(table.next_pid(), pid + 1);
    }

    #[test]
    fn natural_return_is_reaped_like_a_zombie() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(64 * 1024);
        let pid = table.create(&mut heap, 0x1000, "ret", 512).unwrap();
        let idx = table.slot_of_pid(pid).unwrap();
        table.get_mut(idx).state = ProcState::Running;
        table.reap_after_dispatch(pid);
        assert_eq!(table.count(), 0);
        assert_free_iff_pid_zero(&table);
    }

    #[test]
    fn yielded_task_survives_the_reaping_pass() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(64 * 1024);
        let pid = table.create(&mut heap, 0x1000, "y", 512).unwrap();
        let idx = table.slot_of_pid(pid).unwrap();
        table.get_mut(idx).state = ProcState::Ready;
        table.reap_after_dispatch(pid);
        assert_eq!(table.get(idx).state, ProcState::Ready);
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn round_robin_scan_is_circular_and_skips_non_runnable() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(1 << 20);
        for _ in 0..4 {
            table.create(&mut heap, 0x1000, "t", 512).unwrap();
        }
        // Slots 0..4 are Ready. Block 1, zombify 2.
        table.get_mut(1).state = ProcState::BlockedSem;
        table.get_mut(2).state = ProcState::Zombie;

        assert_eq!(table.find_next_ready(0), Some(0));
        assert_eq!(table.find_next_ready(1), Some(3));
        assert_eq!(table.find_next_ready(4), Some(0), "scan must wrap");
        table.get_mut(3).state = ProcState::Running;
        assert_eq!(
            table.find_next_ready(1),
            Some(3),
            "a Running slot is still runnable"
        );
    }

    #[test]
    fn find_next_ready_on_empty_table_is_none() {
        let table = ProcTable::new();
        assert_eq!(table.find_next_ready(0), None);
    }

    #[test]
    fn create_from_binary_copies_the_image() {
        let mut table = ProcTable::new();
        let (backing, mut heap) = test_heap(64 * 1024);
        let image = [0x13u8, 0x05, 0x00, 0x00, 0x73, 0x00, 0x00, 0x00];
        let pid = table
            .create_from_binary(&mut heap, &image, "img", 512)
            .unwrap();
        let idx = table.slot_of_pid(pid).unwrap();
        let slot = table.get(idx);
        assert_eq!(slot.entry % 16, 0);
        assert_ne!(slot.entry, 0);
        let base = backing.as_ptr() as usize;
        let copied = &backing[slot.entry - base..slot.entry - base + image.len()];
        assert_eq!(copied, &image);
    }

    #[test]
    fn long_names_are_truncated_to_fifteen_chars() {
        let mut table = ProcTable::new();
        let (_backing, mut heap) = test_heap(64 * 1024);
        let pid = table
            .create(&mut heap, 0x1000, "a-very-long-process-name", 512)
            .unwrap();
        let idx = table.slot_of_pid(pid).unwrap();
        assert_eq!(table.get(idx).name().len(), NAME_LEN - 1);
    }
}
