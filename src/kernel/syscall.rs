//! System-call numbers and the dispatch table the trap handler drives.
//!
//! ABI: number in `a7`, arguments in `a0..a3`, result in `a0`.

use log::warn;

use crate::kernel::sem::{self, WaitOutcome};
use crate::kernel::task;

pub const SYSCALL_EXIT: usize = 93;
pub const SYSCALL_YIELD: usize = 124;
pub const SYSCALL_SEM_CREATE: usize = 150;
pub const SYSCALL_SEM_WAIT: usize = 151;
pub const SYSCALL_SEM_SIGNAL: usize = 152;
pub const SYSCALL_SEM_DESTROY: usize = 153;

/// What the trap handler does after a syscall has been serviced.
pub enum SyscallOutcome {
    /// Store the optional result in `a0` and step `mepc` past the
    /// `ecall` so the task resumes in place.
    Resume(Option<i64>),
    /// Rewrite `mepc` to the saved kernel continuation; the `mret`
    /// lands in the scheduler's post-dispatch code.
    Schedule,
}

pub fn dispatch_syscall(id: usize, args: [usize; 4]) -> SyscallOutcome {
    match id {
        SYSCALL_EXIT => {
            let pid = task::current_pid();
            if pid > 0 {
                task::terminate_process(pid);
            }
            SyscallOutcome::Schedule
        }
        SYSCALL_YIELD => {
            task::yield_current();
            SyscallOutcome::Schedule
        }
        SYSCALL_SEM_CREATE => {
            let id = sem::sem_create(args[0] as i32);
            SyscallOutcome::Resume(Some(id as i64))
        }
        SYSCALL_SEM_WAIT => match sem::sem_wait(args[0] as i32) {
            WaitOutcome::Acquired => SyscallOutcome::Resume(Some(0)),
            WaitOutcome::NotFound => SyscallOutcome::Resume(Some(-1)),
            WaitOutcome::MustBlock => SyscallOutcome::Schedule,
        },
        SYSCALL_SEM_SIGNAL => {
            let ok = sem::sem_signal(args[0] as i32);
            SyscallOutcome::Resume(Some(if ok { 0 } else { -1 }))
        }
        SYSCALL_SEM_DESTROY => {
            let ok = sem::sem_destroy(args[0] as i32);
            SyscallOutcome::Resume(Some(if ok { 0 } else { -1 }))
        }
        _ => {
            // The offending task is not terminated; it resumes past the
            // ecall with an undefined result.
            warn!("(trap) Unknown syscall {:#010x}, ignoring.", id);
            SyscallOutcome::Resume(None)
        }
    }
}
