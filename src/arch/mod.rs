pub mod trap;

use core::sync::atomic::AtomicUsize;

// === Trap frame layout saved by trap.S ===
// 20 * 8 = 160 bytes total on RV64

/// Caller-saved register frame pushed onto the interrupted stack by the
/// trampoline in `trap.S`. The field order is the frame layout; keep it
/// in sync with the assembly.
#[repr(C)]
pub struct TrapFrame {
    pub ra: usize,
    pub t0: usize,
    pub t1: usize,
    pub t2: usize,
    pub a0: usize,
    pub a1: usize,
    pub a2: usize,
    pub a3: usize,
    pub a4: usize,
    pub a5: usize,
    pub a6: usize,
    pub a7: usize,
    pub t3: usize,
    pub t4: usize,
    pub t5: usize,
    pub t6: usize,
    pub mepc: usize,
    pub mcause: usize,
    pub mtval: usize,
    _reserved: usize,
}

const _: () = {
    assert!(core::mem::size_of::<TrapFrame>() == 160);
    assert!(core::mem::offset_of!(TrapFrame, a0) == 32);
    assert!(core::mem::offset_of!(TrapFrame, a7) == 88);
    assert!(core::mem::offset_of!(TrapFrame, mepc) == 128);
    assert!(core::mem::offset_of!(TrapFrame, mcause) == 136);
};

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            ra: 0,
            t0: 0,
            t1: 0,
            t2: 0,
            a0: 0,
            a1: 0,
            a2: 0,
            a3: 0,
            a4: 0,
            a5: 0,
            a6: 0,
            a7: 0,
            t3: 0,
            t4: 0,
            t5: 0,
            t6: 0,
            mepc: 0,
            mcause: 0,
            mtval: 0,
            _reserved: 0,
        }
    }
}

/// Saved kernel continuation: the scheduler's stack pointer and resume
/// address, written by `__dispatch_task` before every dispatch and read
/// by the trap handler to long-jump back. A single slot; it is only
/// valid between a dispatch and its corresponding return.
#[no_mangle]
pub static KERNEL_SAVED_SP: AtomicUsize = AtomicUsize::new(0);

#[no_mangle]
pub static KERNEL_RESUME_PC: AtomicUsize = AtomicUsize::new(0);

#[cfg(target_arch = "riscv64")]
core::arch::global_asm!(include_str!("trap.S"));

// Provided by trap.S
#[cfg(target_arch = "riscv64")]
extern "C" {
    /// Trampoline installed in `mtvec`.
    pub fn trap_entry();
    /// Switches to the task stack and calls `entry`. Returns once the
    /// task has exited, yielded or blocked.
    pub fn __dispatch_task(entry: usize, stack_top: usize);
}

#[cfg(not(target_arch = "riscv64"))]
pub unsafe fn __dispatch_task(_entry: usize, _stack_top: usize) {
    unreachable!("task dispatch only exists on the riscv64 kernel build");
}
