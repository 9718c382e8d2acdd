use core::sync::atomic::Ordering::Relaxed;

use log::error;

use crate::arch::{TrapFrame, KERNEL_RESUME_PC};
use crate::console::{print_hex, print_str};
use crate::kernel::syscall::{dispatch_syscall, SyscallOutcome};

/// `ecall` cause codes for U-, S- and M-mode. Tasks execute with
/// machine privileges, so 11 is the code seen in practice; the other
/// two are accepted as equivalent entry points.
const CAUSE_ECALL_UMODE: usize = 8;
const CAUSE_ECALL_SMODE: usize = 9;
const CAUSE_ECALL_MMODE: usize = 11;

/// `ecall` is a 4-byte instruction.
const ECALL_INSN_BYTES: usize = 4;

#[cfg(target_arch = "riscv64")]
pub fn init() {
    use riscv::register::mtvec::{self, TrapMode};
    unsafe { mtvec::write(crate::arch::trap_entry as usize, TrapMode::Direct) };
}

#[cfg(target_arch = "riscv64")]
pub fn installed() -> bool {
    riscv::register::mtvec::read().address() != 0
}

#[cfg(not(target_arch = "riscv64"))]
pub fn init() {}

#[cfg(not(target_arch = "riscv64"))]
pub fn installed() -> bool {
    true
}

/// High-level trap handler, called from the trampoline with a pointer
/// to the saved frame. Returns the frame the trampoline should restore.
///
/// Environment calls either resume the task (result in `a0`, `mepc`
/// stepped past the `ecall`) or long-jump back to the scheduler by
/// rewriting `mepc` to the saved kernel continuation. Every other
/// cause is fatal.
#[no_mangle]
pub extern "C" fn trap_handler(frame: *mut TrapFrame) -> *mut TrapFrame {
    let tf = unsafe { &mut *frame };

    // Manual decode (crate-version independent)
    let xlen_msb = usize::BITS as usize - 1;
    let is_interrupt = (tf.mcause >> xlen_msb) & 1 != 0;
    let code = tf.mcause & ((1usize << xlen_msb) - 1);

    if is_interrupt {
        // No interrupt source is ever enabled in the cooperative core.
        unhandled_trap(tf);
    }

    match code {
        CAUSE_ECALL_UMODE | CAUSE_ECALL_SMODE | CAUSE_ECALL_MMODE => {
            let args = [tf.a0, tf.a1, tf.a2, tf.a3];
            match dispatch_syscall(tf.a7, args) {
                SyscallOutcome::Resume(ret) => {
                    if let Some(val) = ret {
                        tf.a0 = val as usize;
                    }
                    tf.mepc = tf.mepc.wrapping_add(ECALL_INSN_BYTES);
                }
                SyscallOutcome::Schedule => {
                    tf.mepc = KERNEL_RESUME_PC.load(Relaxed);
                }
            }
            frame
        }
        _ => unhandled_trap(tf),
    }
}

fn unhandled_trap(tf: &TrapFrame) -> ! {
    print_str("Error: Unhandled trap! mcause = ");
    print_hex(tf.mcause as u32);
    print_str("\n");
    error!("(trap) mepc={:#x} mtval={:#x}", tf.mepc, tf.mtval);
    loop {
        #[cfg(target_arch = "riscv64")]
        unsafe {
            core::arch::asm!("wfi")
        };
        core::hint::spin_loop();
    }
}
