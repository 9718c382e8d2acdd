//! rvOS: a cooperative operating system for the RISC-V 64 `virt` board.
//!
//! The kernel boots without firmware, runs in machine mode, schedules
//! tasks cooperatively and traps `ecall`s as system calls. The library
//! also builds for the host so the table, allocator and filesystem
//! logic can be exercised by ordinary cargo tests; everything that
//! touches CSRs or hand-written assembly is gated on `riscv64`.

#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod console;

pub mod arch;
pub mod drivers;
pub mod fs;
pub mod kernel;
pub mod logging;
pub mod mem;
pub mod shell;
pub mod userprog;

#[cfg(all(target_arch = "riscv64", not(test)))]
mod panic_handler;
