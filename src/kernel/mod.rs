//! Kernel bring-up: the boot-time service checklist and the hand-off
//! to the scheduler.

pub mod sem;
pub mod syscall;
pub mod task;

use crate::arch::trap;
use crate::{fs, mem, userprog};

struct Service {
    name: &'static str,
    check: fn() -> bool,
}

const SERVICES: &[Service] = &[
    Service {
        name: "scheduler",
        check: service_scheduler,
    },
    Service {
        name: "memory",
        check: service_memory,
    },
    Service {
        name: "traps",
        check: service_traps,
    },
    Service {
        name: "filesystem",
        check: service_filesystem,
    },
    Service {
        name: "user programs",
        check: service_userprog,
    },
];

fn service_scheduler() -> bool {
    task::scheduler_init()
}

fn service_memory() -> bool {
    mem::init_kernel_heap();

    // Write/read-back probe on a fresh allocation.
    let Some(addr) = mem::kmalloc(16) else {
        return false;
    };
    unsafe {
        let probe = addr as *mut u8;
        probe.write_volatile(0xAA);
        probe.add(1).write_volatile(0x55);
        probe.read_volatile() == 0xAA && probe.add(1).read_volatile() == 0x55
    }
}

fn service_traps() -> bool {
    trap::init();
    trap::installed()
}

fn service_filesystem() -> bool {
    fs::init()
}

fn service_userprog() -> bool {
    fs::with_fs(userprog::publish)
}

#[cfg(target_arch = "riscv64")]
fn privilege_mode_name() -> &'static str {
    use riscv::register::mstatus::{self, MPP};
    match mstatus::read().mpp() {
        MPP::Machine => "Machine Mode",
        MPP::Supervisor => "Supervisor Mode",
        MPP::User => "User Mode",
    }
}

#[cfg(not(target_arch = "riscv64"))]
fn privilege_mode_name() -> &'static str {
    "Machine Mode"
}

/// Entry point after boot. Never returns; ends up in the scheduler's
/// dispatch loop.
pub fn kernel_main() -> ! {
    crate::logging::init();

    println!(
        "(kernel) {} Active. Starting rvOS v0.1...",
        privilege_mode_name()
    );

    println!("(kernel) Initializing services:");
    println!("  • console........ OK");
    for service in SERVICES {
        let ok = (service.check)();
        println!(
            "  • {}........ {}",
            service.name,
            if ok { "OK" } else { "FAIL" }
        );
    }

    println!();
    println!("(kernel) System ready. Starting scheduler...");
    println!("================================");
    println!();

    task::scheduler_main()
}
