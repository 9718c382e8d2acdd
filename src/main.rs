#![cfg_attr(target_arch = "riscv64", no_std)]
#![cfg_attr(target_arch = "riscv64", no_main)]

#[cfg(target_arch = "riscv64")]
#[riscv_rt::entry]
fn main() -> ! {
    rvos::kernel::kernel_main()
}

/// The kernel only runs on riscv64; the host build exists for the test
/// suite, which lives in the library.
#[cfg(not(target_arch = "riscv64"))]
fn main() {}
