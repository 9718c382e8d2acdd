//! User programs embedded in the kernel image.
//!
//! Each record carries a flat position-independent RV64 binary and the
//! assembly source it was built from. The binaries are hand-assembled
//! encodings of the sources under `user/`; keep the two in sync when a
//! program changes. At init the sources are published under
//! `/user_programs` so the shell can list and run them.

use crate::fs::{Fs, MAX_FILE_SIZE, MAX_NAME_LEN};

pub struct EmbeddedProgram {
    pub name: &'static str,
    pub binary: &'static [u8],
    pub source: &'static str,
}

static HELLO_BIN: [u8; 12] = [
    0x13, 0x05, 0x00, 0x00, // li   a0, 0
    0x93, 0x08, 0xd0, 0x05, // li   a7, 93
    0x73, 0x00, 0x00, 0x00, // ecall
];

static COUNTER_BIN: [u8; 24] = [
    0x93, 0x02, 0x50, 0x00, // li   t0, 5
    0x93, 0x82, 0xf2, 0xff, // addi t0, t0, -1
    0xe3, 0x9e, 0x02, 0xfe, // bnez t0, -4
    0x13, 0x05, 0x00, 0x00, // li   a0, 0
    0x93, 0x08, 0xd0, 0x05, // li   a7, 93
    0x73, 0x00, 0x00, 0x00, // ecall
];

static NOOP_BIN: [u8; 4] = [
    0x67, 0x80, 0x00, 0x00, // ret
];

pub static EMBEDDED_PROGRAMS: &[EmbeddedProgram] = &[
    EmbeddedProgram {
        name: "hello",
        binary: &HELLO_BIN,
        source: include_str!("../../user/hello.S"),
    },
    EmbeddedProgram {
        name: "counter",
        binary: &COUNTER_BIN,
        source: include_str!("../../user/counter.S"),
    },
    EmbeddedProgram {
        name: "noop",
        binary: &NOOP_BIN,
        source: include_str!("../../user/noop.S"),
    },
];

/// Looks a program up by base name (no `.S` extension).
pub fn find(base: &str) -> Option<&'static EmbeddedProgram> {
    EMBEDDED_PROGRAMS.iter().find(|p| p.name == base)
}

/// Publishes each program's assembly source as
/// `/user_programs/<name>.S`.
pub fn publish(fs: &mut Fs) -> bool {
    if EMBEDDED_PROGRAMS.is_empty() {
        return false;
    }

    let root = fs.root();
    let Some(dir) = fs.mkdir_recursive(root, "user_programs") else {
        return false;
    };

    for prog in EMBEDDED_PROGRAMS {
        let mut name_buf = [0u8; MAX_NAME_LEN];
        let Some(filename) = source_filename(prog.name, &mut name_buf) else {
            return false;
        };
        let Some(id) = fs.touch(dir, filename) else {
            return false;
        };
        let file = fs.file_mut(id);
        let len = prog.source.len().min(MAX_FILE_SIZE);
        file.data[..len].copy_from_slice(&prog.source.as_bytes()[..len]);
        file.size = len;
    }
    true
}

fn source_filename<'a>(base: &str, buf: &'a mut [u8; MAX_NAME_LEN]) -> Option<&'a str> {
    let total = base.len() + 2;
    if total >= MAX_NAME_LEN {
        return None;
    }
    buf[..base.len()].copy_from_slice(base.as_bytes());
    buf[base.len()..total].copy_from_slice(b".S");
    core::str::from_utf8(&buf[..total]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs;
    use crate::test_support;

    #[test]
    fn binaries_are_word_aligned_and_end_in_ecall_or_ret() {
        for prog in EMBEDDED_PROGRAMS {
            assert!(!prog.binary.is_empty(), "{} has no binary", prog.name);
            assert_eq!(
                prog.binary.len() % 4,
                0,
                "{} is not a whole number of instructions",
                prog.name
            );
            let tail = &prog.binary[prog.binary.len() - 4..];
            let ecall = [0x73, 0x00, 0x00, 0x00];
            let ret = [0x67, 0x80, 0x00, 0x00];
            assert!(
                tail == ecall || tail == ret,
                "{} does not terminate",
                prog.name
            );
        }
    }

    #[test]
    fn find_resolves_base_names_only() {
        assert!(find("hello").is_some());
        assert!(find("counter").is_some());
        assert!(find("hello.S").is_none());
        assert!(find("missing").is_none());
    }

    #[test]
    fn publish_creates_one_source_file_per_program() {
        let _guard = test_support::lock_kernel();
        fs::with_fs(|f| {
            f.reset();
            assert!(publish(f));

            let root = f.root();
            let dir = f.find_subdir(root, "user_programs").unwrap();
            assert_eq!(f.dir(dir).files().len(), EMBEDDED_PROGRAMS.len());

            let id = f.find_file(dir, "hello.S").unwrap();
            let hello = find("hello").unwrap();
            assert_eq!(f.file(id).contents(), hello.source.as_bytes());
        });
    }

    #[test]
    fn publish_is_not_idempotent_but_reports_failure() {
        let _guard = test_support::lock_kernel();
        fs::with_fs(|f| {
            f.reset();
            assert!(publish(f));
            // The directory already holds the files, so touch fails.
            assert!(!publish(f));
        });
    }
}
