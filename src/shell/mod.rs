//! Interactive command-line shell on the UART console.
//!
//! The shell runs as an ordinary task (it is the one the scheduler
//! creates at boot) and drives the filesystem, the process table and
//! the embedded user programs through a fixed command table.

use crate::drivers::uart;
use crate::fs::{self, DirId, Fs, MAX_DIRS, MAX_FILES, MAX_FILE_SIZE};
use crate::kernel::task::{self, ProcState, DEFAULT_STACK_SIZE};
use crate::userprog;

const LINE_LEN: usize = 128;
const CTRL_D: u8 = 4;

struct Command {
    name: &'static str,
    run: fn(&mut Shell, &str),
}

const COMMANDS: &[Command] = &[
    Command { name: "help", run: cmd_help },
    Command { name: "echo", run: cmd_echo },
    Command { name: "clear", run: cmd_clear },
    Command { name: "mkdir", run: cmd_mkdir },
    Command { name: "rmdir", run: cmd_rmdir },
    Command { name: "ls", run: cmd_ls },
    Command { name: "touch", run: cmd_touch },
    Command { name: "rm", run: cmd_rm },
    Command { name: "mv", run: cmd_mv },
    Command { name: "cd", run: cmd_cd },
    Command { name: "df", run: cmd_df },
    Command { name: "pwd", run: cmd_pwd },
    Command { name: "ps", run: cmd_ps },
    Command { name: "cat", run: cmd_cat },
    Command { name: "edit", run: cmd_edit },
    Command { name: "append", run: cmd_append },
    Command { name: "run", run: cmd_run },
    Command { name: "exit", run: cmd_exit },
];

pub struct Shell {
    cwd: DirId,
}

/// Shell task entry; dispatched by the scheduler and never returns.
pub extern "C" fn shell_main() {
    let mut shell = Shell {
        cwd: fs::with_fs(|f| f.root()),
    };
    let mut line = [0u8; LINE_LEN];

    loop {
        shell.print_prompt();
        let len = read_line(&mut line);
        let input = core::str::from_utf8(&line[..len]).unwrap_or("");
        shell.handle_command(input);
    }
}

impl Shell {
    fn print_prompt(&self) {
        print!("(shell) user [");
        fs::with_fs(|f| {
            if self.cwd == f.root() {
                print!("/");
            } else {
                print!("../{}", f.dir(self.cwd).name());
            }
        });
        print!("] > ");
    }

    fn handle_command(&mut self, line: &str) {
        let (cmd, args) = split_command(line);
        if cmd.is_empty() {
            return;
        }
        match COMMANDS.iter().find(|c| c.name == cmd) {
            Some(command) => (command.run)(self, args),
            None => println!("Unknown command: {}", cmd),
        }
    }
}

/// First word is the command; the rest (leading spaces stripped) is the
/// argument string.
pub(crate) fn split_command(line: &str) -> (&str, &str) {
    match line.find(' ') {
        None => (line, ""),
        Some(pos) => (&line[..pos], line[pos..].trim_start_matches(' ')),
    }
}

/// Reads one line, echoing as it goes. Handles backspace and swallows
/// arrow-key escape sequences; Enter finishes the line.
fn read_line(buf: &mut [u8]) -> usize {
    let mut pos = 0;
    loop {
        let c = uart::getchar();
        match c {
            0x1b => {
                // ESC [ <code>: ignore the whole sequence.
                let _ = uart::getchar();
                let _ = uart::getchar();
            }
            b'\r' | b'\n' => {
                uart::putchar(b'\n');
                return pos;
            }
            0x08 | 0x7f => {
                if pos > 0 {
                    pos -= 1;
                    crate::console::print_str("\x08 \x08");
                }
            }
            _ => {
                if pos < buf.len() - 1 {
                    buf[pos] = c;
                    pos += 1;
                    uart::putchar(c);
                }
            }
        }
    }
}

/// Strips a leading `./` so relative names match directory entries.
pub(crate) fn resolve_path(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

/// Walks a path with `.`/`..` components from `start` (or the root for
/// absolute paths).
pub(crate) fn traverse_path(f: &Fs, path: &str, start: DirId) -> Option<DirId> {
    if path.is_empty() {
        return None;
    }
    let mut dir = if path.starts_with('/') { f.root() } else { start };
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if let Some(parent) = f.dir(dir).parent {
                    dir = parent;
                }
            }
            name => dir = f.find_subdir(dir, name)?,
        }
    }
    Some(dir)
}

fn cmd_help(_shell: &mut Shell, _args: &str) {
    println!("Available Commands:");
    println!("  • 'help'\t\tShow this help message.");
    println!("  • 'echo <args>'\tEcho arguments.");
    println!("  • 'clear'\t\tClear the screen.");
    println!("  • 'mkdir <name>'\tCreate a new directory.");
    println!("  • 'rmdir <name>'\tRemove a directory.");
    println!("  • 'ls'\t\tList files and directories.");
    println!("  • 'touch <name>'\tCreate a new file.");
    println!("  • 'rm <name>'\t\tDelete a file.");
    println!("  • 'run <name>'\tRun a user program.");
    println!("  • 'mv <src> <dest>'\tMove a file to another directory.");
    println!("  • 'cd <dir>'\t\tChange current directory.");
    println!("  • 'df'\t\tDisplay current storage and resources.");
    println!("  • 'pwd'\t\tPrint current working directory.");
    println!("  • 'ps'\t\tDisplay all currently running processes.");
    println!("  • 'cat <name>'\tDump a file's contents to the console.");
    println!("  • 'edit <name>'\tOverwrite a file's contents.");
    println!("  • 'append <name>'\tAppend to a file's contents.");
    println!("  • 'exit'\t\tAdvises the user on how to exit the OS.");
}

fn cmd_echo(_shell: &mut Shell, args: &str) {
    println!("{}", args);
}

fn cmd_clear(_shell: &mut Shell, _args: &str) {
    // ANSI: clear screen, home cursor.
    print!("\x1b[2J\x1b[H");
}

fn cmd_mkdir(shell: &mut Shell, args: &str) {
    if args.is_empty() {
        println!("Usage: mkdir <path>");
        return;
    }
    let created = fs::with_fs(|f| f.mkdir_recursive(shell.cwd, args).is_some());
    if created {
        println!("Directory created.");
    } else {
        println!("Failed to create directory.");
    }
}

fn cmd_rmdir(shell: &mut Shell, args: &str) {
    if fs::with_fs(|f| f.rmdir(shell.cwd, args)) {
        println!("Directory removed.");
    } else {
        println!("Failed to remove directory (not empty or does not exist).");
    }
}

fn cmd_ls(shell: &mut Shell, args: &str) {
    fs::with_fs(|f| {
        let dir = if args.is_empty() {
            Some(shell.cwd)
        } else {
            f.find_subdir_recursive(shell.cwd, args)
        };
        let Some(dir) = dir else {
            println!("Error: invalid directory");
            return;
        };

        println!("Directories:");
        if f.dir(dir).subdirs().is_empty() {
            println!("  • (none)");
        }
        for &sub in f.dir(dir).subdirs() {
            println!("  • {}", f.dir(sub).name());
        }

        println!("Files:");
        if f.dir(dir).files().is_empty() {
            println!("  • (none)");
        }
        for &file in f.dir(dir).files() {
            println!("  • {}", f.file(file).name());
        }
    });
}

fn cmd_touch(shell: &mut Shell, args: &str) {
    if args.is_empty() {
        println!("Usage: touch <path>");
        return;
    }
    fs::with_fs(|f| match f.touch_recursive(shell.cwd, args) {
        None => println!("Invalid path."),
        Some((parent, name)) => {
            if f.touch(parent, name).is_some() {
                println!("File created.");
            } else {
                println!("Failed to create file.");
            }
        }
    });
}

fn cmd_rm(shell: &mut Shell, args: &str) {
    if fs::with_fs(|f| f.rm(shell.cwd, args)) {
        println!("File removed.");
    } else {
        println!("File not found.");
    }
}

fn cmd_mv(shell: &mut Shell, args: &str) {
    let (src, dest) = split_command(args);
    if src.is_empty() || dest.is_empty() {
        println!("Usage: mv <src> <dest>");
        return;
    }

    fs::with_fs(|f| {
        let src_name = resolve_path(src);
        let Some(dest_dir) = traverse_path(f, dest, shell.cwd) else {
            println!("Move failed: invalid destination");
            return;
        };
        if f.mv(shell.cwd, src_name, dest_dir) {
            println!("Moved successfully.");
        } else {
            println!("Move failed.");
        }
    });
}

fn cmd_cd(shell: &mut Shell, args: &str) {
    if args.is_empty() {
        return;
    }
    match fs::with_fs(|f| traverse_path(f, args, shell.cwd)) {
        Some(dir) => shell.cwd = dir,
        None => println!("Error: directory not found"),
    }
}

fn cmd_df(_shell: &mut Shell, _args: &str) {
    fs::with_fs(|f| {
        println!("Resource\tUsed\tFree\tMax");
        println!("-------------------------------------");
        println!(
            "Directories\t{}\t{}\t{}",
            f.used_dirs(),
            f.free_dirs(),
            MAX_DIRS
        );
        println!(
            "Files\t\t{}\t{}\t{}",
            f.used_files(),
            f.free_files(),
            MAX_FILES
        );
        println!();
        println!("Used Space: {} KB", f.total_file_bytes() / 1024);
        println!("Total Space: {} KB", (MAX_FILES * MAX_FILE_SIZE) / 1024);
    });
}

fn cmd_pwd(shell: &mut Shell, _args: &str) {
    fs::with_fs(|f| {
        // Collect the chain up to the root, then print it top-down.
        let mut chain = [0 as DirId; MAX_DIRS];
        let mut depth = 0;
        let mut current = shell.cwd;
        while let Some(parent) = f.dir(current).parent {
            chain[depth] = current;
            depth += 1;
            current = parent;
        }
        if depth == 0 {
            println!("/");
            return;
        }
        for i in (0..depth).rev() {
            print!("/{}", f.dir(chain[i]).name());
        }
        println!();
    });
}

fn cmd_ps(_shell: &mut Shell, _args: &str) {
    println!("PID\tName\t\tState");
    println!("-------------------------------");
    task::with_table(|table| {
        for proc in table.slots() {
            if proc.state == ProcState::Free {
                continue;
            }
            let pad = if proc.name().len() < 8 { "\t\t" } else { "\t" };
            println!(
                "{}\t{}{}{}",
                proc.pid,
                proc.name(),
                pad,
                state_name(proc.state)
            );
        }
    });
}

fn state_name(state: ProcState) -> &'static str {
    match state {
        ProcState::Free => "FREE",
        ProcState::Ready => "READY",
        ProcState::Running => "RUNNING",
        ProcState::BlockedSem => "BLOCKED",
        ProcState::Zombie => "ZOMBIE",
    }
}

fn cmd_cat(shell: &mut Shell, args: &str) {
    if args.is_empty() {
        println!("Usage: cat <filename>");
        return;
    }
    fs::with_fs(|f| match f.find_file(shell.cwd, args) {
        None => println!("File not found"),
        Some(id) => {
            for &byte in f.file(id).contents() {
                uart::putchar(byte);
            }
            uart::putchar(b'\n');
        }
    });
}

fn cmd_edit(shell: &mut Shell, args: &str) {
    edit_file(shell, args, false);
}

fn cmd_append(shell: &mut Shell, args: &str) {
    edit_file(shell, args, true);
}

fn edit_file(shell: &mut Shell, args: &str, append: bool) {
    if args.is_empty() {
        println!("Usage: edit|append <filename>");
        return;
    }
    let Some(id) = fs::with_fs(|f| f.find_file(shell.cwd, args)) else {
        println!("File not found");
        return;
    };

    println!(
        "{}",
        if append {
            "Append mode (Ctrl+D to finish):"
        } else {
            "Enter new content (end with Ctrl+D):"
        }
    );

    let mut pos = fs::with_fs(|f| {
        let file = f.file_mut(id);
        if !append {
            file.size = 0;
        }
        file.size
    });

    while pos < MAX_FILE_SIZE {
        let c = uart::getchar();
        if c == CTRL_D {
            break;
        }
        let byte = if c == b'\r' || c == b'\n' {
            uart::putchar(b'\n');
            b'\n'
        } else {
            uart::putchar(c);
            c
        };
        fs::with_fs(|f| f.file_mut(id).data[pos] = byte);
        pos += 1;
    }

    fs::with_fs(|f| f.file_mut(id).size = pos);
    println!();
    println!("File updated.");
}

/// `run <prog>.S`: validates the argument, then hands the embedded
/// binary to the scheduler and runs it to completion.
fn cmd_run(shell: &mut Shell, args: &str) {
    if args.is_empty() {
        println!("Usage: run <program.S>");
        return;
    }

    let in_programs_dir = fs::with_fs(|f| f.dir(shell.cwd).name() == "user_programs");
    if !in_programs_dir {
        println!("Error: No user programs were found");
        return;
    }

    let base = match program_base(args) {
        Ok(base) => base,
        Err(msg) => {
            println!("{}", msg);
            return;
        }
    };

    let Some(prog) = userprog::find(base) else {
        println!("Error: Program has no binary or doesn't exist");
        return;
    };

    let pid = task::create_process_from_binary(prog.binary, base, DEFAULT_STACK_SIZE);
    if pid <= 0 {
        println!("Error: Failed to create process");
    } else {
        task::scheduler_run_pid(pid);
    }
}

/// Requires the `.S` extension and a non-empty base name.
pub(crate) fn program_base(args: &str) -> Result<&str, &'static str> {
    let Some(base) = args.strip_suffix(".S") else {
        return Err("Error: You must specify an assembly (.S) file");
    };
    if base.is_empty() {
        return Err("Error: Invalid program name");
    }
    Ok(base)
}

fn cmd_exit(_shell: &mut Shell, _args: &str) {
    println!("To perform a clean exit, use 'Ctrl+A X'.");
    println!("Otherwise, use 'Ctrl+A C' to enter the QEMU monitor, then type 'quit'.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn split_command_separates_cmd_and_args() {
        assert_eq!(split_command("ls"), ("ls", ""));
        assert_eq!(split_command("echo hello world"), ("echo", "hello world"));
        assert_eq!(split_command("mkdir   a"), ("mkdir", "a"));
        assert_eq!(split_command(""), ("", ""));
    }

    #[test]
    fn resolve_path_strips_a_single_dot_slash() {
        assert_eq!(resolve_path("./file"), "file");
        assert_eq!(resolve_path("file"), "file");
        assert_eq!(resolve_path("././f"), "./f");
    }

    #[test]
    fn program_base_enforces_the_extension() {
        assert_eq!(program_base("hello.S"), Ok("hello"));
        assert_eq!(program_base("a.b.S"), Ok("a.b"));
        assert!(program_base("hello").is_err());
        assert!(program_base("hello.s").is_err());
        assert!(program_base(".S").is_err());
    }

    #[test]
    fn traverse_path_handles_dot_dot_and_absolute_paths() {
        let _guard = test_support::lock_kernel();
        fs::with_fs(|f| {
            f.reset();
            let root = f.root();
            let a = f.mkdir(root, "a").unwrap();
            let b = f.mkdir(a, "b").unwrap();

            assert_eq!(traverse_path(f, "a/b", root), Some(b));
            assert_eq!(traverse_path(f, "/a", b), Some(a));
            assert_eq!(traverse_path(f, "..", b), Some(a));
            assert_eq!(traverse_path(f, "../..", b), Some(root));
            // `..` at the root stays at the root.
            assert_eq!(traverse_path(f, "..", root), Some(root));
            assert_eq!(traverse_path(f, "./b", a), Some(b));
            assert_eq!(traverse_path(f, "missing", root), None);
            assert_eq!(traverse_path(f, "", root), None);
        });
    }
}
