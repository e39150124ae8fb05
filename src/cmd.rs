use std::ffi::CString;

use nix::{
    errno::Errno,
    sys::{
        ptrace,
        signal::{kill, Signal},
        wait,
    },
    unistd::{fork, ForkResult, Pid},
};
use tracing::{debug, info};

use crate::error::{Error, Result, ResultExt};
use crate::inferior::Inferior;
use crate::pipe::Pipe;


/// Exit code of a child that failed before or during `exec()`.
const EXEC_FAILED_EXIT_CODE: i32 = 127;

/// Maximum length of a failure report written by a forked child.
const REPORT_CAPACITY: usize = 64;

/// Command to spawn as a child process, optionally traced.
#[derive(Clone, Debug)]
pub struct Command {
    /// Argument vector to pass to `execvp()`.
    argv: Vec<CString>,

    /// Request `PTRACE_TRACEME` after forking, pre-exec.
    ///
    /// Defaults to `true`.
    trace: bool,
}

impl Command {
    pub fn new(argv: Vec<impl Into<Vec<u8>>>) -> Result<Self> {
        if argv.is_empty() {
            return Err(Error::Launch("Command exe required".into()));
        }

        // The child may not allocate, so own the NUL-terminated strings up front.
        let argv: std::result::Result<Vec<_>, _> = argv
            .into_iter()
            .map(CString::new)
            .collect();
        let argv = argv.map_err(|err| Error::Launch(format!("invalid argument: {}", err)))?;

        Ok(Self { argv, trace: true })
    }

    /// Set the value of the `trace` flag.
    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Fork and exec a child process determined by `self.argv`, and return an owning
    /// handle to it.
    ///
    /// The program is looked up in `PATH` if it contains no slash. Any failure between
    /// the fork and a successful exec is reported back over a close-on-exec pipe, and
    /// the failed child is reaped before returning the error.
    ///
    /// If `self.trace`, the child requests `PTRACE_TRACEME`, and the handle is returned
    /// after its post-exec `SIGTRAP` has been waited on. Otherwise, the child is left
    /// running.
    pub fn spawn(self) -> Result<Inferior> {
        let pid = self.fork_exec()?;

        info!(pid = pid.as_raw(), trace = self.trace, "launched inferior");

        let mut inferior = Inferior::spawned(pid, self.trace);

        if self.trace {
            // Consume the trap raised by the successful exec.
            let reason = inferior.wait_for_stop()?;
            debug!(pid = pid.as_raw(), ?reason, "inferior stopped after exec");
        }

        Ok(inferior)
    }

    fn fork_exec(&self) -> Result<Pid> {
        // Heap-allocates, must occur pre-fork.
        let argv = self.argv();
        let mut channel = Pipe::new().launch("pipe failed")?;

        // SAFETY: the child only makes async-signal-safe calls before `exec()` or
        // `_exit()`. See `exec_child()`.
        match unsafe { fork() }.launch("fork failed")? {
            ForkResult::Child => {
                channel.close_read();
                exec_child(&channel, &argv, self.trace)
            },
            ForkResult::Parent { child } => {
                channel.close_write();

                // Blocks until the child's write end is closed by `exec()` or `_exit()`.
                let data = match channel.read_to_end() {
                    Ok(data) => data,
                    Err(err) => {
                        // We can't tell whether the exec succeeded, so don't leave the
                        // child behind.
                        reap_failed_child(child, true);
                        return Err(Error::Launch(format!("read failed: {}", err)));
                    },
                };

                if data.is_empty() {
                    return Ok(child);
                }

                // The child has already exited, so this does not block for long.
                reap_failed_child(child, false);

                Err(ChildReport::parse(&data))
            },
        }
    }

    // Construct NUL-terminated arguments for `execvp`. We heap-allocate to return a `Vec`,
    // and so must do this before calling `fork()`.
    fn argv(&self) -> Vec<*const libc::c_char> {
        let mut argv: Vec<_> = self.argv
            .iter()
            .map(|s| s.as_ptr())
            .collect();
        argv.push(std::ptr::null());
        argv
    }
}

// Post-fork child path. Must not allocate, since only async-signal-safe calls are
// permitted after `fork()` in a possibly multi-threaded parent. On any failure, report
// it over `channel` and exit without running destructors or `atexit` handlers.
fn exec_child(channel: &Pipe, argv: &[*const libc::c_char], trace: bool) -> ! {
    if trace {
        if let Err(errno) = ptrace::traceme() {
            report_and_exit(channel, "Tracing failed", errno);
        }
    }

    // Use unsafe `libc::execvp`, because the `nix` wrapper heap-allocates a `Vec`
    // internally, which is not async-signal-safe.
    unsafe {
        libc::execvp(argv[0], argv.as_ptr());
    }

    // `execvp()` only returns on failure.
    report_and_exit(channel, "exec failed", Errno::last())
}

// Reap a child that did not become an inferior, killing it first if it may still be
// alive.
fn reap_failed_child(child: Pid, kill_first: bool) {
    if kill_first {
        if let Err(errno) = kill(child, Signal::SIGKILL) {
            debug!(pid = child.as_raw(), %errno, "unable to kill failed child");
        }
    }

    if let Err(errno) = wait::waitpid(child, None) {
        debug!(pid = child.as_raw(), %errno, "unable to reap failed child");
    }
}

fn report_and_exit(channel: &Pipe, prefix: &'static str, errno: Errno) -> ! {
    let report = ChildReport::new(prefix, errno);

    // Nothing more can be done if the parent is gone. It will see a short report.
    let _ = channel.write_all(report.as_bytes());

    unsafe { libc::_exit(EXEC_FAILED_EXIT_CODE) }
}

/// Failure message written by a forked child, as `<prefix>:<errno>`.
///
/// Formatted in a fixed-size buffer so that no allocation is needed to encode it.
struct ChildReport {
    buf: [u8; REPORT_CAPACITY],
    len: usize,
}

impl ChildReport {
    fn new(prefix: &str, errno: Errno) -> Self {
        let mut report = Self { buf: [0; REPORT_CAPACITY], len: 0 };

        report.push(prefix.as_bytes());
        report.push(b":");

        // Render the code as decimal, most significant digit first.
        let mut digits = [0u8; 10];
        let mut n = (errno as i32).unsigned_abs();
        let mut i = digits.len();

        loop {
            i -= 1;
            digits[i] = b'0' + (n % 10) as u8;
            n /= 10;

            if n == 0 {
                break;
            }
        }

        report.push(&digits[i..]);
        report
    }

    fn push(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(REPORT_CAPACITY - self.len);
        self.buf[self.len..self.len + len].copy_from_slice(&bytes[..len]);
        self.len += len;
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Decode a report read by the parent into a launch error.
    ///
    /// A report that does not have the expected shape is passed through verbatim.
    fn parse(data: &[u8]) -> Error {
        let text = String::from_utf8_lossy(data);

        let parsed = text.rsplit_once(':').and_then(|(prefix, code)| {
            let code = code.parse::<i32>().ok()?;
            Some((prefix, Errno::from_i32(code)))
        });

        match parsed {
            Some((prefix, errno)) => Error::launch(prefix, errno),
            None => Error::Launch(text.into_owned()),
        }
    }
}
