use std::fs;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{anyhow, Result};
use nix::sys::signal::kill;
use yad::Pid;

/// Single-character process state, as reported in `/proc/<pid>/stat`.
#[allow(unused)]
pub fn process_status(pid: Pid) -> Result<char> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid))?;

    // The command name is parenthesized and may itself contain parentheses, so find
    // the state after the last one.
    let index = stat.rfind(')').ok_or_else(|| anyhow!("malformed stat: {}", stat))?;

    stat[index + 1..]
        .trim_start()
        .chars()
        .next()
        .ok_or_else(|| anyhow!("malformed stat: {}", stat))
}

/// Pid of the process tracing `pid`, or 0 if untraced.
#[allow(unused)]
pub fn tracer_pid(pid: Pid) -> Result<i32> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid))?;

    let line = status
        .lines()
        .find(|line| line.starts_with("TracerPid:"))
        .ok_or_else(|| anyhow!("no TracerPid for {}", pid))?;

    Ok(line["TracerPid:".len()..].trim().parse()?)
}

/// Probe `pid` with the null signal. Zombies still exist.
#[allow(unused)]
pub fn process_exists(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}

/// Returns `true` if the process is running or sleeping, as opposed to stopped.
#[allow(unused)]
pub fn is_running(pid: Pid) -> Result<bool> {
    let status = process_status(pid)?;
    Ok(status == 'R' || status == 'S')
}

/// Poll `check` until it holds, for up to a second.
///
/// Process state reported by `/proc` can lag a signal or ptrace request slightly.
#[allow(unused)]
pub fn eventually(mut check: impl FnMut() -> Result<bool>) -> Result<bool> {
    for _ in 0..100 {
        if check()? {
            return Ok(true);
        }

        sleep(Duration::from_millis(10));
    }

    Ok(false)
}
