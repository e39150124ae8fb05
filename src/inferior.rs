//! Owning handle to a traced (or spawned) inferior process.

use std::marker::PhantomData;

use nix::{
    errno::Errno,
    sys::{
        ptrace,
        signal::{self, Signal},
        wait,
    },
};
use tracing::{debug, info, trace};

use crate::cmd::Command;
use crate::error::{Error, Result, ResultExt};
use crate::status::{State, StopReason};
use crate::Pid;


/// An inferior process, controlled through the calling thread.
///
/// There is exactly one `Inferior` per controlled pid, and it can only be moved, never
/// duplicated. Dropping it releases the process:
///
/// - An attached inferior is detached and left running.
/// - A spawned inferior is killed and reaped.
///
/// Callers must strictly alternate [`Inferior::resume()`] and
/// [`Inferior::wait_for_stop()`].
#[derive(Debug)]
pub struct Inferior {
    pid: Pid,

    /// Spawned by us, so must not outlive this handle.
    owns_lifetime: bool,

    /// A ptrace relationship is active.
    is_traced: bool,

    state: State,
    last_stop: Option<StopReason>,

    // Ptrace requests are only honored from the thread that became the tracer.
    #[doc(hidden)]
    _not_send: PhantomData<*const ()>,
}

impl Inferior {
    /// Spawn the program at `path`, looked up in `PATH` if it has no slash.
    ///
    /// If `trace`, the returned inferior is stopped just after its `exec()`.
    pub fn launch(path: impl Into<Vec<u8>>, trace: bool) -> Result<Self> {
        Command::new(vec![path])?.trace(trace).spawn()
    }

    /// Attach to the running process `pid`, and wait for it to stop.
    pub fn attach(pid: Pid) -> Result<Self> {
        if pid.as_raw() <= 0 {
            return Err(Error::Validation { pid });
        }

        ptrace::attach(pid).map_err(|source| Error::Attach { pid, source })?;

        info!(pid = pid.as_raw(), "attached to inferior");

        let mut inferior = Self::new(pid, false, true, State::Running);

        // The attach delivers a `SIGSTOP`. If we can't observe it, dropping the handle
        // detaches again.
        inferior.wait_for_stop()?;

        Ok(inferior)
    }

    pub(crate) fn spawned(pid: Pid, trace: bool) -> Self {
        // An untraced child runs freely from the moment it is forked.
        let state = if trace { State::Stopped } else { State::Running };

        Self::new(pid, true, trace, state)
    }

    fn new(pid: Pid, owns_lifetime: bool, is_traced: bool, state: State) -> Self {
        let last_stop = None;
        let _not_send = PhantomData;

        Self { pid, owns_lifetime, is_traced, state, last_stop, _not_send }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Reason for the most recently observed stop, exit, or termination.
    pub fn last_stop(&self) -> Option<StopReason> {
        self.last_stop
    }

    pub fn owns_lifetime(&self) -> bool {
        self.owns_lifetime
    }

    pub fn is_traced(&self) -> bool {
        self.is_traced
    }

    /// Continue the stopped inferior, without delivering a signal.
    ///
    /// Does not wait for the next stop: see [`Inferior::wait_for_stop()`].
    pub fn resume(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            // The pid was reaped and may have been recycled. Fail the same way the
            // kernel would for a vanished tracee.
            return Err(Error::Operation { context: "Could not resume", source: Errno::ESRCH });
        }

        ptrace::cont(self.pid, None).operation("Could not resume")?;

        self.set_state(State::Running);

        Ok(())
    }

    /// Block until the inferior stops, exits, or is killed.
    pub fn wait_for_stop(&mut self) -> Result<StopReason> {
        let raw = waitpid_raw(self.pid).operation("waitpid failed")?;

        let reason = StopReason::decode(raw)
            .ok_or(Error::UnexpectedStatus { pid: self.pid, status: raw })?;

        trace!(pid = self.pid.as_raw(), raw, ?reason, "waited on inferior");

        self.last_stop = Some(reason);
        self.set_state(reason.state());

        Ok(reason)
    }

    fn set_state(&mut self, state: State) {
        debug!(pid = self.pid.as_raw(), ?state, "setting inferior state");

        self.state = state;
    }

    // Stop a running tracee, since `PTRACE_DETACH` requires a ptrace-stop.
    //
    // Returns `false` if the tracee turned out to be gone.
    fn interrupt(&mut self) -> bool {
        if let Err(errno) = signal::kill(self.pid, Signal::SIGSTOP) {
            debug!(pid = self.pid.as_raw(), %errno, "unable to stop inferior");
        }

        match self.wait_for_stop() {
            Ok(reason) => !reason.state().is_terminal(),
            Err(err) => {
                debug!(pid = self.pid.as_raw(), %err, "unable to wait for stopped inferior");
                true
            },
        }
    }

    fn detach(&mut self) {
        let pid = self.pid;

        if let Err(errno) = ptrace::detach(pid, None) {
            debug!(pid = pid.as_raw(), %errno, "unable to detach from inferior");
        }

        // Let the process run independently of us.
        if let Err(errno) = signal::kill(pid, Signal::SIGCONT) {
            debug!(pid = pid.as_raw(), %errno, "unable to continue detached inferior");
        }

        info!(pid = pid.as_raw(), "detached from inferior");
    }

    fn kill(&mut self) {
        let pid = self.pid;

        if let Err(errno) = signal::kill(pid, Signal::SIGKILL) {
            debug!(pid = pid.as_raw(), %errno, "unable to kill inferior");
        }

        // Reap, so no zombie outlives the handle.
        match wait::waitpid(pid, None) {
            Ok(status) => info!(pid = pid.as_raw(), ?status, "reaped inferior"),
            Err(errno) => debug!(pid = pid.as_raw(), %errno, "unable to reap inferior"),
        }
    }
}

impl Drop for Inferior {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            // Already reaped: the pid is no longer ours to signal.
            self.is_traced = false;
            return;
        }

        if self.is_traced {
            let mut alive = true;

            if self.state == State::Running {
                alive = self.interrupt();
            }

            if alive {
                self.detach();
            }

            self.is_traced = false;

            if !alive {
                return;
            }
        }

        if self.owns_lifetime {
            self.kill();
        }
    }
}

// Wait on `pid`, returning the undecoded status.
//
// The `nix` wrapper rejects stops for signals it has no `Signal` variant for, such as
// real-time signals, so we keep the raw status and decode it ourselves. An `EINTR` is
// returned to the caller, since a signal to the tracer is the only way to unblock it.
fn waitpid_raw(pid: Pid) -> nix::Result<i32> {
    let mut status: libc::c_int = 0;

    let res = unsafe { libc::waitpid(pid.as_raw(), &mut status, 0) };
    Errno::result(res)?;

    Ok(status)
}
