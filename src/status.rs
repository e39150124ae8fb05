//! Decoding of `wait(2)` statuses into inferior stop reasons.

use std::convert::TryFrom;

use crate::Signal;


/// Lifecycle state of an inferior, as last observed by its handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Stopped,
    Running,
    Exited,
    Terminated,
}

impl State {
    /// Returns `true` once the inferior has exited or been killed, and so has been
    /// reaped. No further requests may be made against its pid.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Exited | State::Terminated)
    }
}

/// Why a waited-on inferior changed state.
///
/// Exit codes and signal numbers are kept at full `int` width.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// Exited normally with the given exit code.
    Exited(i32),

    /// Killed by the given signal number.
    Terminated(i32),

    /// Stopped by delivery of the given signal number.
    Stopped(i32),
}

impl StopReason {
    /// Decode a raw status, as written by `waitpid(2)`.
    ///
    /// Normal exit takes priority over death by signal, which takes priority over
    /// a stop. Returns `None` for statuses that are none of these, such as a
    /// `WCONTINUED` report.
    ///
    /// Signal numbers are passed through as-is, so real-time signals survive.
    pub fn decode(raw: i32) -> Option<Self> {
        if libc::WIFEXITED(raw) {
            Some(StopReason::Exited(libc::WEXITSTATUS(raw)))
        } else if libc::WIFSIGNALED(raw) {
            Some(StopReason::Terminated(libc::WTERMSIG(raw)))
        } else if libc::WIFSTOPPED(raw) {
            Some(StopReason::Stopped(libc::WSTOPSIG(raw)))
        } else {
            None
        }
    }

    /// The state an inferior is in after stopping for this reason.
    pub fn state(self) -> State {
        match self {
            StopReason::Exited(_) => State::Exited,
            StopReason::Terminated(_) => State::Terminated,
            StopReason::Stopped(_) => State::Stopped,
        }
    }

    /// Numeric payload: the exit code or the signal number.
    pub fn info(self) -> i32 {
        match self {
            StopReason::Exited(code) => code,
            StopReason::Terminated(sig) | StopReason::Stopped(sig) => sig,
        }
    }

    /// The signal that stopped or killed the inferior, if known to this platform.
    pub fn signal(self) -> Option<Signal> {
        match self {
            StopReason::Exited(_) => None,
            StopReason::Terminated(sig) | StopReason::Stopped(sig) => Signal::try_from(sig).ok(),
        }
    }
}
