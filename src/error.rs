use nix::errno::Errno;

use crate::Pid;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid PID: {pid}")]
    Validation { pid: Pid },

    #[error("{0}")]
    Launch(String),

    #[error("Could not attach to pid = {pid}: {}", .source.desc())]
    Attach {
        pid: Pid,
        source: nix::Error,
    },

    #[error("{context}: {}", .source.desc())]
    Operation {
        context: &'static str,
        source: nix::Error,
    },

    /// `waitpid()` succeeded, but reported neither an exit, a signal death, nor a stop.
    #[error("waitpid failed: unexpected wait status {status:#x} for pid = {pid}")]
    UnexpectedStatus {
        pid: Pid,
        status: i32,
    },
}

impl Error {
    /// OS error code underlying this error, if any.
    ///
    /// Launch errors carry only their rendered message, since exec failures are
    /// reported across the fork boundary as text.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Attach { source, .. } | Error::Operation { source, .. } => Some(*source),
            Error::Validation { .. } | Error::Launch(_) | Error::UnexpectedStatus { .. } => None,
        }
    }

    /// Returns `true` if the failure was the kernel reporting the inferior gone.
    pub fn no_such_process(&self) -> bool {
        matches!(self.errno(), Some(Errno::ESRCH) | Some(Errno::ECHILD))
    }

    pub(crate) fn launch(prefix: &str, errno: Errno) -> Self {
        Error::Launch(format!("{}: {}", prefix, errno.desc()))
    }
}

pub(crate) trait ResultExt<T> {
    /// Map a failed syscall to an [`Error::Operation`] described by `context`.
    fn operation(self, context: &'static str) -> Result<T>;

    /// Map a failed syscall to an [`Error::Launch`] described by `prefix`.
    fn launch(self, prefix: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for nix::Result<T> {
    fn operation(self, context: &'static str) -> Result<T> {
        self.map_err(|source| Error::Operation { context, source })
    }

    fn launch(self, prefix: &'static str) -> Result<T> {
        self.map_err(|errno| Error::launch(prefix, errno))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_status_has_no_errno() {
        let err = Error::UnexpectedStatus { pid: Pid::from_raw(42), status: 0xffff };

        assert_eq!(err.errno(), None);
        assert!(!err.no_such_process());
        assert_eq!(err.to_string(), "waitpid failed: unexpected wait status 0xffff for pid = 42");
    }

    #[test]
    fn test_operation_message() {
        let err = nix::Result::<()>::Err(Errno::ESRCH).operation("Could not resume").unwrap_err();

        assert_eq!(err.errno(), Some(Errno::ESRCH));
        assert!(err.no_such_process());
        assert_eq!(err.to_string(), "Could not resume: No such process");
    }
}
