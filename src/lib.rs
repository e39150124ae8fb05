//! Spawn, attach to, and control a traced inferior process on Linux.

pub mod cmd;
pub mod error;
pub mod inferior;
pub mod status;

mod pipe;

pub use cmd::Command;
pub use error::{Error, Result};
pub use inferior::Inferior;
pub use status::{State, StopReason};

pub use nix::unistd::Pid;

/// POSIX signal.
pub use nix::sys::signal::Signal;
