//! Unidirectional pipe for reporting post-fork failures from child to parent.

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};

use nix::{fcntl::OFlag, unistd};


pub(crate) struct Pipe {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

impl Pipe {
    /// Create a pipe with both ends marked close-on-exec, so that a successful `exec()`
    /// closes the child's write end without anything being written.
    pub fn new() -> nix::Result<Self> {
        let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;

        // SAFETY: `pipe2()` just returned these descriptors, and nothing else owns them.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) };

        Ok(Self { read: Some(read), write: Some(write) })
    }

    pub fn close_read(&mut self) {
        self.read = None;
    }

    pub fn close_write(&mut self) {
        self.write = None;
    }

    /// Read from the pipe until every write end is closed.
    ///
    /// Consumes the read end.
    pub fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut data = vec![];

        if let Some(read) = self.read.take() {
            File::from(read).read_to_end(&mut data)?;
        }

        Ok(data)
    }

    /// Write all of `data`, retrying on `EINTR`.
    ///
    /// Async-signal-safe: does not allocate, so it may be called in a forked child.
    pub fn write_all(&self, mut data: &[u8]) -> nix::Result<()> {
        let fd = match &self.write {
            Some(write) => write.as_raw_fd(),
            None => return Err(nix::errno::Errno::EBADF),
        };

        while !data.is_empty() {
            match unistd::write(fd, data) {
                Ok(0) => return Err(nix::errno::Errno::EPIPE),
                Ok(n) => data = &data[n..],
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }
}
