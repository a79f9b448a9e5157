//! OS pipes for wiring the child's standard streams.
//!
//! Discipline: the child receives the reader end of stdin and the writer
//! ends of stdout/stderr; immediately after `spawn` returns the parent must
//! close its copies of those endpoints, otherwise reading the remaining ends
//! to EOF deadlocks.

use crate::libc_call;

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

/// One OS pipe; either endpoint can be closed independently.
pub struct Pipe {
    reader: Option<File>,
    writer: Option<File>,
}

impl Pipe {
    pub fn new() -> io::Result<Self> {
        let mut fds = [0i32; 2];
        libc_call(|| unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        unsafe {
            Ok(Self {
                reader: Some(File::from_raw_fd(fds[0])),
                writer: Some(File::from_raw_fd(fds[1])),
            })
        }
    }

    pub fn reader_fd(&self) -> Option<RawFd> {
        self.reader.as_ref().map(|f| f.as_raw_fd())
    }

    pub fn writer_fd(&self) -> Option<RawFd> {
        self.writer.as_ref().map(|f| f.as_raw_fd())
    }

    pub fn close_reader(&mut self) -> io::Result<()> {
        close_endpoint(self.reader.take())
    }

    pub fn close_writer(&mut self) -> io::Result<()> {
        close_endpoint(self.writer.take())
    }

    /// Move the reader end out, e.g. into a draining thread.
    pub fn take_reader(&mut self) -> Option<File> {
        self.reader.take()
    }

    pub fn take_writer(&mut self) -> Option<File> {
        self.writer.take()
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(w) => w.write_all(buf),
            None => Err(closed("write")),
        }
    }

    /// Drain the reader end until EOF.
    pub fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        match self.reader.as_mut() {
            Some(r) => {
                let mut buf = Vec::new();
                r.read_to_end(&mut buf)?;
                Ok(buf)
            }
            None => Err(closed("read")),
        }
    }

    pub fn copy_from(&mut self, src: &mut impl Read) -> io::Result<u64> {
        match self.writer.as_mut() {
            Some(w) => io::copy(src, w),
            None => Err(closed("copy into")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        let r = self.close_reader();
        let w = self.close_writer();
        r.and(w)
    }
}

fn close_endpoint(endpoint: Option<File>) -> io::Result<()> {
    if let Some(file) = endpoint {
        let fd = file.into_raw_fd();
        libc_call(|| unsafe { libc::close(fd) })?;
    }
    Ok(())
}

fn closed(op: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("pipe endpoint already closed: {}", op),
    )
}

/// The stdin/stdout/stderr bundle for one child.
pub struct ExecutorPipes {
    pub stdin: Pipe,
    pub stdout: Pipe,
    pub stderr: Pipe,
}

impl ExecutorPipes {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            stdin: Pipe::new()?,
            stdout: Pipe::new()?,
            stderr: Pipe::new()?,
        })
    }

    /// Release every endpoint, reporting the join of any close errors.
    pub fn close(&mut self) -> io::Result<()> {
        let mut errors = Vec::new();
        for (name, pipe) in [
            ("stdin", &mut self.stdin),
            ("stdout", &mut self.stdout),
            ("stderr", &mut self.stderr),
        ] {
            if let Err(err) = pipe.close() {
                errors.push(format!("{}: {}", name, err));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Other, errors.join("; ")))
        }
    }
}

impl Drop for ExecutorPipes {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
