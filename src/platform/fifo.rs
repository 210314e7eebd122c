//! Named pipes that are only ever written once a reader is known to exist.
//!
//! Opening a FIFO for writing blocks until a reader shows up, and a plain
//! blocking write into a full FIFO blocks until the reader drains it. Both
//! would wedge the recorder, so writers are opened `O_NONBLOCK` (which fails
//! with `ENXIO` when nobody reads) and writes wait on `poll` with a deadline.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use libc::c_int;

const FIFO_MODE: libc::mode_t = 0o600;

/// A FIFO on disk. Dropping it unlinks the path.
#[derive(Debug)]
pub struct Fifo {
    path: PathBuf,
    removed: bool,
}

impl Fifo {
    /// `mkfifo` at `path`, replacing a stale FIFO left by a crashed run.
    ///
    /// Anything at `path` that is not a FIFO is left alone and reported as
    /// `AlreadyExists`.
    pub fn create(path: &Path) -> io::Result<Self> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_fifo() => {
                tracing::debug!(path = %path.display(), "removing stale pipe");
                fs::remove_file(path)?;
            }
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a pipe", path.display()),
                ));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
        let rc = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            path: path.to_path_buf(),
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a non-blocking writer, or `None` when no process has the pipe open
    /// for reading.
    pub fn open_writer(&self) -> io::Result<Option<FifoWriter>> {
        let opened = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(&self.path);
        match opened {
            Ok(file) => Ok(Some(FifoWriter { file })),
            Err(err) if err.raw_os_error() == Some(libc::ENXIO) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Unlink the pipe. A pipe that is already gone counts as removed.
    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        remove_if_present(&self.path)
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(error) = remove_if_present(&self.path) {
                tracing::warn!(path = %self.path.display(), %error, "failed to remove pipe");
            }
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Short-lived write end of a [`Fifo`] with a confirmed reader.
#[derive(Debug)]
pub struct FifoWriter {
    file: File,
}

impl FifoWriter {
    /// Write every byte, waiting at most `stall` for the reader each time the
    /// pipe is full.
    pub fn write_all(&mut self, bytes: &[u8], stall: Duration) -> io::Result<()> {
        write_all_fd_with(
            self.file.as_raw_fd(),
            bytes,
            |fd, buf| {
                // SAFETY: `buf` is a valid slice and `fd` stays open while `self.file` lives.
                let result =
                    unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
                if result < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(result as usize)
                }
            },
            |fd| wait_writable(fd, stall),
        )
    }
}

fn wait_writable(fd: c_int, timeout: Duration) -> io::Result<()> {
    let deadline = Instant::now() + timeout;
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "pipe reader stopped draining",
            ));
        }
        let millis = remaining.as_millis().clamp(1, c_int::MAX as u128) as c_int;
        // SAFETY: `fds` is a single valid pollfd.
        let result = unsafe { libc::poll(&mut fds, 1, millis) };
        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if result == 0 {
            continue;
        }
        if (fds.revents & libc::POLLOUT) != 0 {
            return Ok(());
        }
        if (fds.revents & (libc::POLLERR | libc::POLLHUP)) != 0 {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }

        return Err(io::Error::other(format!(
            "poll(POLLOUT) returned revents=0x{:x}",
            fds.revents
        )));
    }
}

fn write_all_fd_with<FWrite, FWait>(
    fd: c_int,
    bytes: &[u8],
    mut write_once: FWrite,
    mut wait_writable: FWait,
) -> io::Result<()>
where
    FWrite: FnMut(c_int, &[u8]) -> io::Result<usize>,
    FWait: FnMut(c_int) -> io::Result<()>,
{
    let mut written = 0;
    while written < bytes.len() {
        match write_once(fd, &bytes[written..]) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(count) => {
                if count > bytes.len() - written {
                    return Err(io::Error::other(
                        "write returned more bytes than requested",
                    ));
                }
                written += count;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => wait_writable(fd)?,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
