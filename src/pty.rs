//! Interactive pty bridge.
//!
//! Relays bytes between the controlling terminal and a process running on a
//! host inside a fresh pty until that process exits. This loop is blocking
//! and deliberately outside the async runtime: it owns the terminal in raw
//! mode for its whole lifetime, so nothing else may write to it meanwhile.

use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;
use std::time::Duration;

use portable_pty::{native_pty_system, PtySize};
use thiserror::Error;

use crate::host::{Host, HostError};
use crate::terminal::{self, RawModeGuard, TerminalError};

/// Upper bound on how long the relay waits without I/O before checking
/// whether the child has exited.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

const BUF_SIZE: usize = 10240;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    OpenPty(#[source] anyhow::Error),

    #[error("failed to spawn command: {0}")]
    Spawn(#[from] HostError),

    #[error("failed to clone reader: {0}")]
    CloneReader(#[source] anyhow::Error),

    #[error("failed to take writer: {0}")]
    TakeWriter(#[source] anyhow::Error),

    #[error("pty master has no file descriptor")]
    NoMasterFd,

    #[error(transparent)]
    Terminal(#[from] TerminalError),

    #[error("pty i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Run `cmd` on `host` inside a pty wired to this process's terminal,
/// copying the child's output into `out`. Returns once the child exits.
pub fn bridge(
    host: &dyn Host,
    cmd: &str,
    on_host: bool,
    out: &mut dyn Write,
) -> Result<(), PtyError> {
    let _raw = RawModeGuard::if_tty()?;

    let (rows, cols) = terminal::terminal_size().unwrap_or((24, 80));
    let pair = native_pty_system()
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(PtyError::OpenPty)?;

    let mut child = host.spawn_pty(cmd, on_host, &*pair.slave)?;
    // Only the child may hold the subordinate side, or reads never see EOF.
    drop(pair.slave);
    tracing::debug!(host = host.name(), cmd, pid = ?child.process_id(), "pty child spawned");

    out.write_all(b"\r")?;
    out.flush()?;

    let master_fd = pair.master.as_raw_fd().ok_or(PtyError::NoMasterFd)?;
    let mut reader = pair.master.try_clone_reader().map_err(PtyError::CloneReader)?;
    let mut writer = pair.master.take_writer().map_err(PtyError::TakeWriter)?;

    let mut stdin_fd: RawFd = libc::STDIN_FILENO;
    let mut pty_fd: RawFd = master_fd;
    let mut buf = [0u8; BUF_SIZE];

    while child.try_wait()?.is_none() {
        let mut fds = [pollfd(stdin_fd), pollfd(pty_fd)];
        if poll(&mut fds, POLL_INTERVAL)? == 0 {
            continue;
        }

        match stdin_event(fds[0].revents) {
            StdinEvent::Readable => match read_fd(stdin_fd, &mut buf)? {
                // Not a terminal (or already at EOF); stop listening to it.
                0 => stdin_fd = -1,
                n => {
                    writer.write_all(&buf[..n])?;
                    writer.flush()?;
                }
            },
            StdinEvent::Hangup => {
                tracing::debug!("controlling terminal went away, ending pty session");
                let _ = child.kill();
                break;
            }
            StdinEvent::Closed => {
                // poll would report the dead descriptor again at once.
                tracing::debug!("stdin is not open, relaying output only");
                stdin_fd = -1;
            }
            StdinEvent::Idle => {}
        }

        let pty_ev = fds[1].revents;
        if pty_ev & libc::POLLIN != 0 {
            match reader.read(&mut buf) {
                Ok(0) => pty_fd = -1,
                Ok(n) => {
                    out.write_all(&buf[..n])?;
                    out.flush()?;
                }
                // EIO once the subordinate side is closed.
                Err(_) => pty_fd = -1,
            }
        } else if pty_ev & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
            pty_fd = -1;
        }
    }

    if pty_fd >= 0 {
        drain(pty_fd, &mut reader, out)?;
    }
    let status = child.wait()?;
    tracing::debug!(host = host.name(), ?status, "pty child exited");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StdinEvent {
    Readable,
    Hangup,
    Closed,
    Idle,
}

fn stdin_event(revents: libc::c_short) -> StdinEvent {
    if revents & libc::POLLIN != 0 {
        StdinEvent::Readable
    } else if revents & (libc::POLLHUP | libc::POLLERR) != 0 {
        StdinEvent::Hangup
    } else if revents & libc::POLLNVAL != 0 {
        StdinEvent::Closed
    } else {
        StdinEvent::Idle
    }
}

/// Copy whatever output the child left behind before it exited.
fn drain(fd: RawFd, reader: &mut dyn Read, out: &mut dyn Write) -> io::Result<()> {
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let mut fds = [pollfd(fd)];
        if poll(&mut fds, Duration::ZERO)? == 0 || fds[0].revents & libc::POLLIN == 0 {
            break;
        }
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => out.write_all(&buf[..n])?,
        }
    }
    out.flush()
}

fn pollfd(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

/// poll(2) over `fds`; negative descriptors are ignored by the kernel.
fn poll(fds: &mut [libc::pollfd], timeout: Duration) -> io::Result<usize> {
    let rc = unsafe {
        libc::poll(
            fds.as_mut_ptr(),
            fds.len() as libc::nfds_t,
            timeout.as_millis() as libc::c_int,
        )
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(err);
    }
    Ok(rc as usize)
}

/// Read straight from the descriptor so no bytes get stuck in a userspace
/// buffer that poll(2) cannot see.
fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let rc = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_input_wins_over_hangup() {
        assert_eq!(stdin_event(libc::POLLIN), StdinEvent::Readable);
        assert_eq!(stdin_event(libc::POLLIN | libc::POLLHUP), StdinEvent::Readable);
        assert_eq!(stdin_event(libc::POLLHUP), StdinEvent::Hangup);
        assert_eq!(stdin_event(libc::POLLERR), StdinEvent::Hangup);
        assert_eq!(stdin_event(0), StdinEvent::Idle);
    }

    #[test]
    fn closed_stdin_is_dropped_from_the_poll_set() {
        assert_eq!(stdin_event(libc::POLLNVAL), StdinEvent::Closed);

        // A negative descriptor is ignored by poll(2) rather than reported.
        let mut fds = [pollfd(-1)];
        assert_eq!(poll(&mut fds, Duration::ZERO).unwrap(), 0);
        assert_eq!(fds[0].revents, 0);
    }

    #[test]
    fn poll_reports_invalid_descriptor() {
        // Far above any descriptor the test process has open.
        let mut fds = [pollfd(1 << 20)];
        assert_eq!(poll(&mut fds, Duration::ZERO).unwrap(), 1);
        assert_eq!(stdin_event(fds[0].revents), StdinEvent::Closed);
    }
}
