//! A thin veneer for libc.
//!
//! Everything the server needs from Unix that `std` doesn't expose:
//! descriptor plumbing, `select`, `fork`/`waitpid`, and the signal
//! handling for orderly shutdown.

use std::fs;
use std::io;
use std::mem;
use std::net::TcpStream;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use std::os::unix::io::{FromRawFd, IntoRawFd, RawFd};

use log::info;

/// Converts the Unix syscall convention of "-1 means error" to a Result.
/// Also corrects the range of the result, excluding negative values.
fn cvt<T: Default + PartialOrd>(t: T) -> io::Result<T> {
    if t < T::default() {
        Err(io::Error::last_os_error())
    } else {
        Ok(t)
    }
}

/// Splits a stream into independently-closeable read and write `File`s by
/// duplicating the descriptor.
pub fn split_stream(stream: TcpStream) -> io::Result<(fs::File, fs::File)> {
    let fd = stream.into_raw_fd();
    let dup = match cvt(unsafe { libc::dup(fd) }) {
        Ok(dup) => dup,
        Err(e) => {
            unsafe { libc::close(fd) };
            return Err(e);
        }
    };
    unsafe { Ok((fs::File::from_raw_fd(fd), fs::File::from_raw_fd(dup))) }
}

/// Result type for `pipe`.
pub struct Pipe {
    pub input: fs::File,
    pub output: fs::File,
}

/// Wraps `pipe(2)`.  Used by the tests to stand in for a socket.
pub fn pipe() -> io::Result<Pipe> {
    let mut fds = [0 as libc::c_int; 2];
    cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    unsafe {
        Ok(Pipe {
            input: fs::File::from_raw_fd(fds[0]),
            output: fs::File::from_raw_fd(fds[1]),
        })
    }
}

pub fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Waits up to `seconds` for `fd` to become readable.  Returns false on
/// timeout, and also when the wait was interrupted by a signal -- the
/// caller's loop re-checks the shutdown flag either way.
pub fn wait_readable(fd: RawFd, seconds: i64) -> io::Result<bool> {
    unsafe {
        let mut fds: libc::fd_set = mem::zeroed();
        libc::FD_ZERO(&mut fds);
        libc::FD_SET(fd, &mut fds);
        let mut timeout = libc::timeval {
            tv_sec: seconds as libc::time_t,
            tv_usec: 0,
        };
        let n = libc::select(
            fd + 1,
            &mut fds,
            ptr::null_mut(),
            ptr::null_mut(),
            &mut timeout,
        );
        if n < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(e);
        }
        Ok(n > 0)
    }
}

pub enum Fork {
    Parent { pid: libc::pid_t },
    Child,
}

pub fn fork() -> io::Result<Fork> {
    match cvt(unsafe { libc::fork() })? {
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent { pid }),
    }
}

pub fn getpgrp() -> libc::pid_t {
    unsafe { libc::getpgrp() }
}

pub fn setpgid(pid: libc::pid_t, pgrp: libc::pid_t) -> io::Result<()> {
    cvt(unsafe { libc::setpgid(pid, pgrp) }).map(|_| ())
}

/// Reaps every worker that has exited, without blocking.
pub fn reap_workers() {
    loop {
        let mut status: libc::c_int = 0;
        let pid =
            unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            return;
        }
        info!("worker pid={} exited with status={:#x}", pid, status);
    }
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// In a worker: the peer descriptor to sever on SIGTERM.  -1 otherwise.
static WORKER_PEER: AtomicI32 = AtomicI32::new(-1);

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

/// Called by a freshly-forked worker so the shared signal handler knows
/// which descriptor to cut.  The handler it inherited across `fork` stays
/// installed.
pub fn register_worker_peer(fd: RawFd) {
    WORKER_PEER.store(fd, Ordering::SeqCst);
}

/// Everything in here must be async-signal-safe: atomics and close(2).
extern "C" fn handle_signal(sig: libc::c_int) {
    match sig {
        libc::SIGINT | libc::SIGTERM => {
            SHUTDOWN.store(true, Ordering::SeqCst);
            let fd = WORKER_PEER.swap(-1, Ordering::SeqCst);
            if fd >= 0 {
                unsafe {
                    libc::close(fd);
                }
            }
        }
        // SIGCHLD: nothing to do here; its only job is to interrupt the
        // select so the accept loop reaps promptly.
        _ => (),
    }
}

/// Installs handlers for SIGINT/SIGTERM (set the shutdown flag) and
/// SIGCHLD (kick the accept loop).  SA_RESTART is deliberately left off so
/// blocked syscalls return with EINTR and notice the flag.
pub fn install_signal_handlers() -> io::Result<()> {
    for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGCHLD] {
        unsafe {
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction =
                handle_signal as extern "C" fn(libc::c_int) as usize;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            cvt(libc::sigaction(sig, &action, ptr::null_mut()))?;
        }
    }
    Ok(())
}
