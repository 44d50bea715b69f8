//! The accept loop and the fork-per-connection dispatcher.
//!
//! The listener is single-threaded.  Each accepted connection is served
//! either inline (`--no-fork`) or in a forked worker process that owns the
//! connection outright; within a worker there is no concurrency at all, so
//! nothing here needs a lock.  Shutdown is signal-driven: the accept loop
//! polls a 1-second `select` so it notices the flag promptly, and reaps
//! finished workers on every lap.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::process;

use log::{debug, error, info, warn};

use crate::con::Connection;
use crate::sandbox::Sandbox;
use crate::server;
use crate::unix;

pub struct Config {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub use_fork: bool,
}

/// Binds the listener and runs the accept loop until a shutdown signal.
/// Returns an error only for listener-level failures (bind, select); the
/// caller turns those into exit code 1.
pub fn serve(config: &Config, sandbox: &Sandbox) -> io::Result<()> {
    unix::install_signal_handlers()?;

    // std sets SO_REUSEADDR on the socket for us.
    let listener =
        TcpListener::bind(SocketAddrV4::new(config.addr, config.port))?;
    listener.set_nonblocking(true)?;
    info!("listening on {}:{}", config.addr, config.port);

    while !unix::shutdown_requested() {
        unix::reap_workers();

        // Wait for a connection, but never longer than a second, so that a
        // shutdown flag set by a signal is observed promptly.
        if !unix::wait_readable(listener.as_raw_fd(), 1)? {
            continue;
        }
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                error!("accept failed: {}", e);
                break;
            }
        };
        info!("accepted connection from {}", peer);
        // The listener is non-blocking; the connection must not be.
        stream.set_nonblocking(false)?;

        if !config.use_fork {
            serve_stream(stream, sandbox);
            continue;
        }

        match unix::fork()? {
            unix::Fork::Parent { pid } => {
                debug!("forked worker pid={}", pid);
                // Keep workers in our process group so a ^C reaches them.
                let _ = unix::setpgid(pid, unix::getpgrp());
                drop(stream);
            }
            unix::Fork::Child => {
                let _ = unix::setpgid(0, unix::getpgrp());
                // The worker owns exactly one connection.  Closing the
                // listener here keeps it from holding the port open past
                // the parent's shutdown; registering the peer descriptor
                // lets SIGTERM cut a stuck worker off mid-read.
                unix::close_fd(listener.as_raw_fd());
                unix::register_worker_peer(stream.as_raw_fd());
                serve_stream(stream, sandbox);
                debug!("worker exiting");
                // Skip destructors: the listener object above still wraps
                // the descriptor we closed by hand.
                process::exit(0);
            }
        }
    }

    info!("shutting down");
    Ok(())
}

fn serve_stream(stream: TcpStream, sandbox: &Sandbox) {
    match Connection::from_stream(stream) {
        Ok(con) => server::serve(con, sandbox),
        Err(e) => warn!("failed to set up connection: {}", e),
    }
}
