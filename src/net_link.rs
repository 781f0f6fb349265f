//! Point-to-point TCP link between sender and receiver.
//!
//! Blocking std sockets: the link is driven from the audio thread, not the
//! async runtime. No read timeouts are set, a silent peer stalls the
//! receiver until the session is stopped.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Wait for exactly one peer on `addr`.
///
/// Returns `Ok(None)` if `running` is cleared before anyone connects.
pub fn accept_one(addr: &str, running: &AtomicBool) -> Result<Option<(TcpStream, SocketAddr)>> {
    let listener = TcpListener::bind(addr).with_context(|| format!("Failed to listen on {}", addr))?;
    log::info!("Listening on {}...", listener.local_addr()?);
    accept_from(&listener, running)
}

/// Accept one connection from an already bound listener.
pub fn accept_from(listener: &TcpListener, running: &AtomicBool) -> Result<Option<(TcpStream, SocketAddr)>> {
    // Poll so a shutdown request is noticed while nobody has connected yet
    listener.set_nonblocking(true)?;

    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                stream.set_nodelay(true)?;
                log::info!("Peer connected: {}", peer);
                return Ok(Some((stream, peer)));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e).context("accept failed"),
        }
    }
    Ok(None)
}

/// Connect to the receiver. No retry: a refused connection ends the session.
pub fn connect(addr: &str) -> Result<TcpStream> {
    log::info!("Connecting to {}...", addr);
    let stream = TcpStream::connect(addr).with_context(|| format!("Failed to connect to {}", addr))?;
    stream.set_nodelay(true)?;
    log::info!("Connected to {}", stream.peer_addr()?);
    Ok(stream)
}

/// Lets another thread unblock a socket the audio thread is waiting on.
#[derive(Clone, Default)]
pub struct StreamCloser {
    inner: Arc<Mutex<Option<TcpStream>>>,
}

impl StreamCloser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, stream: &TcpStream) -> io::Result<()> {
        let clone = stream.try_clone()?;
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(clone);
        }
        Ok(())
    }

    /// Shut both directions down; pending reads return 0 / writes fail.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.inner.lock() {
            if let Some(stream) = slot.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }
}
