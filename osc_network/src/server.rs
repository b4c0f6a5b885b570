//! Server-side UDP transport.
//!
//! This module provides a thin UDP-based receiver for OSC packets: a
//! blocking receive loop that parses each inbound datagram and forwards the
//! decoded packet to a [`Dispatcher`]. Parse and dispatch problems on a
//! single datagram are logged and never stop the loop.

use crate::dispatch::Dispatcher;
use crate::{MAX_DATAGRAM_SIZE, io_err_is_timeout};
use osc_proto::codec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// How often a spawned receive loop polls its stop flag, via the socket read
/// timeout. Bounds the shutdown latency of [`ServerHandle::stop`].
const STOP_POLL_PERIOD: Duration = Duration::from_millis(100);

/// A UDP receiver for OSC packets.
///
/// Each inbound datagram (up to 65535 bytes) is parsed with
/// [`codec::parse`] and routed through the attached [`Dispatcher`].
pub struct Server {
    sock: std::net::UdpSocket,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Creates a new server backed by the given UDP socket and dispatcher.
    #[inline(always)]
    pub fn new(sock: std::net::UdpSocket, dispatcher: Arc<Dispatcher>) -> Self {
        Self { sock, dispatcher }
    }

    /// Binds a new server socket on the given port, on all interfaces.
    pub fn bind(port: u16, dispatcher: Arc<Dispatcher>) -> std::io::Result<Self> {
        std::net::UdpSocket::bind(("0.0.0.0", port)).map(|sock| Self::new(sock, dispatcher))
    }

    /// Returns the dispatcher packets are routed through.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the local address the server socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<core::net::SocketAddr> {
        self.sock.local_addr()
    }

    /// Runs the receive loop until `running` is cleared.
    ///
    /// Datagrams that fail to parse are logged and skipped. Read timeouts
    /// only re-check the flag, so set a socket read timeout before calling
    /// this if the flag is cleared from another thread.
    ///
    /// Returns when `running` is observed `false`, or with the first
    /// non-recoverable I/O error.
    pub fn run(&self, running: &AtomicBool) -> std::io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        while running.load(Ordering::Acquire) {
            let (len, peer_addr) = match self.sock.recv_from(&mut buf) {
                Ok(r) => r,
                Err(e) if io_err_is_timeout(e.kind()) => continue,
                Err(e) => return Err(e),
            };

            match codec::parse(&buf[..len]) {
                Ok(packet) => self.dispatcher.dispatch(packet),
                Err(e) => log::warn!("dropping malformed {len}-byte datagram from {peer_addr}: {e}"),
            }
        }

        Ok(())
    }

    /// Starts the receive loop on a background thread.
    ///
    /// The returned handle stops and joins the loop; dropping it without
    /// calling [`stop`](ServerHandle::stop) stops the loop as well.
    pub fn spawn(self) -> std::io::Result<ServerHandle> {
        self.sock.set_read_timeout(Some(STOP_POLL_PERIOD))?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("osc-receive".into())
            .spawn(move || {
                if let Err(e) = self.run(&flag) {
                    log::error!("OSC receive loop terminated: {e}");
                }
            })?;

        Ok(ServerHandle {
            running,
            thread: Some(thread),
        })
    }
}

/// Owning handle for a spawned receive loop.
#[derive(Debug)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Stops the receive loop and waits for its thread to exit.
    ///
    /// The wait is bounded by the loop's stop-poll period.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("OSC receive loop panicked");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
