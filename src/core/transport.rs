//! Transport abstraction
//!
//! The host hands the door its user in one of two ways: an already connected
//! socket handle (Door32 comm type 2 on platforms that can adopt handles) or
//! the process's standard pipes. Both are hidden behind [`Transport`], chosen
//! once at startup by [`open`].

use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use super::pipe::PipeTransport;
use super::retry::RetryPolicy;
use super::socket;
use crate::dropfile::{CommType, ConnectionDescriptor};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("failed to establish connection: {0}")]
    HandshakeFailed(String),

    #[error("write stalled after {attempts} attempts")]
    Stalled { attempts: u32 },

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Which channel the transport drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Standard input/output, possibly redirected by the host
    Pipe,
    /// Socket handle inherited from the host (or re-dialed)
    InheritedSocket,
    /// In-process buffers
    #[allow(dead_code)]
    Memory,
}

/// Blocking byte channel to the remote user
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Block until at least one byte arrives
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Like `read`, but give up after `timeout` and return `None`
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>>;

    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    fn flush(&mut self) -> Result<()>;

    /// Release the channel. Safe to call more than once.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Whether the other end can answer terminal queries
    fn is_interactive(&self) -> bool {
        true
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            buf = &buf[n..];
        }
        Ok(())
    }
}

/// Construction options for all transports
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Platform can adopt an inherited socket handle
    pub socket_capable: bool,
    pub retry: RetryPolicy,
    /// Bound on the fallback outbound connect
    pub connect_timeout: Duration,
    /// Pause after bring-up before the wake byte
    pub settle_delay: Duration,
    /// Substitute for flushing a socket
    pub flush_delay: Duration,
    /// Send a single NUL once connected
    pub wake_probe: bool,
    /// Treat redirected pipes as interactive terminals
    pub probe_pipes: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            socket_capable: cfg!(windows),
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(200),
            flush_delay: Duration::from_millis(20),
            wake_probe: true,
            probe_pipes: false,
        }
    }
}

/// Pick the transport for a connection
pub fn select_kind(socket_capable: bool, comm_type: CommType) -> TransportKind {
    if socket_capable && comm_type == CommType::Socket {
        TransportKind::InheritedSocket
    } else {
        TransportKind::Pipe
    }
}

/// Build the one transport this process will use
pub fn open(
    descriptor: &ConnectionDescriptor,
    options: &TransportOptions,
) -> Result<Box<dyn Transport>> {
    let kind = select_kind(options.socket_capable, descriptor.comm_type);
    info!(?kind, comm_type = ?descriptor.comm_type, handle = descriptor.handle, "Opening transport");

    match kind {
        TransportKind::InheritedSocket => {
            let transport = socket::connect(descriptor, options)?;
            Ok(Box::new(transport))
        }
        _ => Ok(Box::new(PipeTransport::stdio(options))),
    }
}
