//! Inherited socket transport
//!
//! Door32 hosts pass an already connected socket handle to the door. The
//! handle is adopted in place when possible; when it is not, the door dials
//! the address given by the dropfile's `SocketHost=`/`SocketPort=` lines.

use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::race::RacingReader;
use super::retry::{self, classify, RetryPolicy, Retrying};
use super::transport::{Result, Transport, TransportError, TransportKind, TransportOptions};
use crate::dropfile::{ConnectionDescriptor, SocketAddress};

/// Transport over a connected TCP stream
pub struct SocketTransport {
    stream: Option<TcpStream>,
    reader: Option<RacingReader<Retrying<TcpStream>>>,
    policy: RetryPolicy,
    flush_delay: Duration,
}

impl SocketTransport {
    /// Wrap a stream that is already connected and in blocking mode
    pub fn new(stream: TcpStream, options: &TransportOptions) -> Result<Self> {
        let read_half = stream.try_clone().map_err(TransportError::Io)?;
        Ok(Self {
            stream: Some(stream),
            reader: Some(RacingReader::new(Retrying::new(read_half, options.retry))),
            policy: options.retry,
            flush_delay: options.flush_delay,
        })
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::InheritedSocket
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotConnected)?;
        reader.read(buf).map_err(classify)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotConnected)?;
        reader.read_timeout(buf, timeout).map_err(classify)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let policy = self.policy;
        retry::write_retrying(self.stream()?, buf, &policy)
    }

    /// Sockets have no user-space buffer to drain; give the peer a moment
    fn flush(&mut self) -> Result<()> {
        self.stream()?;
        thread::sleep(self.flush_delay);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        debug!("Closing socket transport");
        // Wakes a worker still blocked in recv on the cloned handle
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => warn!(error = %e, "Socket shutdown failed"),
        }
        self.reader = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Bring up the socket transport for a Door32 descriptor.
///
/// Tries the inherited handle first, then the fallback address. On success
/// waits for the settle delay and sends the wake byte.
pub fn connect(descriptor: &ConnectionDescriptor, options: &TransportOptions) -> Result<SocketTransport> {
    let stream = match adopt_handle(descriptor.handle) {
        Some(stream) => stream,
        None => {
            let address = descriptor.socket_address.as_ref().ok_or_else(|| {
                TransportError::HandshakeFailed(format!(
                    "handle {} cannot be adopted and no socket address is known",
                    descriptor.handle
                ))
            })?;
            dial(address, options.connect_timeout)?
        }
    };

    let mut transport = SocketTransport::new(stream, options)?;
    handshake(&mut transport, options)?;
    Ok(transport)
}

/// Settle, then wake the remote side with a single NUL
pub fn handshake(transport: &mut dyn Transport, options: &TransportOptions) -> Result<()> {
    thread::sleep(options.settle_delay);
    if options.wake_probe {
        transport.write_all(&[0u8])?;
        debug!("Wake probe sent");
    }
    Ok(())
}

/// Take ownership of an inherited socket handle.
///
/// The local address is queried only to validate the handle, and the handle
/// is forced into blocking mode because hosts often leave it non-blocking.
/// Either step may fail on its own; if both fail the handle is given back
/// untouched and `None` is returned.
pub fn adopt_handle(handle: i64) -> Option<TcpStream> {
    let stream = match platform::from_handle(handle) {
        Some(stream) => stream,
        None => {
            warn!(handle, "Socket handle out of range");
            return None;
        }
    };

    let validated = match stream.local_addr() {
        Ok(addr) => {
            info!(handle, %addr, "Handle validated as socket");
            true
        }
        Err(e) => {
            warn!(handle, error = %e, "Handle validation failed, proceeding");
            false
        }
    };

    let blocking = match stream.set_nonblocking(false) {
        Ok(()) => {
            info!(handle, "Socket set to blocking mode");
            true
        }
        Err(e) => {
            warn!(handle, error = %e, "Failed to set blocking mode, proceeding");
            false
        }
    };

    if !validated && !blocking {
        error!(handle, "Inherited handle is not usable");
        platform::relinquish(stream);
        return None;
    }

    Some(stream)
}

/// Open a fresh connection to the fallback address
pub fn dial(address: &SocketAddress, timeout: Duration) -> Result<TcpStream> {
    info!(%address, ?timeout, "Connecting to fallback socket address");

    let candidates = (address.host.as_str(), address.port)
        .to_socket_addrs()
        .map_err(|e| TransportError::HandshakeFailed(format!("cannot resolve {}: {}", address, e)))?;

    let mut last_error = None;
    for addr in candidates {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                info!(%addr, "Connected");
                return Ok(stream);
            }
            Err(e) => {
                warn!(%addr, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    let reason = match last_error {
        Some(e) => format!("cannot connect to {}: {}", address, e),
        None => format!("{} resolved to no addresses", address),
    };
    Err(TransportError::HandshakeFailed(reason))
}

#[cfg(unix)]
mod platform {
    use std::net::TcpStream;
    use std::os::fd::{FromRawFd, IntoRawFd, RawFd};

    pub fn from_handle(handle: i64) -> Option<TcpStream> {
        let fd = RawFd::try_from(handle).ok().filter(|fd| *fd > 0)?;
        // SAFETY: the host hands this descriptor to the door for its exclusive
        // use; if it turns out unusable it is released with `relinquish`.
        Some(unsafe { TcpStream::from_raw_fd(fd) })
    }

    pub fn relinquish(stream: TcpStream) {
        let _ = stream.into_raw_fd();
    }
}

#[cfg(windows)]
mod platform {
    use std::net::TcpStream;
    use std::os::windows::io::{FromRawSocket, IntoRawSocket, RawSocket};

    pub fn from_handle(handle: i64) -> Option<TcpStream> {
        let socket = RawSocket::try_from(handle).ok().filter(|s| *s > 0)?;
        // SAFETY: the host hands this socket to the door for its exclusive
        // use; if it turns out unusable it is released with `relinquish`.
        Some(unsafe { TcpStream::from_raw_socket(socket) })
    }

    pub fn relinquish(stream: TcpStream) {
        let _ = stream.into_raw_socket();
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use std::net::TcpStream;

    pub fn from_handle(_handle: i64) -> Option<TcpStream> {
        None
    }

    pub fn relinquish(stream: TcpStream) {
        std::mem::forget(stream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dropfile::{CommType, ConnectionDescriptor};
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn quick() -> TransportOptions {
        TransportOptions {
            socket_capable: true,
            settle_delay: Duration::from_millis(1),
            flush_delay: Duration::from_millis(1),
            connect_timeout: Duration::from_secs(2),
            ..TransportOptions::default()
        }
    }

    fn descriptor(handle: i64, port: Option<u16>) -> ConnectionDescriptor {
        let mut d = ConnectionDescriptor::local();
        d.comm_type = CommType::Socket;
        d.handle = handle;
        d.socket_address = port.map(|port| SocketAddress {
            host: "127.0.0.1".to_string(),
            port,
        });
        d
    }

    #[test]
    fn test_out_of_range_handles() {
        assert!(adopt_handle(-1).is_none());
        assert!(adopt_handle(0).is_none());
        assert!(adopt_handle(i64::MAX).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_unusable_handle_is_relinquished() {
        // Far above any descriptor a test process has open
        assert!(adopt_handle(900_000).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_adopts_live_socket() {
        use std::os::fd::IntoRawFd;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        client.set_nonblocking(true).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let fd = client.into_raw_fd();
        let mut adopted = adopt_handle(fd as i64).expect("adopt");
        adopted.write_all(b"hi").unwrap();

        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn test_fallback_dial_and_wake_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = connect(&descriptor(-1, Some(port)), &quick()).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let mut wake = [0xffu8; 1];
        server.read_exact(&mut wake).unwrap();
        assert_eq!(wake[0], 0);

        transport.write_all(b"hello").unwrap();
        transport.flush().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        server.write_all(b"k").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'k');
    }

    #[test]
    fn test_timeout_then_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut transport = connect(&descriptor(-1, Some(port)), &quick()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let mut buf = [0u8; 8];
        let got = transport.read_timeout(&mut buf, Duration::from_millis(20)).unwrap();
        assert_eq!(got, None);

        drop(server);
        assert!(matches!(transport.read(&mut buf), Err(TransportError::ConnectionClosed)));
    }

    #[test]
    fn test_no_address_fails_handshake() {
        let err = connect(&descriptor(-1, None), &quick()).err().unwrap();
        assert!(matches!(err, TransportError::HandshakeFailed(_)));
    }

    #[test]
    fn test_refused_connect_fails_handshake() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = connect(&descriptor(-1, Some(port)), &quick()).err().unwrap();
        assert!(matches!(err, TransportError::HandshakeFailed(_)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut transport = connect(&descriptor(-1, Some(port)), &quick()).unwrap();
        let _server = listener.accept().unwrap();

        transport.close().unwrap();
        transport.close().unwrap();
        assert!(transport.is_closed());
        assert!(matches!(transport.write(b"x"), Err(TransportError::NotConnected)));
        let mut buf = [0u8; 1];
        assert!(matches!(transport.read(&mut buf), Err(TransportError::NotConnected)));
    }
}
