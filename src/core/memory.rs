//! In-memory transport for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::transport::{Result, Transport, TransportError, TransportKind};

/// Transport that replays queued input chunks and captures all output.
///
/// Each queued chunk is returned by exactly one read, like a packet arriving
/// on a socket. Once the queue is empty a blocking read reports a closed
/// connection and a timed read reports a timeout, unless the peer has hung
/// up, in which case both report a closed connection.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    input: VecDeque<Vec<u8>>,
    tap: MemoryTap,
    flushes: usize,
    non_interactive: bool,
    hung_up: bool,
}

/// Observer that stays valid after the transport has been boxed or dropped
#[derive(Debug, Clone, Default)]
pub struct MemoryTap {
    output: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryTap {
    pub fn output(&self) -> Vec<u8> {
        self.output.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let mut transport = Self::new();
        for chunk in chunks {
            transport.push_input(chunk.as_ref());
        }
        transport
    }

    pub fn push_input(&mut self, chunk: &[u8]) {
        self.input.push_back(chunk.to_vec());
    }

    /// Remote end goes away once the queued input is consumed
    pub fn hang_up(&mut self) {
        self.hung_up = true;
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.non_interactive = !interactive;
    }

    pub fn tap(&self) -> MemoryTap {
        self.tap.clone()
    }

    pub fn output(&self) -> Vec<u8> {
        self.tap.output()
    }

    pub fn output_lossy(&self) -> String {
        self.tap.output_lossy()
    }

    fn closed(&self) -> bool {
        self.tap.is_closed()
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    fn take_chunk(&mut self, buf: &mut [u8]) -> Option<usize> {
        let chunk = self.input.front_mut()?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.input.pop_front();
        }
        Some(n)
    }
}

impl Transport for MemoryTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Memory
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed() {
            return Err(TransportError::NotConnected);
        }
        self.take_chunk(buf).ok_or(TransportError::ConnectionClosed)
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<Option<usize>> {
        if self.closed() {
            return Err(TransportError::NotConnected);
        }
        match self.take_chunk(buf) {
            None if self.hung_up => Err(TransportError::ConnectionClosed),
            chunk => Ok(chunk),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed() {
            return Err(TransportError::NotConnected);
        }
        if let Ok(mut output) = self.tap.output.lock() {
            output.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed() {
            return Err(TransportError::NotConnected);
        }
        self.flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.tap.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed()
    }

    fn is_interactive(&self) -> bool {
        !self.non_interactive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_read_one_at_a_time() {
        let mut t = MemoryTransport::with_input([&b"ab"[..], &b"c"[..]]);
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(t.read(&mut buf).unwrap(), 1);
        assert_eq!(t.read_timeout(&mut buf, Duration::from_secs(1)).unwrap(), None);
        assert!(matches!(t.read(&mut buf), Err(TransportError::ConnectionClosed)));
    }

    #[test]
    fn test_hang_up_after_input() {
        let mut t = MemoryTransport::with_input([b"x"]);
        t.hang_up();
        let mut buf = [0u8; 8];
        assert_eq!(t.read_timeout(&mut buf, Duration::from_secs(1)).unwrap(), Some(1));
        assert!(matches!(
            t.read_timeout(&mut buf, Duration::from_secs(1)),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_partial_chunk_kept() {
        let mut t = MemoryTransport::with_input([b"hello"]);
        let mut buf = [0u8; 2];
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(t.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'o');
    }
}
