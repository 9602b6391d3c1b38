//! Read-or-timeout race
//!
//! A blocking read cannot be interrupted portably, so a timed read hands the
//! read to a worker thread and waits on a one-slot channel with a deadline.
//! When the deadline wins the worker is left alone; its result is parked and
//! handed to whichever read comes next, so a late keystroke is not lost.

use std::io::{self, ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

/// Largest chunk a single worker read asks for
const CHUNK: usize = 256;

type Outcome = io::Result<Vec<u8>>;

/// Wraps a blocking reader and adds [`RacingReader::read_timeout`]
pub struct RacingReader<R> {
    source: Arc<Mutex<R>>,
    /// Completion slot of a read abandoned by an earlier timeout
    pending: Option<Receiver<Outcome>>,
    /// Bytes received but not yet handed to a caller
    spill: Vec<u8>,
}

impl<R: Read + Send + 'static> RacingReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            pending: None,
            spill: Vec::new(),
        }
    }

    /// Blocking read
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.spill.is_empty() {
            return Ok(self.drain_spill(buf));
        }
        if let Some(rx) = self.pending.take() {
            let outcome = rx.recv().map_err(|_| worker_lost())?;
            return self.deliver(outcome, buf);
        }
        let mut source = self
            .source
            .lock()
            .map_err(|_| io::Error::new(ErrorKind::Other, "reader poisoned"))?;
        source.read(buf)
    }

    /// Read with a deadline. `Ok(None)` means the deadline passed first.
    pub fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        if !self.spill.is_empty() {
            return Ok(Some(self.drain_spill(buf)));
        }

        let rx = match self.pending.take() {
            Some(rx) => rx,
            None => self.spawn_read(buf.len().max(1)),
        };

        match rx.recv_timeout(timeout) {
            Ok(outcome) => self.deliver(outcome, buf).map(Some),
            Err(RecvTimeoutError::Timeout) => {
                debug!(?timeout, "Timed read abandoned, result parked");
                self.pending = Some(rx);
                Ok(None)
            }
            Err(RecvTimeoutError::Disconnected) => Err(worker_lost()),
        }
    }

    /// Whether an abandoned read is still outstanding
    #[allow(dead_code)]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn spawn_read(&self, want: usize) -> Receiver<Outcome> {
        let (tx, rx) = mpsc::sync_channel::<Outcome>(1);
        let source = Arc::clone(&self.source);
        let want = want.min(CHUNK);

        thread::spawn(move || {
            let outcome = match source.lock() {
                Ok(mut reader) => {
                    let mut chunk = vec![0u8; want];
                    reader.read(&mut chunk).map(|n| {
                        chunk.truncate(n);
                        chunk
                    })
                }
                Err(_) => Err(io::Error::new(ErrorKind::Other, "reader poisoned")),
            };
            // Receiver may be gone if the process is shutting down
            let _ = tx.send(outcome);
        });

        rx
    }

    fn deliver(&mut self, outcome: Outcome, buf: &mut [u8]) -> io::Result<usize> {
        let data = outcome?;
        self.spill = data;
        Ok(self.drain_spill(buf))
    }

    fn drain_spill(&mut self, buf: &mut [u8]) -> usize {
        let n = self.spill.len().min(buf.len());
        buf[..n].copy_from_slice(&self.spill[..n]);
        self.spill.drain(..n);
        n
    }
}

fn worker_lost() -> io::Error {
    io::Error::new(ErrorKind::Other, "read worker exited without a result")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Sender;

    /// Reader fed from a channel so tests control when bytes arrive
    struct Feed(Receiver<Vec<u8>>);

    impl Read for Feed {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(data) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    fn feed() -> (Sender<Vec<u8>>, RacingReader<Feed>) {
        let (tx, rx) = mpsc::channel();
        (tx, RacingReader::new(Feed(rx)))
    }

    #[test]
    fn test_timed_read_returns_data() {
        let (tx, mut reader) = feed();
        tx.send(b"abc".to_vec()).unwrap();
        let mut buf = [0u8; 16];
        let n = reader.read_timeout(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(n, Some(3));
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_timeout_parks_read_for_next_call() {
        let (tx, mut reader) = feed();
        let mut buf = [0u8; 16];
        let first = reader.read_timeout(&mut buf, Duration::from_millis(20)).unwrap();
        assert_eq!(first, None);
        assert!(reader.has_pending());

        tx.send(b"late".to_vec()).unwrap();
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"late");
        assert!(!reader.has_pending());
    }

    #[test]
    fn test_parked_read_reused_by_next_timed_read() {
        let (tx, mut reader) = feed();
        let mut buf = [0u8; 16];
        assert_eq!(reader.read_timeout(&mut buf, Duration::from_millis(10)).unwrap(), None);
        tx.send(b"k".to_vec()).unwrap();
        let n = reader.read_timeout(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(n, Some(1));
        assert_eq!(buf[0], b'k');
    }

    #[test]
    fn test_small_buffer_spills() {
        let (tx, mut reader) = feed();
        let mut buf = [0u8; 16];
        assert_eq!(reader.read_timeout(&mut buf, Duration::from_millis(10)).unwrap(), None);

        tx.send(b"abcdef".to_vec()).unwrap();
        let mut small = [0u8; 2];
        assert_eq!(reader.read(&mut small).unwrap(), 2);
        assert_eq!(&small, b"ab");
        assert_eq!(reader.read(&mut small).unwrap(), 2);
        assert_eq!(&small, b"cd");
        assert_eq!(reader.read_timeout(&mut small, Duration::from_millis(10)).unwrap(), Some(2));
        assert_eq!(&small, b"ef");
    }
}
