//! Transient-error absorption
//!
//! Inherited handles are sometimes left non-blocking by the host, so a plain
//! `read` can fail with `WouldBlock` even though the caller expects to wait.
//! These helpers retry such conditions with a fixed delay and turn the
//! connection-ending ones into `ConnectionClosed`.

use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::transport::TransportError;

/// How transient conditions are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts
    pub delay: Duration,
    /// Maximum attempts for a single write, `None` for unbounded
    pub write_limit: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(10),
            write_limit: Some(1000),
        }
    }
}

/// Condition that resolves by waiting
pub fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// Condition that means the remote side is gone
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected
    )
}

/// Map an I/O error onto the transport taxonomy
pub fn classify(err: io::Error) -> TransportError {
    if is_disconnect(&err) {
        info!(error = %err, "Connection terminated");
        TransportError::ConnectionClosed
    } else {
        TransportError::Io(err)
    }
}

/// Blocking read that never surfaces a transient condition.
///
/// End of stream counts as a closed connection: a door always expects more
/// input until the user leaves.
pub fn read_retrying<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
    policy: &RetryPolicy,
) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let mut spins: u64 = 0;
    loop {
        match reader.read(buf) {
            Ok(0) => {
                return Err(io::Error::new(ErrorKind::UnexpectedEof, "end of input stream"));
            }
            Ok(n) => {
                if spins > 0 {
                    debug!(spins, "Read completed after transient retries");
                }
                return Ok(n);
            }
            Err(e) if is_transient(&e) => {
                spins += 1;
                thread::sleep(policy.delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Write with a bounded number of transient retries
pub fn write_retrying<W: Write + ?Sized>(
    writer: &mut W,
    buf: &[u8],
    policy: &RetryPolicy,
) -> Result<usize, TransportError> {
    if buf.is_empty() {
        return Ok(0);
    }
    let mut attempts: u32 = 0;
    loop {
        match writer.write(buf) {
            Ok(0) => return Err(TransportError::ConnectionClosed),
            Ok(n) => return Ok(n),
            Err(e) if is_transient(&e) => {
                attempts += 1;
                if let Some(limit) = policy.write_limit {
                    if attempts >= limit {
                        return Err(TransportError::Stalled { attempts });
                    }
                }
                thread::sleep(policy.delay);
            }
            Err(e) => return Err(classify(e)),
        }
    }
}

/// Flush with the same transient handling as writes
pub fn flush_retrying<W: Write + ?Sized>(
    writer: &mut W,
    policy: &RetryPolicy,
) -> Result<(), TransportError> {
    let mut attempts: u32 = 0;
    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(e) if is_transient(&e) => {
                attempts += 1;
                if let Some(limit) = policy.write_limit {
                    if attempts >= limit {
                        return Err(TransportError::Stalled { attempts });
                    }
                }
                thread::sleep(policy.delay);
            }
            Err(e) => return Err(classify(e)),
        }
    }
}

/// Reader adapter that applies [`read_retrying`] to every call
pub struct Retrying<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R> Retrying<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<R: Read> Read for Retrying<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_retrying(&mut self.inner, buf, &self.policy)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted I/O doubles shared by transport tests.

    use std::collections::VecDeque;
    use std::io::{self, ErrorKind, Read, Write};

    /// One scripted outcome of a read or write call
    #[derive(Debug)]
    pub enum Step {
        Data(Vec<u8>),
        Fail(ErrorKind),
    }

    /// Reader that replays a script of outcomes
    #[derive(Debug, Default)]
    pub struct ScriptedReader {
        pub steps: VecDeque<Step>,
        pub calls: usize,
    }

    impl ScriptedReader {
        pub fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                calls: 0,
            }
        }

        /// `n` would-block failures followed by `data`
        pub fn would_block_then(n: usize, data: &[u8]) -> Self {
            let mut steps: Vec<Step> = (0..n).map(|_| Step::Fail(ErrorKind::WouldBlock)).collect();
            steps.push(Step::Data(data.to_vec()));
            Self::new(steps)
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            match self.steps.pop_front() {
                Some(Step::Data(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(Step::Fail(kind)) => Err(io::Error::from(kind)),
                None => Ok(0),
            }
        }
    }

    /// Writer that fails according to a script, then accepts everything
    #[derive(Debug, Default)]
    pub struct ScriptedWriter {
        pub failures: VecDeque<ErrorKind>,
        pub written: Vec<u8>,
        pub flushes: usize,
    }

    impl Write for ScriptedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(kind) = self.failures.pop_front() {
                return Err(io::Error::from(kind));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }
}
