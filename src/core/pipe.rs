//! Pipe transport
//!
//! Used when the host redirects the door's standard streams, and for the
//! local console. Output is buffered; flushing blocks until the buffer has
//! been handed to the OS.

use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::time::Duration;

use tracing::{debug, info};

use super::race::RacingReader;
use super::retry::{self, classify, RetryPolicy, Retrying};
use super::transport::{Result, Transport, TransportError, TransportKind, TransportOptions};

type BoxedReader = Box<dyn Read + Send>;
type BoxedWriter = Box<dyn Write + Send>;

/// Transport over a pair of byte streams
pub struct PipeTransport {
    reader: Option<RacingReader<Retrying<BoxedReader>>>,
    writer: Option<BufWriter<BoxedWriter>>,
    policy: RetryPolicy,
    interactive: bool,
}

impl PipeTransport {
    pub fn new(
        reader: BoxedReader,
        writer: BoxedWriter,
        interactive: bool,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            reader: Some(RacingReader::new(Retrying::new(reader, policy))),
            writer: Some(BufWriter::new(writer)),
            policy,
            interactive,
        }
    }

    /// Transport over the process's standard input and output
    pub fn stdio(options: &TransportOptions) -> Self {
        let tty = io::stdin().is_terminal();
        let interactive = tty || options.probe_pipes;
        info!(tty, interactive, "Using standard streams");
        Self::new(
            Box::new(io::stdin()),
            Box::new(io::stdout()),
            interactive,
            options.retry,
        )
    }

    fn writer(&mut self) -> Result<&mut BufWriter<BoxedWriter>> {
        self.writer.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Transport for PipeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
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
        retry::write_retrying(self.writer()?, buf, &policy)
    }

    fn flush(&mut self) -> Result<()> {
        let policy = self.policy;
        retry::flush_retrying(self.writer()?, &policy)
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        self.reader = None;
        debug!("Closing pipe transport");
        retry::flush_retrying(&mut writer, &self.policy)
    }

    fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }
}

impl Drop for PipeTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
