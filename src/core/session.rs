//! Session management
//!
//! A session owns the single transport to the user, the local raw mode
//! guard, and the idle and maximum time limits. Releasing it restores the
//! remote and local terminal on every exit path.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::term::{ansi, InputDecoder, KeyEvent, RawModeGuard};
use super::transport::{Result, Transport, TransportError};

/// Why a session ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Idle,
    MaxTime,
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiry::Idle => write!(f, "idle timeout"),
            Expiry::MaxTime => write!(f, "time limit"),
        }
    }
}

impl Expiry {
    /// Text shown to the user before disconnecting
    fn notice(self) -> &'static str {
        match self {
            Expiry::Idle => "You have been idle too long. Goodbye!",
            Expiry::MaxTime => "Your time for this session is up. Goodbye!",
        }
    }
}

/// Idle and maximum session deadlines
#[derive(Debug, Clone)]
pub struct SessionClock {
    idle_timeout: Duration,
    last_activity: Instant,
    max_deadline: Instant,
}

impl SessionClock {
    pub fn new(idle_timeout: Duration, max_duration: Duration) -> Self {
        Self::starting_at(Instant::now(), idle_timeout, max_duration)
    }

    pub fn starting_at(now: Instant, idle_timeout: Duration, max_duration: Duration) -> Self {
        Self {
            idle_timeout,
            last_activity: now,
            max_deadline: now + max_duration,
        }
    }

    /// Record user activity
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Time until the nearer deadline, or which deadline has passed
    pub fn next_wait(&self) -> std::result::Result<Duration, Expiry> {
        self.next_wait_at(Instant::now())
    }

    pub fn next_wait_at(&self, now: Instant) -> std::result::Result<Duration, Expiry> {
        if now >= self.max_deadline {
            return Err(Expiry::MaxTime);
        }
        let idle_deadline = self.last_activity + self.idle_timeout;
        if now >= idle_deadline {
            return Err(Expiry::Idle);
        }
        Ok(idle_deadline.min(self.max_deadline) - now)
    }

    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.max_deadline.saturating_duration_since(now)
    }
}

/// Result of waiting for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    Key(KeyEvent),
    Expired(Expiry),
}

/// A running door session
pub struct Session {
    transport: Box<dyn Transport>,
    raw_mode: RawModeGuard,
    decoder: InputDecoder,
    clock: SessionClock,
    released: bool,
}

impl Session {
    pub fn new(transport: Box<dyn Transport>, raw_mode: RawModeGuard, clock: SessionClock) -> Self {
        Self {
            transport,
            raw_mode,
            decoder: InputDecoder::new(),
            clock,
            released: false,
        }
    }

    /// Hide the cursor for the duration of the session
    pub fn start(&mut self) -> Result<()> {
        info!(
            kind = ?self.transport.kind(),
            raw = self.raw_mode.is_active(),
            minutes = self.clock.remaining_at(Instant::now()).as_secs() / 60,
            "Session started"
        );
        self.transport.write_all(ansi::HIDE_CURSOR.as_bytes())?;
        self.transport.flush()
    }

    pub fn transport(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Wait for a key or for the nearer deadline
    pub fn next_input(&mut self) -> Result<SessionInput> {
        loop {
            let wait = match self.clock.next_wait() {
                Ok(wait) => wait,
                Err(expiry) => {
                    info!(%expiry, "Session expired");
                    return Ok(SessionInput::Expired(expiry));
                }
            };
            if let Some(key) = self.decoder.read_key_timeout(self.transport.as_mut(), wait)? {
                self.clock.touch();
                debug!(%key, "Key");
                return Ok(SessionInput::Key(key));
            }
        }
    }

    /// Tell the user the session is over
    pub fn announce_expiry(&mut self, expiry: Expiry) -> Result<()> {
        let mut text = String::new();
        text.push_str(ansi::RESET);
        text.push_str("\r\n\r\n");
        text.push_str(ansi::HIGHLIGHT);
        text.push_str(expiry.notice());
        text.push_str(ansi::RESET);
        text.push_str("\r\n");
        self.transport.write_all(text.as_bytes())?;
        self.transport.flush()
    }

    /// Flush, restore the terminal, and close the transport. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if !self.transport.is_closed() {
            let mut tail = String::new();
            tail.push_str(ansi::RESET);
            tail.push_str(ansi::SHOW_CURSOR);
            let restored = self
                .transport
                .write_all(tail.as_bytes())
                .and_then(|_| self.transport.flush());
            match restored {
                Ok(()) => {}
                // Nothing to restore on a dead line
                Err(TransportError::ConnectionClosed) | Err(TransportError::NotConnected) => {}
                Err(e) => warn!(error = %e, "Failed to restore remote terminal"),
            }
        }

        self.raw_mode.release();

        if let Err(e) = self.transport.close() {
            warn!(error = %e, "Failed to close transport");
        }
        info!("Session released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
