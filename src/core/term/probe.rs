//! Terminal size probing
//!
//! Door hosts rarely pass the user's screen size along, so it is measured:
//! the cursor is parked at row/column 999 (terminals clamp it to their last
//! cell) and a cursor position report is requested. The reply
//! `ESC [ rows ; cols R` is the geometry.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::ansi;
use crate::core::transport::{Transport, TransportError};

/// Upper bound on the reply size
const RESPONSE_CAP: usize = 32;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("no cursor position report within {0:?}")]
    Timeout(Duration),

    #[error("remote side is not an interactive terminal")]
    NotATerminal,

    #[error("malformed cursor position report: {0:?}")]
    Malformed(String),

    #[error("transport failed during probe: {0}")]
    Transport(#[from] TransportError),
}

/// Screen size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalGeometry {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalGeometry {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self::new(80, 25)
    }
}

/// Probe settings
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout: Duration,
    /// Paint the reply black-on-black in case the terminal echoes it
    pub hide_echo: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            hide_echo: true,
        }
    }
}

/// Measures the remote terminal over a transport
pub struct TerminalSizeProber {
    options: ProbeOptions,
}

impl TerminalSizeProber {
    pub fn new(options: ProbeOptions) -> Self {
        Self { options }
    }

    /// Ask the terminal for its size.
    ///
    /// Once the query has been sent the screen is always restored, whether
    /// or not a usable answer came back.
    pub fn probe(&self, transport: &mut dyn Transport) -> Result<TerminalGeometry, ProbeError> {
        if !transport.is_interactive() {
            return Err(ProbeError::NotATerminal);
        }

        let mut query = String::with_capacity(48);
        query.push_str(ansi::CLEAR_HOME);
        query.push_str(ansi::SAVE_CURSOR);
        query.push_str(&ansi::move_to(999, 999));
        if self.options.hide_echo {
            query.push_str(ansi::CONCEAL);
        }
        query.push_str(ansi::QUERY_CURSOR);

        transport.write_all(query.as_bytes())?;
        transport.flush()?;

        let outcome = self
            .read_response(transport)
            .and_then(|reply| parse_cpr(&reply));

        let mut restore = String::with_capacity(24);
        restore.push_str(ansi::RESTORE_CURSOR);
        restore.push_str(ansi::RESET);
        restore.push_str(ansi::ERASE_LINE);
        restore.push_str(ansi::CLEAR_HOME);
        let restored = transport
            .write_all(restore.as_bytes())
            .and_then(|_| transport.flush());

        match (outcome, restored) {
            (Ok(geometry), Ok(())) => {
                info!(cols = geometry.cols, rows = geometry.rows, "Detected terminal size");
                Ok(geometry)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), _) => {
                warn!(error = %e, "Terminal size probe failed");
                Err(e)
            }
        }
    }

    /// Probe, falling back to the default 80x25 on any failure
    pub fn probe_or_default(&self, transport: &mut dyn Transport) -> TerminalGeometry {
        self.probe(transport).unwrap_or_default()
    }

    /// Gather reply bytes until an `R`, a full buffer, or the deadline
    fn read_response(&self, transport: &mut dyn Transport) -> Result<Vec<u8>, ProbeError> {
        let deadline = Instant::now() + self.options.timeout;
        let mut reply = Vec::with_capacity(RESPONSE_CAP);
        let mut chunk = [0u8; RESPONSE_CAP];

        while reply.len() < RESPONSE_CAP {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let room = RESPONSE_CAP - reply.len();
            match transport.read_timeout(&mut chunk[..room], remaining)? {
                Some(n) => {
                    reply.extend_from_slice(&chunk[..n]);
                    if chunk[..n].contains(&b'R') {
                        break;
                    }
                }
                None => break,
            }
        }

        debug!(reply = ?String::from_utf8_lossy(&reply), "Cursor position reply");
        if reply.is_empty() {
            return Err(ProbeError::Timeout(self.options.timeout));
        }
        Ok(reply)
    }
}

/// Parse `ESC [ rows ; cols R` anywhere in `reply`
pub fn parse_cpr(reply: &[u8]) -> Result<TerminalGeometry, ProbeError> {
    let malformed = || ProbeError::Malformed(String::from_utf8_lossy(reply).into_owned());

    let mut from = 0;
    while let Some(offset) = reply
        .get(from..)
        .and_then(|rest| rest.windows(2).position(|w| w == [ansi::ESC, b'[']))
    {
        let start = from + offset + 2;
        if let Some(geometry) = parse_cpr_body(reply.get(start..).unwrap_or_default()) {
            return Ok(geometry);
        }
        from = start;
    }
    Err(malformed())
}

fn parse_cpr_body(body: &[u8]) -> Option<TerminalGeometry> {
    let end = body.iter().position(|&b| b == b'R')?;
    let fields = std::str::from_utf8(&body[..end]).ok()?;
    let (rows, cols) = fields.split_once(';')?;
    if !is_digits(rows) || !is_digits(cols) {
        return None;
    }
    let rows: u16 = rows.parse().ok()?;
    let cols: u16 = cols.parse().ok()?;
    if rows == 0 || cols == 0 {
        return None;
    }
    Some(TerminalGeometry::new(cols, rows))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::MemoryTransport;

    fn prober() -> TerminalSizeProber {
        TerminalSizeProber::new(ProbeOptions::default())
    }

    #[test]
    fn test_parse_cpr() {
        assert_eq!(parse_cpr(b"\x1b[25;80R").unwrap(), TerminalGeometry::new(80, 25));
        assert_eq!(parse_cpr(b"\x1b[50;132R").unwrap(), TerminalGeometry::new(132, 50));
    }

    #[test]
    fn test_parse_cpr_with_noise() {
        let geometry = parse_cpr(b"q\x1b[A\x1b[24;80R").unwrap();
        assert_eq!(geometry, TerminalGeometry::new(80, 24));
    }

    #[test]
    fn test_parse_cpr_errors() {
        assert!(matches!(parse_cpr(b"\x1b[25;80"), Err(ProbeError::Malformed(_))));
        assert!(matches!(parse_cpr(b"\x1b[ab;80R"), Err(ProbeError::Malformed(_))));
        assert!(matches!(parse_cpr(b"\x1b[25R"), Err(ProbeError::Malformed(_))));
        assert!(matches!(parse_cpr(b"\x1b[0;80R"), Err(ProbeError::Malformed(_))));
        assert!(matches!(parse_cpr(b"\x1b["), Err(ProbeError::Malformed(_))));
        assert!(matches!(parse_cpr(b""), Err(ProbeError::Malformed(_))));
    }

    #[test]
    fn test_probe_round_trip() {
        let mut t = MemoryTransport::with_input([b"\x1b[25;80R"]);
        let geometry = prober().probe(&mut t).unwrap();
        assert_eq!(geometry, TerminalGeometry::new(80, 25));

        let out = t.output_lossy();
        assert!(out.starts_with("\x1b[2J\x1b[H\x1b7\x1b[999;999H\x1b[30m\x1b[6n"));
        assert!(out.ends_with("\x1b8\x1b[0m\x1b[2K\x1b[2J\x1b[H"));
    }

    #[test]
    fn test_probe_accumulates_split_reply() {
        let mut t = MemoryTransport::with_input([&b"\x1b[3"[..], &b"0;1"[..], &b"00R"[..]]);
        let geometry = prober().probe(&mut t).unwrap();
        assert_eq!(geometry, TerminalGeometry::new(100, 30));
    }

    #[test]
    fn test_probe_without_echo_hiding() {
        let mut t = MemoryTransport::with_input([b"\x1b[25;80R"]);
        let prober = TerminalSizeProber::new(ProbeOptions {
            hide_echo: false,
            ..ProbeOptions::default()
        });
        prober.probe(&mut t).unwrap();
        assert!(!t.output_lossy().contains("\x1b[30m"));
    }

    #[test]
    fn test_timeout_still_restores_screen() {
        let mut t = MemoryTransport::new();
        let err = prober().probe(&mut t).unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
        assert!(t.output_lossy().ends_with("\x1b8\x1b[0m\x1b[2K\x1b[2J\x1b[H"));
    }

    #[test]
    fn test_not_a_terminal_sends_nothing() {
        let mut t = MemoryTransport::new();
        t.set_interactive(false);
        assert!(matches!(prober().probe(&mut t), Err(ProbeError::NotATerminal)));
        assert!(t.output().is_empty());
    }

    #[test]
    fn test_fallback_geometry() {
        let mut t = MemoryTransport::with_input([b"garbage"]);
        assert_eq!(prober().probe_or_default(&mut t), TerminalGeometry::new(80, 25));
    }
}
