//! Raw mode for a local console
//!
//! Remote users are already in raw mode from the door's point of view; only
//! when the door reads keys from a real tty does line buffering and echo
//! need to be switched off.

use std::io;

use crossterm::terminal;
use tracing::{debug, warn};

/// Keeps the local tty in raw mode until released
#[derive(Debug, Default)]
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Guard that owns nothing
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Switch the controlling tty to raw mode
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        debug!("Raw mode enabled");
        Ok(Self { active: true })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Restore cooked mode. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        match terminal::disable_raw_mode() {
            Ok(()) => debug!("Raw mode disabled"),
            Err(e) => warn!(error = %e, "Failed to restore terminal mode"),
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        self.release();
    }
}
