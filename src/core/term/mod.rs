//! Remote terminal capabilities
//!
//! - **ansi**: the fixed set of control sequences the door emits
//! - **probe**: cursor position report size detection
//! - **input**: raw byte to key event decoding
//! - **guard**: raw mode for a local console

pub mod ansi;
pub mod guard;
pub mod input;
pub mod probe;

pub use guard::RawModeGuard;
pub use input::{InputDecoder, Key, KeyEvent};
pub use probe::{ProbeOptions, TerminalGeometry, TerminalSizeProber};
