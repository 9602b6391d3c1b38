//! Connection and terminal plumbing.
//!
//! - **transport**: the `Transport` trait and the factory that picks one
//! - **pipe** / **socket**: the two production transports
//! - **retry** / **race**: transient-error absorption and timed reads
//! - **term**: size probing, key decoding, control sequences
//! - **session**: the transport plus time limits and terminal restore
//! - **console**: Windows console preparation
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── Box<dyn Transport>
//! │   ├── PipeTransport    (stdin/stdout, redirected by the host)
//! │   └── SocketTransport  (inherited handle or fallback dial)
//! │       └── RacingReader (read-or-timeout worker)
//! │           └── Retrying (would-block absorption)
//! ├── RawModeGuard
//! └── SessionClock
//! ```

pub mod console;
#[cfg(test)]
pub mod memory;
pub mod pipe;
pub mod race;
pub mod retry;
pub mod session;
pub mod socket;
pub mod term;
pub mod transport;
