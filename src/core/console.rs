//! Local console preparation
//!
//! On Windows a host that redirects the standard handles through pipes is
//! running the door for a remote user (BBS mode). Otherwise the door owns a
//! real console, which needs virtual terminal processing switched on before
//! ANSI art renders correctly. Elsewhere these are no-ops.

use tracing::{debug, info};

/// How the standard handles are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Both standard input and output are pipes
    Redirected,
    /// Attached to a console or tty
    Attached,
}

/// Inspect the standard handles
#[cfg(windows)]
pub fn detect() -> ConsoleMode {
    use windows::Win32::Storage::FileSystem::{GetFileType, FILE_TYPE_PIPE};
    use windows::Win32::System::Console::{GetStdHandle, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE};

    unsafe {
        let input = GetStdHandle(STD_INPUT_HANDLE).unwrap_or_default();
        let output = GetStdHandle(STD_OUTPUT_HANDLE).unwrap_or_default();
        let in_pipe = GetFileType(input) == FILE_TYPE_PIPE;
        let out_pipe = GetFileType(output) == FILE_TYPE_PIPE;
        debug!(in_pipe, out_pipe, "Standard handle types");
        if in_pipe && out_pipe {
            ConsoleMode::Redirected
        } else {
            ConsoleMode::Attached
        }
    }
}

#[cfg(not(windows))]
pub fn detect() -> ConsoleMode {
    use std::io::IsTerminal;

    let in_tty = std::io::stdin().is_terminal();
    let out_tty = std::io::stdout().is_terminal();
    debug!(in_tty, out_tty, "Standard stream types");
    if !in_tty && !out_tty {
        ConsoleMode::Redirected
    } else {
        ConsoleMode::Attached
    }
}

/// Turn on ANSI processing for the attached console
#[cfg(windows)]
pub fn enable_virtual_terminal() {
    use tracing::warn;
    use windows::Win32::System::Console::{
        GetConsoleMode, GetStdHandle, SetConsoleMode, CONSOLE_MODE,
        ENABLE_VIRTUAL_TERMINAL_PROCESSING, STD_OUTPUT_HANDLE,
    };

    unsafe {
        let handle = GetStdHandle(STD_OUTPUT_HANDLE).unwrap_or_default();
        let mut mode = CONSOLE_MODE(0);
        if GetConsoleMode(handle, &mut mode).is_err() {
            // Redirected output has no console mode
            debug!("Output is not a console, skipping VT setup");
            return;
        }
        let new_mode = CONSOLE_MODE(mode.0 | ENABLE_VIRTUAL_TERMINAL_PROCESSING.0);
        match SetConsoleMode(handle, new_mode) {
            Ok(()) => info!("Virtual terminal processing enabled"),
            Err(e) => warn!(error = ?e, "Failed to enable virtual terminal processing"),
        }
    }
}

#[cfg(not(windows))]
pub fn enable_virtual_terminal() {}

/// Prepare the process console and report how it is wired
pub fn prepare() -> ConsoleMode {
    let mode = detect();
    info!(?mode, "Console detected");
    if mode == ConsoleMode::Attached {
        enable_virtual_terminal();
    }
    mode
}
