//! Control sequences the door sends to the remote terminal
//!
//! Only a fixed, small set is produced. Everything here is plain 7-bit ASCII
//! so it passes through CP437 streams untouched.

use crossterm::cursor::MoveTo;
use crossterm::Command;

pub const ESC: u8 = 0x1b;

/// `ESC 7`
pub const SAVE_CURSOR: &str = "\x1b7";
/// `ESC 8`
pub const RESTORE_CURSOR: &str = "\x1b8";
/// Clear the whole screen and home the cursor
pub const CLEAR_HOME: &str = "\x1b[2J\x1b[H";
/// Erase from the cursor to end of line
pub const ERASE_EOL: &str = "\x1b[K";
pub const ERASE_LINE: &str = "\x1b[2K";
pub const RESET: &str = "\x1b[0m";
/// Black foreground, hides echoed probe replies on a black background
pub const CONCEAL: &str = "\x1b[30m";
/// Bright white on black, used for status text
pub const HIGHLIGHT: &str = "\x1b[97;40m";
pub const BOLD_WHITE: &str = "\x1b[37;1m";
pub const SHOW_CURSOR: &str = "\x1b[?25h";
pub const HIDE_CURSOR: &str = "\x1b[?25l";
/// Ask for a cursor position report
pub const QUERY_CURSOR: &str = "\x1b[6n";

/// Render a crossterm command as its ANSI text
pub fn ansi<C: Command>(command: C) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = command.write_ansi(&mut out);
    out
}

/// Absolute cursor position, 1-based like the wire format
pub fn move_to(row: u16, col: u16) -> String {
    ansi(MoveTo(col.saturating_sub(1), row.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_to_is_one_based() {
        assert_eq!(move_to(1, 1), "\x1b[1;1H");
        assert_eq!(move_to(25, 80), "\x1b[25;80H");
        assert_eq!(move_to(999, 999), "\x1b[999;999H");
    }

    #[test]
    fn test_move_to_clamps_zero() {
        assert_eq!(move_to(0, 0), "\x1b[1;1H");
    }
}
