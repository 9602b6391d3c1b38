//! Auto-wrap avoidance
//!
//! Writing a character into the last column of the last row makes most
//! terminals scroll the whole screen up one line. Lines that would land
//! there are trimmed to one cell short, and cursor moves aimed at the very
//! last cell are pulled one column left.

use unicode_width::UnicodeWidthChar;

use super::art::TextMode;
use crate::core::term::ansi::ESC;

/// One lexical piece of an art line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    /// Control sequence or CR/LF, occupies no cells
    Invisible { start: usize, end: usize },
    /// A printable character and its display width
    Visible { start: usize, end: usize, width: usize },
}

impl Token {
    fn span(&self) -> (usize, usize) {
        match *self {
            Token::Invisible { start, end } | Token::Visible { start, end, .. } => (start, end),
        }
    }

    fn width(&self) -> usize {
        match *self {
            Token::Visible { width, .. } => width,
            Token::Invisible { .. } => 0,
        }
    }
}

/// Length of the escape sequence starting at `bytes[0] == ESC`
fn escape_len(bytes: &[u8]) -> usize {
    match bytes.get(1) {
        None => 1,
        Some(b'[') => {
            // CSI: parameters and intermediates up to a final byte 0x40..=0x7E
            bytes[2..]
                .iter()
                .position(|b| (0x40..=0x7e).contains(b))
                .map_or(bytes.len(), |i| i + 3)
        }
        Some(_) => 2,
    }
}

fn tokenize(line: &[u8], mode: TextMode) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < line.len() {
        let byte = line[i];
        if byte == ESC {
            let end = i + escape_len(&line[i..]);
            tokens.push(Token::Invisible { start: i, end });
            i = end;
        } else if byte == b'\r' || byte == b'\n' {
            tokens.push(Token::Invisible { start: i, end: i + 1 });
            i += 1;
        } else {
            let (len, width) = match mode {
                TextMode::Cp437 => (1, 1),
                TextMode::Utf8 => utf8_char(&line[i..]),
            };
            tokens.push(Token::Visible { start: i, end: i + len, width });
            i += len;
        }
    }
    tokens
}

/// Byte length and display width of the character at the start of `bytes`
fn utf8_char(bytes: &[u8]) -> (usize, usize) {
    let len = match bytes[0] {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
    .min(bytes.len());

    match std::str::from_utf8(&bytes[..len]).ok().and_then(|s| s.chars().next()) {
        Some(c) => (len, c.width().unwrap_or(0)),
        // Invalid byte: one replacement glyph
        None => (1, 1),
    }
}

/// Count the cells a line occupies, ignoring escapes and line breaks
pub fn count_visible(line: &[u8], mode: TextMode) -> usize {
    tokenize(line, mode).iter().map(Token::width).sum()
}

/// Drop visible characters from the end until fewer than `limit` remain.
///
/// Escape sequences, including ones that follow the dropped characters,
/// are kept so colour state stays intact.
pub fn trim_visible(line: &[u8], limit: usize, mode: TextMode) -> Vec<u8> {
    let tokens = tokenize(line, mode);
    let mut total: usize = tokens.iter().map(Token::width).sum();
    if total < limit {
        return line.to_vec();
    }

    let mut keep = vec![true; tokens.len()];
    for (idx, token) in tokens.iter().enumerate().rev() {
        if total < limit {
            break;
        }
        if let Token::Visible { width, .. } = *token {
            keep[idx] = false;
            total -= width;
        }
    }

    let mut out = Vec::with_capacity(line.len());
    for (token, _) in tokens.iter().zip(&keep).filter(|(_, k)| **k) {
        let (start, end) = token.span();
        out.extend_from_slice(&line[start..end]);
    }
    out
}

/// Keep a line that lands on the final row from reaching the last column
pub fn guard_last_row(line: &[u8], cols: u16, mode: TextMode) -> Vec<u8> {
    trim_visible(line, usize::from(cols), mode)
}

/// Guard a cursor-addressed art block that has no line breaks
pub fn guard_block(block: &[u8], rows: u16, cols: u16, mode: TextMode) -> Vec<u8> {
    trim_visible(block, usize::from(rows) * usize::from(cols), mode)
}

/// Rewrite `ESC[<rows>;<cols>H` (or `f`) to aim at column `cols - 1`
pub fn rewrite_last_cell(line: &[u8], rows: u16, cols: u16) -> Vec<u8> {
    if cols < 2 {
        return line.to_vec();
    }
    let target = format!("\x1b[{};{}", rows, cols);
    let target = target.as_bytes();

    let mut out = Vec::with_capacity(line.len());
    let mut i = 0;
    while i < line.len() {
        let rest = &line[i..];
        if rest.starts_with(target) {
            if let Some(&fin) = rest.get(target.len()) {
                if fin == b'H' || fin == b'f' {
                    out.extend_from_slice(format!("\x1b[{};{}", rows, cols - 1).as_bytes());
                    out.push(fin);
                    i += target.len() + 1;
                    continue;
                }
            }
        }
        out.push(line[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CP: TextMode = TextMode::Cp437;

    #[test]
    fn test_count_visible_skips_escapes() {
        assert_eq!(count_visible(b"\x1b[31mHELLO\x1b[0m", CP), 5);
        assert_eq!(count_visible(&[b'x'; 80], CP), 80);
        assert_eq!(count_visible(b"\x1b7ab\x1b8\r\n", CP), 2);
        assert_eq!(count_visible(b"\x1b[1;33;44m\xdb\xdb", CP), 2);
    }

    #[test]
    fn test_count_visible_unterminated_escape() {
        assert_eq!(count_visible(b"ab\x1b[31", CP), 2);
        assert_eq!(count_visible(b"ab\x1b", CP), 2);
    }

    #[test]
    fn test_count_visible_utf8_widths() {
        assert_eq!(count_visible("██░".as_bytes(), TextMode::Utf8), 3);
        assert_eq!(count_visible("日本".as_bytes(), TextMode::Utf8), 4);
        assert_eq!(count_visible("\x1b[32m╔═╗\x1b[0m".as_bytes(), TextMode::Utf8), 3);
    }

    #[test]
    fn test_trim_plain_line() {
        let line = vec![b'x'; 80];
        let out = guard_last_row(&line, 80, CP);
        assert_eq!(out.len(), 79);
        assert_eq!(count_visible(&out, CP), 79);
    }

    #[test]
    fn test_trim_keeps_surrounding_escapes() {
        let mut line = b"\x1b[31m".to_vec();
        line.extend(vec![b'x'; 79]);
        line.extend_from_slice(b"\x1b[32mY\x1b[0m");
        let out = guard_last_row(&line, 80, CP);

        assert_eq!(count_visible(&out, CP), 79);
        assert!(out.starts_with(b"\x1b[31m"));
        assert!(out.ends_with(b"x\x1b[32m\x1b[0m"));
    }

    #[test]
    fn test_short_line_untouched() {
        let line = b"\x1b[31mshort\x1b[0m";
        assert_eq!(guard_last_row(line, 80, CP), line.to_vec());
    }

    #[test]
    fn test_trim_long_line() {
        let line = vec![b'z'; 100];
        assert_eq!(count_visible(&guard_last_row(&line, 80, CP), CP), 79);
    }

    #[test]
    fn test_trim_wide_chars() {
        let line = "日".repeat(40);
        let out = guard_last_row(line.as_bytes(), 80, TextMode::Utf8);
        assert_eq!(count_visible(&out, TextMode::Utf8), 78);
        assert!(std::str::from_utf8(&out).is_ok());
    }

    #[test]
    fn test_guard_block() {
        let block = vec![b'#'; 80 * 25];
        let out = guard_block(&block, 25, 80, CP);
        assert_eq!(count_visible(&out, CP), 80 * 25 - 1);
    }

    #[test]
    fn test_rewrite_last_cell() {
        assert_eq!(rewrite_last_cell(b"\x1b[25;80HX", 25, 80), b"\x1b[25;79HX".to_vec());
        assert_eq!(rewrite_last_cell(b"a\x1b[25;80fb", 25, 80), b"a\x1b[25;79fb".to_vec());
        assert_eq!(rewrite_last_cell(b"\x1b[25;8HX", 25, 80), b"\x1b[25;8HX".to_vec());
        assert_eq!(rewrite_last_cell(b"\x1b[25;800H", 25, 80), b"\x1b[25;800H".to_vec());
        assert_eq!(rewrite_last_cell(b"\x1b[24;80H", 25, 80), b"\x1b[24;80H".to_vec());
    }
}
