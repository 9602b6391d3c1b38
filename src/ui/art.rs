//! Art file preparation
//!
//! ANSI art is stored as CP437 bytes, often followed by a SAUCE metadata
//! record and an optional comment block. Before display the metadata is cut
//! off, the DOS end-of-file marker removed, and the text split into lines.
//! For a local console the bytes are converted to UTF-8.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// DOS end-of-file marker that precedes SAUCE
const SUB: u8 = 0x1a;

/// SAUCE record: "SAUCE00" signature, fixed 128 bytes at end of file
const SAUCE_ID: &[u8] = b"SAUCE00";
const SAUCE_LEN: usize = 128;
/// Offset of the comment line count inside the record
const SAUCE_COMMENTS: usize = 104;
/// Comment block: "COMNT" then 64 bytes per line
const COMMENT_ID: &[u8] = b"COMNT";
const COMMENT_LINE: usize = 64;

/// How art bytes reach the screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMode {
    /// Raw CP437 bytes, for remote BBS terminals
    #[default]
    Cp437,
    /// CP437 decoded to UTF-8, for a local console
    Utf8,
}

/// Unicode for CP437 bytes 0x80..=0xFF
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// Decode one CP437 byte. The ASCII half, controls included, maps to itself.
pub fn cp437_char(byte: u8) -> char {
    if byte < 0x80 {
        char::from(byte)
    } else {
        CP437_HIGH[usize::from(byte - 0x80)]
    }
}

/// Convert CP437 text to UTF-8
pub fn cp437_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| cp437_char(b)).collect()
}

/// Cut the SAUCE record, its comment block, and trailing EOF markers
pub fn strip_sauce(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();

    if end >= SAUCE_LEN && bytes[end - SAUCE_LEN..].starts_with(SAUCE_ID) {
        let record = end - SAUCE_LEN;
        let comments = usize::from(bytes[record + SAUCE_COMMENTS]);
        end = record;
        let block = COMMENT_ID.len() + comments * COMMENT_LINE;
        if comments > 0 && end >= block && bytes[end - block..].starts_with(COMMENT_ID) {
            end -= block;
        }
    } else if let Some(pos) = find(bytes, COMMENT_ID).or_else(|| find(bytes, SAUCE_ID)) {
        // Truncated or padded record: cut at the first marker
        end = pos;
    }

    let mut body = &bytes[..end];
    while let Some((&SUB, rest)) = body.split_last() {
        body = rest;
    }
    body
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split on CRLF or bare LF. A final line terminator does not start a new line.
pub fn split_lines(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut lines: Vec<Vec<u8>> = bytes
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
        .collect();
    if lines.len() > 1 && lines.last().map_or(false, |l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// A screen of art, ready for the render pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Art {
    pub lines: Vec<Vec<u8>>,
    pub mode: TextMode,
}

impl Art {
    /// Prepare raw file contents
    pub fn from_bytes(raw: &[u8], mode: TextMode) -> Self {
        let body = strip_sauce(raw);
        let lines = split_lines(body)
            .into_iter()
            .map(|line| match mode {
                TextMode::Cp437 => line,
                TextMode::Utf8 => cp437_to_utf8(&line).into_bytes(),
            })
            .collect();
        Self { lines, mode }
    }

    pub fn load(path: &Path, mode: TextMode) -> io::Result<Self> {
        let raw = fs::read(path)?;
        Ok(Self::from_bytes(&raw, mode))
    }

    /// One line of plain text, shown when no art is available
    pub fn placeholder(text: &str, mode: TextMode) -> Self {
        Self {
            lines: vec![text.as_bytes().to_vec()],
            mode,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.is_empty())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sauce_record(comments: u8) -> Vec<u8> {
        let mut record = vec![b' '; SAUCE_LEN];
        record[..SAUCE_ID.len()].copy_from_slice(SAUCE_ID);
        record[SAUCE_COMMENTS] = comments;
        record
    }

    #[test]
    fn test_cp437_shading_and_boxes() {
        assert_eq!(cp437_to_utf8(&[0xb0, 0xb1, 0xb2, 0xdb]), "░▒▓█");
        assert_eq!(cp437_to_utf8(&[0xc9, 0xcd, 0xbb]), "╔═╗");
        assert_eq!(cp437_to_utf8(b"\x1b[31mA"), "\x1b[31mA");
        assert_eq!(cp437_char(0xff), '\u{a0}');
    }

    #[test]
    fn test_strip_sauce_record() {
        let mut raw = b"ART\r\n".to_vec();
        raw.push(SUB);
        raw.extend(sauce_record(0));
        assert_eq!(strip_sauce(&raw), b"ART\r\n");
    }

    #[test]
    fn test_strip_sauce_with_comments() {
        let mut raw = b"ART".to_vec();
        raw.push(SUB);
        raw.extend_from_slice(COMMENT_ID);
        raw.extend(vec![b'c'; COMMENT_LINE * 2]);
        raw.extend(sauce_record(2));
        assert_eq!(strip_sauce(&raw), b"ART");
    }

    #[test]
    fn test_strip_loose_marker() {
        assert_eq!(strip_sauce(b"ART\x1aSAUCE00 short"), b"ART");
        assert_eq!(strip_sauce(b"plain"), b"plain");
        assert_eq!(strip_sauce(b"eof\x1a\x1a"), b"eof");
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines(b"a\r\nb\nc"), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(split_lines(b"a\r\nb\r\n"), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(split_lines(b""), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_art_utf8_mode() {
        let art = Art::from_bytes(b"\xdb\xdb\r\nok\r\n", TextMode::Utf8);
        assert_eq!(art.lines, vec!["██".as_bytes().to_vec(), b"ok".to_vec()]);
    }

    #[test]
    fn test_placeholder() {
        let art = Art::placeholder("missing", TextMode::Cp437);
        assert_eq!(art.len(), 1);
        assert!(!art.is_empty());
        assert!(Art::from_bytes(b"", TextMode::Cp437).is_empty());
    }
}
