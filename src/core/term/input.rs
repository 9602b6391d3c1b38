//! Keyboard input decoding
//!
//! Remote terminals send keys as raw bytes. A single read normally carries
//! exactly one keystroke, so each read is decoded as a unit: a lone ESC is
//! the Escape key, ESC followed by more bytes is looked up in a fixed table
//! of cursor and function key sequences.

use std::fmt;
use std::time::Duration;

use crate::core::transport::{Result, Transport};

/// Bytes requested per read
const READ_CHUNK: usize = 32;

/// Named keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Plain character (see [`KeyEvent::rune`]) or an unrecognized sequence
    Unknown,
    Escape,
    Enter,
    Space,
    Backspace,
    Tab,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    PageUp,
    PageDown,
    Home,
    End,
    Insert,
    Delete,
    /// F1..F12
    F(u8),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Unknown => write!(f, "Unknown"),
            Key::Escape => write!(f, "Esc"),
            Key::Enter => write!(f, "Enter"),
            Key::Space => write!(f, "Space"),
            Key::Backspace => write!(f, "Backspace"),
            Key::Tab => write!(f, "Tab"),
            Key::ArrowUp => write!(f, "Up"),
            Key::ArrowDown => write!(f, "Down"),
            Key::ArrowLeft => write!(f, "Left"),
            Key::ArrowRight => write!(f, "Right"),
            Key::PageUp => write!(f, "PageUp"),
            Key::PageDown => write!(f, "PageDown"),
            Key::Home => write!(f, "Home"),
            Key::End => write!(f, "End"),
            Key::Insert => write!(f, "Insert"),
            Key::Delete => write!(f, "Delete"),
            Key::F(n) => write!(f, "F{}", n),
        }
    }
}

/// One decoded keystroke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Literal character, when the key produces one
    pub rune: Option<char>,
    pub key: Key,
}

impl KeyEvent {
    pub const fn named(key: Key) -> Self {
        Self { rune: None, key }
    }

    pub const fn char(c: char) -> Self {
        Self {
            rune: Some(c),
            key: Key::Unknown,
        }
    }

    /// Matches a literal character, ignoring ASCII case
    pub fn is_char(&self, c: char) -> bool {
        self.rune.map_or(false, |r| r.eq_ignore_ascii_case(&c))
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rune {
            Some(c) => write!(f, "{}", c),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Reads and decodes keystrokes from a transport
#[derive(Debug, Default)]
pub struct InputDecoder {
    buf: [u8; READ_CHUNK],
}

impl InputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a key arrives
    #[allow(dead_code)]
    pub fn read_key(&mut self, transport: &mut dyn Transport) -> Result<KeyEvent> {
        loop {
            let n = transport.read(&mut self.buf)?;
            if n > 0 {
                return Ok(decode(&self.buf[..n]));
            }
        }
    }

    /// Wait at most `timeout` for a key
    pub fn read_key_timeout(
        &mut self,
        transport: &mut dyn Transport,
        timeout: Duration,
    ) -> Result<Option<KeyEvent>> {
        match transport.read_timeout(&mut self.buf, timeout)? {
            Some(n) if n > 0 => Ok(Some(decode(&self.buf[..n]))),
            _ => Ok(None),
        }
    }
}

/// Decode the bytes of one read
pub fn decode(bytes: &[u8]) -> KeyEvent {
    let Some(&first) = bytes.first() else {
        return KeyEvent::named(Key::Unknown);
    };

    if first == 0x1b {
        if bytes.len() == 1 {
            return KeyEvent::named(Key::Escape);
        }
        if let Some(key) = escape_sequence(&bytes[1..]) {
            return KeyEvent::named(key);
        }
        // Alt+key style: ESC then a plain byte
        if bytes[1] != b'[' {
            return KeyEvent::char(char::from(bytes[1]));
        }
        return KeyEvent::named(Key::Unknown);
    }

    match first {
        b'\r' | b'\n' => KeyEvent::named(Key::Enter),
        b' ' => KeyEvent::named(Key::Space),
        0x08 | 0x7f => KeyEvent::named(Key::Backspace),
        b'\t' => KeyEvent::named(Key::Tab),
        32..=126 => KeyEvent::char(char::from(first)),
        _ => KeyEvent::named(Key::Unknown),
    }
}

/// Table lookup for the bytes following ESC
fn escape_sequence(seq: &[u8]) -> Option<Key> {
    let key = match seq {
        b"[A" | b"[1A" | b"OA" => Key::ArrowUp,
        b"[B" | b"[1B" | b"OB" => Key::ArrowDown,
        b"[C" | b"[1C" | b"OC" => Key::ArrowRight,
        b"[D" | b"[1D" | b"OD" => Key::ArrowLeft,
        b"[5~" => Key::PageUp,
        b"[6~" => Key::PageDown,
        b"[1~" | b"[H" | b"OH" => Key::Home,
        b"[4~" | b"[F" | b"OF" => Key::End,
        b"[2~" => Key::Insert,
        b"[3~" => Key::Delete,
        _ => return function_key(seq).map(Key::F),
    };
    Some(key)
}

/// `[11~`..`[22~` map onto F1..F12 in order
fn function_key(seq: &[u8]) -> Option<u8> {
    let digits = seq.strip_prefix(b"[")?.strip_suffix(b"~")?;
    if digits.len() != 2 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = (digits[0] - b'0') * 10 + (digits[1] - b'0');
    (11..=22).contains(&code).then(|| code - 10)
}
