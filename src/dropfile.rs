//! Door32.sys dropfile parsing
//!
//! The host writes `door32.sys` once before launching the door. It is a plain
//! text file with eleven positional lines:
//!
//! ```text
//! 2              comm type (0 = local, 1 = serial, 2 = socket)
//! 1234           comm or socket handle
//! 38400          baud rate (ignored)
//! Mystic 1.12    BBS software identifier
//! 1              user record position (ignored)
//! Jane Doe       real name
//! jdoe           alias
//! 20             security level
//! 45             minutes remaining
//! 1              emulation (0 = ascii, 1 = ansi, ...)
//! 3              node number
//! ```
//!
//! Some launchers append `SocketHost=` / `SocketPort=` lines past line 11,
//! which give an address to dial when the inherited handle cannot be adopted.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Number of positional lines every dropfile must carry
pub const REQUIRED_LINES: usize = 11;

/// Conventional dropfile name
pub const DROPFILE_NAME: &str = "door32.sys";

/// Host used for the fallback address when the dropfile names none
pub const DEFAULT_SOCKET_HOST: &str = "127.0.0.1";

/// How the host connected the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommType {
    Local,
    Serial,
    Socket,
    /// Value outside the documented range, kept for logging
    Other(u32),
}

impl From<u32> for CommType {
    fn from(value: u32) -> Self {
        match value {
            0 => CommType::Local,
            1 => CommType::Serial,
            2 => CommType::Socket,
            n => CommType::Other(n),
        }
    }
}

/// Numeric fields of the dropfile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    CommType,
    Handle,
    SecurityLevel,
    MinutesRemaining,
    Emulation,
    Node,
    SocketPort,
}

impl Field {
    /// 0-based line index of a positional field
    pub fn line(self) -> Option<usize> {
        match self {
            Field::CommType => Some(0),
            Field::Handle => Some(1),
            Field::SecurityLevel => Some(7),
            Field::MinutesRemaining => Some(8),
            Field::Emulation => Some(9),
            Field::Node => Some(10),
            Field::SocketPort => None,
        }
    }

    /// The connection cannot be set up from a defaulted value
    pub fn is_essential(self) -> bool {
        matches!(self, Field::CommType | Field::Handle)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::CommType => "comm type",
            Field::Handle => "comm handle",
            Field::SecurityLevel => "security level",
            Field::MinutesRemaining => "minutes remaining",
            Field::Emulation => "emulation",
            Field::Node => "node number",
            Field::SocketPort => "SocketPort",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("dropfile is empty")]
    Empty,

    #[error("dropfile too short: {lines} lines, need 11")]
    ShortFile { lines: usize },

    #[error("dropfile line {} ({field}) is not a number: {value:?}", .line + 1)]
    BadInteger {
        line: usize,
        field: Field,
        value: String,
    },

    #[error("failed to read dropfile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A field that could not be parsed and was replaced by a default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefect {
    pub field: Field,
    /// 0-based line index, `None` for the optional trailing lines
    pub line: Option<usize>,
    pub value: String,
}

impl FieldDefect {
    /// Strict-mode error for this defect
    pub fn into_error(self) -> ParseError {
        ParseError::BadInteger {
            line: self.line.unwrap_or(REQUIRED_LINES),
            field: self.field,
            value: self.value,
        }
    }
}

/// Address to dial when the inherited handle cannot be adopted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Everything the host told us about the connection and the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub comm_type: CommType,
    pub handle: i64,
    pub bbs_name: String,
    pub first_name: String,
    pub last_name: String,
    pub alias: String,
    pub security_level: u32,
    pub minutes_remaining: u32,
    pub emulation: u32,
    pub node: u32,
    pub socket_address: Option<SocketAddress>,
}

impl ConnectionDescriptor {
    /// Descriptor used when the door runs on the sysop's own console
    pub fn local() -> Self {
        Self {
            comm_type: CommType::Local,
            handle: 0,
            bbs_name: "Local".to_string(),
            first_name: "SysOp".to_string(),
            last_name: String::new(),
            alias: "SysOp".to_string(),
            security_level: 255,
            minutes_remaining: 120,
            emulation: 1,
            node: 1,
            socket_address: None,
        }
    }

    /// Whether the terminal announced ANSI emulation
    pub fn is_ansi(&self) -> bool {
        self.emulation == 1
    }
}

/// Options that depend on the host platform
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Platform can adopt an inherited socket handle
    pub socket_capable: bool,
    /// Host used when the dropfile has no `SocketHost=` line
    pub default_host: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            socket_capable: cfg!(windows),
            default_host: DEFAULT_SOCKET_HOST.to_string(),
        }
    }
}

/// Parse a dropfile strictly: any field defect is an error
#[allow(dead_code)]
pub fn parse(raw: &str) -> Result<ConnectionDescriptor, ParseError> {
    parse_with(raw, &ParseOptions::default())
}

/// Strict parse with explicit platform options
#[allow(dead_code)]
pub fn parse_with(raw: &str, options: &ParseOptions) -> Result<ConnectionDescriptor, ParseError> {
    let (descriptor, defects) = parse_lenient(raw, options)?;
    match defects.into_iter().next() {
        Some(defect) => Err(defect.into_error()),
        None => Ok(descriptor),
    }
}

/// Parse a dropfile, replacing malformed numeric fields with defaults.
///
/// Structural problems (empty or short file) are still errors. Every field
/// that had to be defaulted is returned so the caller can decide whether it
/// matters.
pub fn parse_lenient(
    raw: &str,
    options: &ParseOptions,
) -> Result<(ConnectionDescriptor, Vec<FieldDefect>), ParseError> {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if lines.len() < REQUIRED_LINES {
        return Err(ParseError::ShortFile { lines: lines.len() });
    }

    let mut defects = Vec::new();
    let mut number = |field: Field, default: i64| -> i64 {
        let line = field.line().unwrap_or_default();
        let text = lines[line];
        match text.parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                defects.push(FieldDefect {
                    field,
                    line: Some(line),
                    value: text.to_string(),
                });
                default
            }
        }
    };

    let comm_type = CommType::from(clamp_u32(number(Field::CommType, 0)));
    let handle = number(Field::Handle, 0);
    let security_level = clamp_u32(number(Field::SecurityLevel, 0));
    let minutes_remaining = clamp_u32(number(Field::MinutesRemaining, 0));
    let emulation = clamp_u32(number(Field::Emulation, 1));
    let node = clamp_u32(number(Field::Node, 1));

    let (first_name, last_name) = split_name(lines[5]);

    let socket_address = if comm_type == CommType::Socket && options.socket_capable {
        Some(socket_address(&lines[REQUIRED_LINES..], handle, options, &mut defects))
    } else {
        None
    };

    let descriptor = ConnectionDescriptor {
        comm_type,
        handle,
        bbs_name: lines[3].to_string(),
        first_name,
        last_name,
        alias: lines[6].to_string(),
        security_level,
        minutes_remaining,
        emulation,
        node,
        socket_address,
    };

    Ok((descriptor, defects))
}

/// Accept defaulted display fields, fail on a garbled comm type or handle.
///
/// Returns the defects that were tolerated.
pub fn tolerate(mut defects: Vec<FieldDefect>) -> Result<Vec<FieldDefect>, ParseError> {
    match defects.iter().position(|d| d.field.is_essential()) {
        Some(pos) => Err(defects.swap_remove(pos).into_error()),
        None => Ok(defects),
    }
}

/// Read and leniently parse a dropfile.
///
/// `path` may name the file itself or the directory that holds it.
pub fn load(
    path: &Path,
    options: &ParseOptions,
) -> Result<(ConnectionDescriptor, Vec<FieldDefect>), ParseError> {
    let file = resolve(path);
    let raw = fs::read(&file).map_err(|source| ParseError::Io {
        path: file.clone(),
        source,
    })?;
    // Names may carry CP437 high bytes; keep what decodes and move on
    let text = String::from_utf8_lossy(&raw);
    parse_lenient(&text, options)
}

/// Locate `door32.sys` inside a directory, ignoring case
fn resolve(path: &Path) -> PathBuf {
    if !path.is_dir() {
        return path.to_path_buf();
    }
    if let Ok(entries) = fs::read_dir(path) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().eq_ignore_ascii_case(DROPFILE_NAME) {
                return entry.path();
            }
        }
    }
    path.join(DROPFILE_NAME)
}

/// Split a real name into first name and the rest
fn split_name(real_name: &str) -> (String, String) {
    let mut parts = real_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

fn socket_address(
    extra: &[&str],
    handle: i64,
    options: &ParseOptions,
    defects: &mut Vec<FieldDefect>,
) -> SocketAddress {
    let fallback_port = u16::try_from(handle).unwrap_or(0);
    let mut address = SocketAddress {
        host: options.default_host.clone(),
        port: fallback_port,
    };

    for line in extra {
        if let Some(host) = line.strip_prefix("SocketHost=") {
            let host = host.trim();
            if !host.is_empty() {
                address.host = host.to_string();
            }
        } else if let Some(port) = line.strip_prefix("SocketPort=") {
            match port.trim().parse::<u16>() {
                Ok(port) if port != 0 => address.port = port,
                _ => defects.push(FieldDefect {
                    field: Field::SocketPort,
                    line: None,
                    value: port.to_string(),
                }),
            }
        }
    }

    address
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
