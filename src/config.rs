//! Configuration for advent-door.
//!
//! Settings come from a TOML file, looked up in order:
//! - the path given with `--config`
//! - `advent.toml` in the working directory
//! - `~/.advent/config.toml`
//!
//! Every section is optional and falls back to its defaults.
//!
//! ```toml
//! art_dir = "art"
//! text_mode = "cp437"
//!
//! [session]
//! idle_timeout_secs = 300
//! max_session_minutes = 120
//!
//! [display]
//! wrap_guard = true
//! footer = "FOOTER.ANS"
//!
//! [transport]
//! socket_host = "127.0.0.1"
//! write_retry_limit = 1000
//!
//! [probe]
//! timeout_ms = 1000
//!
//! [calendar]
//! december_only = true
//! date = "2024-12-07"
//!
//! [logging]
//! level = "info"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

use crate::calendar;
use crate::core::retry::RetryPolicy;
use crate::core::term::ProbeOptions;
use crate::core::transport::TransportOptions;
use crate::dropfile::ParseOptions;
use crate::ui::{RenderOptions, TextMode};

/// File name looked up in the working directory
const LOCAL_CONFIG: &str = "advent.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `.ans` screens
    pub art_dir: PathBuf,
    /// Encoding used when writing art
    pub text_mode: TextMode,
    pub session: SessionConfig,
    pub display: DisplayConfig,
    pub transport: TransportConfig,
    pub probe: ProbeConfig,
    pub calendar: CalendarConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            art_dir: PathBuf::from("art"),
            text_mode: TextMode::Cp437,
            session: SessionConfig::default(),
            display: DisplayConfig::default(),
            transport: TransportConfig::default(),
            probe: ProbeConfig::default(),
            calendar: CalendarConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    /// Upper bound; the dropfile's minutes remaining may lower it
    pub max_session_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            max_session_minutes: 120,
        }
    }
}

/// Screen settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub wrap_guard: bool,
    pub scrolling: bool,
    pub footer: String,
    pub missing: String,
    pub welcome: String,
    pub goodbye: String,
    /// Shown past the last unlocked day of a calendar
    pub comeback: String,
    /// Shown when the calendar is closed
    pub not_yet: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            wrap_guard: true,
            scrolling: true,
            footer: "FOOTER.ANS".to_string(),
            missing: "MISSING.ANS".to_string(),
            welcome: "WELCOME.ANS".to_string(),
            goodbye: "GOODBYE.ANS".to_string(),
            comeback: "COMEBACK.ANS".to_string(),
            not_yet: "NOTYET.ANS".to_string(),
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Override the platform's socket adoption capability
    pub adopt_socket: Option<bool>,
    pub socket_host: String,
    pub connect_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub flush_delay_ms: u64,
    pub write_retry_limit: u32,
    pub wake_probe: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            adopt_socket: None,
            socket_host: crate::dropfile::DEFAULT_SOCKET_HOST.to_string(),
            connect_timeout_ms: 10_000,
            settle_delay_ms: 200,
            retry_delay_ms: 10,
            flush_delay_ms: 20,
            write_retry_limit: 1000,
            wake_probe: true,
        }
    }
}

/// Terminal size probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    pub hide_echo: bool,
    /// Probe even when standard input is a pipe
    pub probe_pipes: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 1000,
            hide_echo: true,
            probe_pipes: false,
        }
    }
}

/// Advent calendar settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Close the calendar outside December
    pub december_only: bool,
    /// Pretend today is this `YYYY-MM-DD` date
    pub date: Option<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            december_only: true,
            date: None,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log file; defaults to `~/.advent/advent.log`
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// A loaded configuration and where it came from
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    pub source: Option<PathBuf>,
    /// Problems that were skipped over, for logging once logging is up
    pub warnings: Vec<String>,
}

impl Config {
    /// Find, read, and validate the configuration.
    ///
    /// Missing or unreadable files fall back to defaults. A file that
    /// exists but does not parse, or holds invalid values, is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Loaded, ConfigError> {
        let mut warnings = Vec::new();

        for path in Self::candidates(explicit) {
            if !path.exists() {
                if explicit == Some(path.as_path()) {
                    warnings.push(format!("config file {} not found, using defaults", path.display()));
                }
                continue;
            }
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warnings.push(ConfigError::Read { path: path.clone(), source: e }.to_string());
                    continue;
                }
            };
            let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
            config.validate()?;
            return Ok(Loaded {
                config,
                source: Some(path),
                warnings,
            });
        }

        Ok(Loaded {
            config: Self::default(),
            source: None,
            warnings,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = explicit {
            paths.push(path.to_path_buf());
        }
        paths.push(PathBuf::from(LOCAL_CONFIG));
        if let Some(dir) = config_dir() {
            paths.push(dir.join("config.toml"));
        }
        paths
    }

    /// Reject settings that would stall or spin
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero: [(&'static str, u64); 6] = [
            ("session.idle_timeout_secs", self.session.idle_timeout_secs),
            ("session.max_session_minutes", self.session.max_session_minutes),
            ("transport.connect_timeout_ms", self.transport.connect_timeout_ms),
            ("transport.retry_delay_ms", self.transport.retry_delay_ms),
            ("transport.write_retry_limit", u64::from(self.transport.write_retry_limit)),
            ("probe.timeout_ms", self.probe.timeout_ms),
        ];
        for (key, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.transport.socket_host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "transport.socket_host",
                reason: "must not be empty".to_string(),
            });
        }
        self.today()?;
        Ok(())
    }

    /// Whether inherited socket handles can be adopted here
    pub fn socket_capable(&self) -> bool {
        self.transport.adopt_socket.unwrap_or(cfg!(windows))
    }

    pub fn transport_options(&self) -> TransportOptions {
        let t = &self.transport;
        TransportOptions {
            socket_capable: self.socket_capable(),
            retry: RetryPolicy {
                delay: Duration::from_millis(t.retry_delay_ms),
                write_limit: Some(t.write_retry_limit),
            },
            connect_timeout: Duration::from_millis(t.connect_timeout_ms),
            settle_delay: Duration::from_millis(t.settle_delay_ms),
            flush_delay: Duration::from_millis(t.flush_delay_ms),
            wake_probe: t.wake_probe,
            probe_pipes: self.probe.probe_pipes,
        }
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            timeout: Duration::from_millis(self.probe.timeout_ms),
            hide_echo: self.probe.hide_echo,
        }
    }

    pub fn render_options(&self, mode: TextMode) -> RenderOptions {
        RenderOptions {
            wrap_guard: self.display.wrap_guard,
            scrolling: self.display.scrolling,
            mode,
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            socket_capable: self.socket_capable(),
            default_host: self.transport.socket_host.clone(),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session.idle_timeout_secs)
    }

    /// Session length: the configured cap or the user's remaining time,
    /// whichever is shorter. A dropfile value of zero means "not given".
    pub fn max_session(&self, minutes_remaining: u32) -> Duration {
        let cap = self.session.max_session_minutes;
        let minutes = match u64::from(minutes_remaining) {
            0 => cap,
            remaining => remaining.min(cap),
        };
        Duration::from_secs(minutes * 60)
    }

    /// Calendar date: the configured override, or the local date
    pub fn today(&self) -> Result<Date, ConfigError> {
        match &self.calendar.date {
            Some(text) => calendar::parse_date(text).ok_or_else(|| ConfigError::Invalid {
                key: "calendar.date",
                reason: format!("{:?} is not a YYYY-MM-DD date", text),
            }),
            None => Ok(calendar::today()),
        }
    }

    /// Log file path, defaulting into the config directory
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging
            .file
            .clone()
            .or_else(|| config_dir().map(|dir| dir.join("advent.log")))
    }
}

/// `~/.advent`
pub fn config_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".advent"))
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
