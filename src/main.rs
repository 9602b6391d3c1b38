//! advent - a BBS door that shows sequential ANSI art screens
//!
//! The host BBS starts the door with the path to a Door32 dropfile. The door
//! picks up the caller's connection from it (an inherited socket on Windows,
//! the standard streams elsewhere), measures the remote terminal, and pages
//! through the art directory one screen at a time. An art directory with
//! year folders is run as an advent calendar that unlocks a day at a time.
//!
//! # Quick Start
//!
//! ```text
//! advent -p /bbs/node1              # Run for the caller on node 1
//! advent -p /bbs/node1/door32.sys   # Same, naming the dropfile itself
//! advent -l                         # Try it on the local console
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Right / Enter / Space / PgDn | Next screen |
//! | Left / PgUp | Previous screen |
//! | Home / End | First / last screen |
//! | Up / Down | Scroll a tall screen |
//! | 1 - 9 | Pick a calendar year on the welcome screen |
//! | q / Esc | Quit (back to the welcome screen in a calendar) |

mod calendar;
mod config;
mod core;
mod dropfile;
mod gallery;
mod ui;

use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::calendar::Calendar;
use crate::config::Config;
use crate::core::console;
use crate::core::session::{Session, SessionClock};
use crate::core::term::{RawModeGuard, TerminalGeometry, TerminalSizeProber};
use crate::core::transport::{self, Transport};
use crate::dropfile::ConnectionDescriptor;
use crate::gallery::{ArtLibrary, Gallery, Navigator, Outcome, Pager};
use crate::ui::{RenderPipeline, TextMode};

/// Exit status for command line mistakes
const USAGE_ERROR: i32 = 2;

/// Command line options
#[derive(Debug, Default, PartialEq)]
struct Args {
    /// Dropfile, or the directory holding `door32.sys`
    path: Option<PathBuf>,
    /// Run on the local console without a dropfile
    local: bool,
    config: Option<PathBuf>,
    art_dir: Option<PathBuf>,
    socket_host: Option<String>,
    /// Calendar date override, `YYYY-MM-DD`
    date: Option<String>,
    debug: bool,
}

/// What the command line asked for
#[derive(Debug, PartialEq)]
enum Command {
    Run(Args),
    Help,
    Version,
}

fn print_version() {
    println!("advent {}", env!("CARGO_PKG_VERSION"));
}

fn print_help() {
    eprintln!(
        r#"advent {} - sequential ANSI art door

USAGE:
    advent -p <PATH> [OPTIONS]
    advent -l [OPTIONS]

OPTIONS:
    -p, --path <PATH>        Door32 dropfile, or the directory holding door32.sys
    -l, --local              Run on the local console without a dropfile
    -c, --config <FILE>      Configuration file
                             (default: ./advent.toml, then ~/.advent/config.toml)
    -a, --art <DIR>          Art directory (overrides the config file)
        --socket-host <IP>   Address to dial when the socket cannot be adopted
        --date <YYYY-MM-DD>  Run the calendar as if today were this date
    -d, --debug              Log at debug level
    -h, --help               Show this help
    -v, --version            Show version

KEYS:
    Right, Enter, Space, PgDn   Next screen
    Left, PgUp                  Previous screen
    Home, End                   First, last screen
    Up, Down                    Scroll a tall screen
    1-9                         Pick a calendar year on the welcome screen
    q, Esc                      Quit

LOGGING:
    Logs go to ~/.advent/advent.log unless [logging] file is set.
    ADVENT_LOG overrides the level, e.g. ADVENT_LOG=debug"#,
        env!("CARGO_PKG_VERSION")
    );
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut parsed = Args::default();
    let mut i = 1;

    let value = |i: usize, flag: &str| -> Result<String, String> {
        args.get(i)
            .cloned()
            .ok_or_else(|| format!("Missing argument for {}", flag))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-p" | "--path" => {
                i += 1;
                parsed.path = Some(PathBuf::from(value(i, "--path")?));
            }
            "-l" | "--local" => {
                parsed.local = true;
            }
            "-c" | "--config" => {
                i += 1;
                parsed.config = Some(PathBuf::from(value(i, "--config")?));
            }
            "-a" | "--art" => {
                i += 1;
                parsed.art_dir = Some(PathBuf::from(value(i, "--art")?));
            }
            "--socket-host" => {
                i += 1;
                parsed.socket_host = Some(value(i, "--socket-host")?);
            }
            "--date" => {
                i += 1;
                let date = value(i, "--date")?;
                if calendar::parse_date(&date).is_none() {
                    return Err(format!("Invalid date: {}. Expected YYYY-MM-DD.", date));
                }
                parsed.date = Some(date);
            }
            "-d" | "--debug" => {
                parsed.debug = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    if parsed.path.is_none() && !parsed.local {
        return Err("Missing dropfile path (-p) or local mode (-l)".to_string());
    }
    Ok(Command::Run(parsed))
}

/// Send logs to a file; the user's stream carries only the door
fn init_logging(config: &Config, debug: bool) {
    let Some(log_path) = config.log_file() else {
        return;
    };
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    else {
        return;
    };

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("ADVENT_LOG").unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Terminal size when the remote cannot be asked
fn fallback_geometry(local: bool) -> TerminalGeometry {
    if local {
        if let Ok((cols, rows)) = crossterm::terminal::size() {
            if cols > 0 && rows > 0 {
                return TerminalGeometry::new(cols, rows);
            }
        }
    }
    TerminalGeometry::default()
}

fn measure(config: &Config, transport: &mut dyn Transport, local: bool) -> TerminalGeometry {
    if !config.probe.enabled {
        return fallback_geometry(local);
    }
    let prober = TerminalSizeProber::new(config.probe_options());
    if !local {
        return prober.probe_or_default(transport);
    }
    match prober.probe(transport) {
        Ok(geometry) => geometry,
        Err(e) => {
            info!(error = %e, "Terminal size probe failed, using console size");
            fallback_geometry(local)
        }
    }
}

fn run(args: Args) -> anyhow::Result<Outcome> {
    let loaded = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let mut config = loaded.config;
    if let Some(dir) = args.art_dir {
        config.art_dir = dir;
    }
    if let Some(host) = args.socket_host {
        config.transport.socket_host = host;
    }
    if let Some(date) = args.date {
        config.calendar.date = Some(date);
    }

    init_logging(&config, args.debug);
    info!(version = env!("CARGO_PKG_VERSION"), "advent starting");
    match &loaded.source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Using default configuration"),
    }
    for warning in &loaded.warnings {
        warn!("{}", warning);
    }

    let console_mode = console::prepare();

    let (descriptor, mode) = match (&args.path, args.local) {
        (_, true) => (ConnectionDescriptor::local(), TextMode::Utf8),
        (Some(path), false) => {
            let (descriptor, defects) = dropfile::load(path, &config.parse_options())?;
            for defect in &dropfile::tolerate(defects)? {
                warn!(field = %defect.field, value = %defect.value, "Dropfile field defaulted");
            }
            (descriptor, config.text_mode)
        }
        (None, false) => anyhow::bail!("no dropfile given"),
    };
    info!(
        alias = %descriptor.alias,
        bbs = %descriptor.bbs_name,
        node = descriptor.node,
        minutes = descriptor.minutes_remaining,
        ?console_mode,
        "Caller identified"
    );
    if !descriptor.is_ansi() {
        warn!(emulation = descriptor.emulation, "Terminal did not announce ANSI, continuing anyway");
    }

    let today = config.today()?;
    let mut navigator: Box<dyn Navigator> = match Calendar::open(
        &config.art_dir,
        &config.display,
        mode,
        today,
        config.calendar.december_only,
    ) {
        Some(calendar) => Box::new(calendar),
        None => Box::new(Pager::new(ArtLibrary::scan(&config.art_dir, &config.display, mode))),
    };

    let mut transport = transport::open(&descriptor, &config.transport_options())
        .context("Failed to open the connection")?;

    let raw_mode = if args.local && std::io::stdin().is_terminal() {
        match RawModeGuard::enter() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "Failed to enter raw mode");
                RawModeGuard::inactive()
            }
        }
    } else {
        RawModeGuard::inactive()
    };

    let geometry = measure(&config, transport.as_mut(), args.local);
    info!(cols = geometry.cols, rows = geometry.rows, "Terminal size");

    let clock = SessionClock::new(
        config.idle_timeout(),
        config.max_session(descriptor.minutes_remaining),
    );
    let mut session = Session::new(transport, raw_mode, clock);
    session.start().context("Failed to start the session")?;

    let mut pipeline = RenderPipeline::new(geometry, config.render_options(mode));
    pipeline.set_footer(navigator.footer().as_ref());

    let outcome = Gallery::new(navigator.as_mut(), &mut pipeline).run(&mut session);
    session.release();
    outcome
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let args = match parse_args(&args) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return;
        }
        Ok(Command::Version) => {
            print_version();
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(USAGE_ERROR);
        }
    };

    match run(args) {
        Ok(outcome) => info!(?outcome, "advent exiting"),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Fatal error");
            eprintln!("advent: {:#}", e);
            std::process::exit(1);
        }
    }
}
