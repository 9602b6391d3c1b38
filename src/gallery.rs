//! Art viewer
//!
//! Shows `.ans` screens one at a time. The user moves between them with the
//! arrow keys and scrolls screens that are taller than the terminal. Which
//! screen comes next is up to a [`Navigator`]: the flat [`Pager`] walks a
//! single directory, the advent calendar lives in [`crate::calendar`].

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::DisplayConfig;
use crate::core::session::{Expiry, Session, SessionInput};
use crate::core::term::{Key, KeyEvent};
use crate::core::transport::TransportError;
use crate::ui::{Art, RenderPipeline, TextMode};

/// Shown when neither the art nor the missing-art screen can be read
pub const NO_ART: &str = "Error: Unable to load art. Please contact the Sysop.";
const FAREWELL: &str = "Goodbye!";
const PRESS_A_KEY: &str = "[Press a Key]";

/// The screens of one art directory
#[derive(Debug, Clone)]
pub struct ArtLibrary {
    dir: PathBuf,
    screens: Vec<PathBuf>,
    display: DisplayConfig,
    mode: TextMode,
}

impl ArtLibrary {
    /// Index the art directory. The welcome screen comes first, the other
    /// special screens are left out of the sequence. An unreadable
    /// directory yields an empty library.
    pub fn scan(dir: &Path, display: &DisplayConfig, mode: TextMode) -> Self {
        let special = [&display.footer, &display.missing, &display.welcome, &display.goodbye];
        let mut screens: Vec<PathBuf> = Vec::new();
        match fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if !path.is_file() || !has_ans_extension(&path) {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if special.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
                        continue;
                    }
                    screens.push(path);
                }
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "Cannot read art directory"),
        }
        screens.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));

        let mut library = Self {
            dir: dir.to_path_buf(),
            screens,
            display: display.clone(),
            mode,
        };
        if let Some(welcome) = library.find(&display.welcome) {
            library.screens.insert(0, welcome);
        }
        info!(dir = %dir.display(), screens = library.screens.len(), "Art library indexed");
        library
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn footer(&self) -> Option<Art> {
        self.load_special(&self.display.footer)
    }

    pub fn goodbye(&self) -> Option<Art> {
        self.load_special(&self.display.goodbye)
    }

    /// Load screen `index`. When it cannot be read, the missing-art screen
    /// (or a text placeholder) is returned with the name of what was lost.
    pub fn screen(&self, index: usize) -> (Art, Option<String>) {
        let Some(path) = self.screens.get(index) else {
            return (self.missing_art(), None);
        };
        match Art::load(path, self.mode) {
            Ok(art) if !art.is_empty() => (art, None),
            Ok(_) => {
                warn!(path = %path.display(), "Art file is empty");
                (self.missing_art(), Some(file_name(path)))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load art");
                (self.missing_art(), Some(file_name(path)))
            }
        }
    }

    fn missing_art(&self) -> Art {
        self.load_special(&self.display.missing)
            .unwrap_or_else(|| Art::placeholder(NO_ART, self.mode))
    }

    fn load_special(&self, name: &str) -> Option<Art> {
        load_art(&self.find(name)?, self.mode)
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        find_file(&self.dir, name)
    }
}

/// Case-insensitive lookup of `name` in `dir`
pub fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }
    fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(name))
        .map(|entry| entry.path())
}

/// Load art, logging and skipping a file that cannot be read
pub fn load_art(path: &Path, mode: TextMode) -> Option<Art> {
    match Art::load(path, mode) {
        Ok(art) => Some(art),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load art");
            None
        }
    }
}

fn has_ans_extension(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.to_string_lossy().eq_ignore_ascii_case("ans"))
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Order names so that `2.ans` sorts before `10.ans`
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (is_number(l), is_number(r)) {
                    (true, true) => {
                        let l = l.trim_start_matches('0');
                        let r = r.trim_start_matches('0');
                        l.len().cmp(&r.len()).then_with(|| l.cmp(r))
                    }
                    _ => l.to_ascii_lowercase().cmp(&r.to_ascii_lowercase()),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Split into alternating runs of digits and non-digits
fn chunks(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digit)
            .map_or(rest.len(), |(i, _)| i);
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}

fn is_number(chunk: &str) -> bool {
    chunk.bytes().all(|b| b.is_ascii_digit())
}

/// What a key asks the viewer to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Next,
    Previous,
    First,
    Last,
    ScrollUp,
    ScrollDown,
    /// Digit key 1 to 9
    Select(u8),
    Quit,
    Ignore,
}

pub fn action_for(event: &KeyEvent) -> Action {
    if event.is_char('q') {
        return Action::Quit;
    }
    if let Some(c @ '1'..='9') = event.rune {
        return Action::Select(c as u8 - b'0');
    }
    match event.key {
        Key::ArrowRight | Key::Enter | Key::Space | Key::PageDown => Action::Next,
        Key::ArrowLeft | Key::PageUp => Action::Previous,
        Key::Home => Action::First,
        Key::End => Action::Last,
        Key::ArrowUp => Action::ScrollUp,
        Key::ArrowDown => Action::ScrollDown,
        Key::Escape => Action::Quit,
        _ => Action::Ignore,
    }
}

/// How a viewing session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Quit,
    Expired(Expiry),
    Disconnected,
    /// The viewer was closed; the user saw why and pressed a key
    Closed,
}

/// Result of a navigation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The current screen changed and must be drawn
    Moved,
    Stayed,
    /// Leave the viewer
    Exit,
}

/// Decides which screen is current and where a key leads
pub trait Navigator {
    /// Art for the current screen, with the name of a file that could not
    /// be shown in its place
    fn current(&self) -> (Art, Option<String>);

    /// Apply a paging action; scrolling never reaches the navigator
    fn navigate(&mut self, action: Action) -> Transition;

    fn footer(&self) -> Option<Art>;

    fn goodbye(&self) -> Option<Art>;

    /// Screen shown instead of the viewer while it is not open
    fn closed(&self) -> Option<Art> {
        None
    }
}

/// Walks the screens of one directory in order
pub struct Pager {
    library: ArtLibrary,
    index: usize,
}

impl Pager {
    pub fn new(library: ArtLibrary) -> Self {
        Self { library, index: 0 }
    }
}

impl Navigator for Pager {
    fn current(&self) -> (Art, Option<String>) {
        self.library.screen(self.index)
    }

    fn navigate(&mut self, action: Action) -> Transition {
        let last = self.library.len().saturating_sub(1);
        let target = match action {
            Action::Next => (self.index + 1).min(last),
            Action::Previous => self.index.saturating_sub(1),
            Action::First => 0,
            Action::Last => last,
            Action::Quit => return Transition::Exit,
            _ => return Transition::Stayed,
        };
        if target == self.index {
            return Transition::Stayed;
        }
        self.index = target;
        Transition::Moved
    }

    fn footer(&self) -> Option<Art> {
        self.library.footer()
    }

    fn goodbye(&self) -> Option<Art> {
        self.library.goodbye()
    }
}

/// Drives a navigator's screens through a session
pub struct Gallery<'a> {
    navigator: &'a mut dyn Navigator,
    pipeline: &'a mut RenderPipeline,
}

impl<'a> Gallery<'a> {
    pub fn new(navigator: &'a mut dyn Navigator, pipeline: &'a mut RenderPipeline) -> Self {
        Self { navigator, pipeline }
    }

    /// Show screens until the user quits, leaves, or runs out of time
    pub fn run(&mut self, session: &mut Session) -> Result<Outcome> {
        match self.run_inner(session) {
            Err(TransportError::ConnectionClosed) => {
                info!("User disconnected");
                Ok(Outcome::Disconnected)
            }
            other => other.context("art session failed"),
        }
    }

    fn run_inner(&mut self, session: &mut Session) -> std::result::Result<Outcome, TransportError> {
        if let Some(art) = self.navigator.closed() {
            return self.closed(session, &art);
        }

        self.show(session)?;
        loop {
            let key = match session.next_input()? {
                SessionInput::Key(key) => key,
                SessionInput::Expired(expiry) => {
                    session.announce_expiry(expiry)?;
                    return Ok(Outcome::Expired(expiry));
                }
            };

            let action = action_for(&key);
            debug!(%key, ?action, "Navigation");
            match action {
                Action::ScrollUp => {
                    self.pipeline.scroll_up(session.transport())?;
                }
                Action::ScrollDown => {
                    self.pipeline.scroll_down(session.transport())?;
                }
                action => match self.navigator.navigate(action) {
                    Transition::Moved => self.show(session)?,
                    Transition::Stayed => {}
                    Transition::Exit => {
                        self.farewell(session)?;
                        return Ok(Outcome::Quit);
                    }
                },
            }
        }
    }

    /// Show the closed screen and wait for any key
    fn closed(&mut self, session: &mut Session, art: &Art) -> std::result::Result<Outcome, TransportError> {
        info!("Viewer closed, showing notice");
        self.pipeline.load(art);
        self.pipeline.render_full(session.transport())?;
        self.pipeline.render_prompt(session.transport(), PRESS_A_KEY)?;
        match session.next_input()? {
            SessionInput::Key(_) => Ok(Outcome::Closed),
            SessionInput::Expired(expiry) => {
                session.announce_expiry(expiry)?;
                Ok(Outcome::Expired(expiry))
            }
        }
    }

    fn show(&mut self, session: &mut Session) -> std::result::Result<(), TransportError> {
        let (art, missing) = self.navigator.current();
        info!(lines = art.len(), "Showing screen");
        self.pipeline.load(&art);
        self.pipeline.render_full(session.transport())?;
        if let Some(name) = missing {
            self.pipeline.render_status(session.transport(), &name)?;
        }
        Ok(())
    }

    fn farewell(&mut self, session: &mut Session) -> std::result::Result<(), TransportError> {
        match self.navigator.goodbye() {
            Some(art) => {
                self.pipeline.load(&art);
                self.pipeline.render_full(session.transport())
            }
            None => {
                let text = format!("\r\n{}\r\n", FAREWELL);
                session.transport().write_all(text.as_bytes())?;
                session.transport().flush()
            }
        }
    }
}
