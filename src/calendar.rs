//! Advent calendar layout
//!
//! An art directory laid out as a calendar holds one folder per year plus a
//! `common/` folder:
//!
//! ```text
//! art/
//!   common/       MISSING.ANS, NOTYET.ANS, fallback WELCOME/GOODBYE/COMEBACK
//!   2024/         WELCOME.ANS, 1_DEC24.ANS .. 25_DEC24.ANS
//!   2025/         01_DEC25.ANS .. 25_DEC25.ANS
//! ```
//!
//! Days unlock one per day through December. Past years are fully open,
//! future years show only day 1.

use std::fs;
use std::path::{Path, PathBuf};

use time::{Date, Month, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::config::DisplayConfig;
use crate::gallery::{find_file, load_art, Action, Navigator, Transition, NO_ART};
use crate::ui::{Art, TextMode};

/// Last day of the calendar
pub const LAST_DAY: u8 = 25;

const COMMON_DIR: &str = "common";
const NOT_YET: &str = "The calendar opens on December 1st. Come back then!";

/// Local date, or UTC when the local offset cannot be determined
pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// Parse `YYYY-MM-DD`
pub fn parse_date(text: &str) -> Option<Date> {
    let mut parts = text.trim().splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u8>().ok()?;
    let day = parts.next()?.parse::<u8>().ok()?;
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

/// Whether the calendar is open at all on `date`
pub fn is_open(date: Date) -> bool {
    date.month() == Month::December
}

/// Highest day that can be viewed in `year`
pub fn max_day(year: i32, today: Date) -> u8 {
    match year.cmp(&today.year()) {
        std::cmp::Ordering::Less => LAST_DAY,
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Equal if is_open(today) => today.day().min(LAST_DAY),
        std::cmp::Ordering::Equal => 1,
    }
}

/// Year folders under `root`, oldest first
pub fn available_years(root: &Path) -> Vec<i32> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut years: Vec<i32> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit()) {
                name.parse().ok()
            } else {
                None
            }
        })
        .collect();
    years.sort_unstable();
    years
}

/// File names a day's art may use, in lookup order.
///
/// Older years name days `7_DEC24.ANS`; from 2025 on `07_DEC25.ANS` is
/// preferred.
pub fn day_file_names(year: i32, day: u8) -> [String; 2] {
    let yy = year.rem_euclid(100);
    let plain = format!("{}_DEC{:02}.ANS", day, yy);
    let padded = format!("{:02}_DEC{:02}.ANS", day, yy);
    if year >= 2025 {
        [padded, plain]
    } else {
        [plain, padded]
    }
}

/// Where the calendar is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Welcome,
    Day(u8),
    /// Past the last unlocked day
    Comeback,
}

/// Date-gated navigation over the year folders of an art directory
#[derive(Debug, Clone)]
pub struct Calendar {
    root: PathBuf,
    years: Vec<i32>,
    year: i32,
    /// Day the welcome screen leads to
    day: u8,
    max_day: u8,
    screen: Screen,
    today: Date,
    display: DisplayConfig,
    mode: TextMode,
    december_only: bool,
}

impl Calendar {
    /// Open `root` as a calendar. Returns `None` when it holds no year
    /// folders.
    pub fn open(
        root: &Path,
        display: &DisplayConfig,
        mode: TextMode,
        today: Date,
        december_only: bool,
    ) -> Option<Self> {
        let years = available_years(root);
        let year = if years.contains(&today.year()) {
            today.year()
        } else {
            *years.last()?
        };
        let mut calendar = Self {
            root: root.to_path_buf(),
            years,
            year,
            day: 1,
            max_day: 1,
            screen: Screen::Welcome,
            today,
            display: display.clone(),
            mode,
            december_only,
        };
        calendar.select_year(year);
        info!(
            root = %root.display(),
            years = ?calendar.years,
            year = calendar.year,
            max_day = calendar.max_day,
            "Calendar opened"
        );
        Some(calendar)
    }

    fn select_year(&mut self, year: i32) {
        self.year = year;
        self.max_day = max_day(year, self.today);
        self.day = if year == self.today.year() { self.max_day } else { 1 };
    }

    fn go(&mut self, screen: Screen) -> Transition {
        if screen == self.screen {
            return Transition::Stayed;
        }
        debug!(from = ?self.screen, to = ?screen, year = self.year, "Calendar move");
        self.screen = screen;
        Transition::Moved
    }

    fn year_dir(&self) -> PathBuf {
        self.root.join(self.year.to_string())
    }

    fn common_dir(&self) -> PathBuf {
        self.root.join(COMMON_DIR)
    }

    /// Year folder first, then `common/`
    fn special(&self, name: &str) -> Option<Art> {
        let path = find_file(&self.year_dir(), name).or_else(|| find_file(&self.common_dir(), name))?;
        load_art(&path, self.mode)
    }

    fn missing_art(&self) -> Art {
        find_file(&self.common_dir(), &self.display.missing)
            .and_then(|path| load_art(&path, self.mode))
            .unwrap_or_else(|| Art::placeholder(NO_ART, self.mode))
    }

    fn day_path(&self, day: u8) -> Option<PathBuf> {
        let dir = self.year_dir();
        day_file_names(self.year, day)
            .iter()
            .find_map(|name| find_file(&dir, name))
    }

    fn or_missing(&self, art: Option<Art>, name: String) -> (Art, Option<String>) {
        match art {
            Some(art) if !art.is_empty() => (art, None),
            _ => {
                warn!(year = self.year, file = %name, "Calendar art missing");
                (self.missing_art(), Some(name))
            }
        }
    }
}

impl Navigator for Calendar {
    fn current(&self) -> (Art, Option<String>) {
        match self.screen {
            Screen::Welcome => self.or_missing(self.special(&self.display.welcome), self.display.welcome.clone()),
            Screen::Comeback => self.or_missing(self.special(&self.display.comeback), self.display.comeback.clone()),
            Screen::Day(day) => {
                let [first, _] = day_file_names(self.year, day);
                let art = self.day_path(day).and_then(|path| load_art(&path, self.mode));
                self.or_missing(art, first)
            }
        }
    }

    fn navigate(&mut self, action: Action) -> Transition {
        match (self.screen, action) {
            (Screen::Welcome, Action::Quit) => Transition::Exit,
            (_, Action::Quit) => self.go(Screen::Welcome),
            (Screen::Welcome, Action::Next) => self.go(Screen::Day(self.day)),
            (Screen::Welcome, Action::Select(n)) => {
                let Some(&year) = usize::from(n).checked_sub(1).and_then(|i| self.years.get(i)) else {
                    return Transition::Stayed;
                };
                self.select_year(year);
                self.day = 1;
                info!(year, max_day = self.max_day, "Year selected");
                self.screen = Screen::Day(1);
                Transition::Moved
            }
            (Screen::Day(day), Action::Next) if day < self.max_day => self.go(Screen::Day(day + 1)),
            (Screen::Day(_), Action::Next) if self.max_day < LAST_DAY => self.go(Screen::Comeback),
            (Screen::Day(1), Action::Previous) => self.go(Screen::Welcome),
            (Screen::Day(day), Action::Previous) => self.go(Screen::Day(day - 1)),
            (Screen::Day(_), Action::First) => self.go(Screen::Day(1)),
            (Screen::Day(_), Action::Last) => self.go(Screen::Day(self.max_day)),
            (Screen::Comeback, Action::Previous) => self.go(Screen::Day(self.max_day)),
            _ => Transition::Stayed,
        }
    }

    fn footer(&self) -> Option<Art> {
        self.special(&self.display.footer)
    }

    fn goodbye(&self) -> Option<Art> {
        self.special(&self.display.goodbye)
    }

    fn closed(&self) -> Option<Art> {
        if !self.december_only || is_open(self.today) {
            return None;
        }
        let art = find_file(&self.common_dir(), &self.display.not_yet)
            .and_then(|path| load_art(&path, self.mode))
            .unwrap_or_else(|| Art::placeholder(NOT_YET, self.mode));
        Some(art)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    /// Scratch calendar tree removed on drop
    struct Tree(PathBuf);

    impl Tree {
        fn new(name: &str, files: &[(&str, &[u8])]) -> Self {
            let dir = std::env::temp_dir().join(format!("advent-calendar-{}-{}", name, std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            for (file, body) in files {
                let path = dir.join(file);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, body).unwrap();
            }
            Self(dir)
        }

        fn open(&self, today: Date) -> Calendar {
            Calendar::open(&self.0, &DisplayConfig::default(), TextMode::Cp437, today, true).unwrap()
        }
    }

    impl Drop for Tree {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn text(art: &Art) -> String {
        String::from_utf8_lossy(&art.lines.concat()).into_owned()
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-12-07"), Some(date!(2024 - 12 - 07)));
        assert_eq!(parse_date(" 2025-01-31 "), Some(date!(2025 - 01 - 31)));
        assert_eq!(parse_date("2024-13-01"), None);
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("12/07/2024"), None);
    }

    #[test]
    fn test_max_day_by_year() {
        let today = date!(2024 - 12 - 07);
        assert_eq!(max_day(2023, today), 25);
        assert_eq!(max_day(2024, today), 7);
        assert_eq!(max_day(2025, today), 1);
        assert_eq!(max_day(2024, date!(2024 - 12 - 31)), 25);
        assert_eq!(max_day(2024, date!(2024 - 11 - 20)), 1);
        assert!(!is_open(date!(2024 - 11 - 30)));
        assert!(is_open(date!(2024 - 12 - 01)));
    }

    #[test]
    fn test_day_file_names() {
        assert_eq!(day_file_names(2024, 7), ["7_DEC24.ANS".to_string(), "07_DEC24.ANS".to_string()]);
        assert_eq!(day_file_names(2025, 7), ["07_DEC25.ANS".to_string(), "7_DEC25.ANS".to_string()]);
        assert_eq!(day_file_names(2025, 12), ["12_DEC25.ANS".to_string(), "12_DEC25.ANS".to_string()]);
    }

    #[test]
    fn test_years_and_initial_position() {
        let tree = Tree::new("years", &[
            ("2023/1_DEC23.ANS", b"a"),
            ("2024/1_DEC24.ANS", b"b"),
            ("common/MISSING.ANS", b"gone"),
            ("notes/readme.txt", b"x"),
            ("123/skip.ans", b"x"),
        ]);
        assert_eq!(available_years(&tree.0), vec![2023, 2024]);

        let cal = tree.open(date!(2024 - 12 - 09));
        assert_eq!(cal.year, 2024);
        assert_eq!(cal.max_day, 9);
        assert_eq!(cal.screen, Screen::Welcome);

        // Current year has no folder: newest year, from day 1
        let cal = tree.open(date!(2026 - 12 - 09));
        assert_eq!(cal.year, 2024);
        assert_eq!(cal.max_day, 25);
        assert_eq!(cal.day, 1);

        let flat = Tree::new("flat", &[("1.ans", b"a")]);
        assert!(Calendar::open(&flat.0, &DisplayConfig::default(), TextMode::Cp437, date!(2024 - 12 - 01), true).is_none());
    }

    #[test]
    fn test_navigation_stops_at_unlocked_day() {
        let tree = Tree::new("unlock", &[("2024/WELCOME.ANS", b"hi")]);
        let mut cal = tree.open(date!(2024 - 12 - 02));
        assert_eq!(cal.navigate(Action::Next), Transition::Moved);
        assert_eq!(cal.screen, Screen::Day(2));
        assert_eq!(cal.navigate(Action::Next), Transition::Moved);
        assert_eq!(cal.screen, Screen::Comeback);
        assert_eq!(cal.navigate(Action::Next), Transition::Stayed);
        assert_eq!(cal.navigate(Action::Previous), Transition::Moved);
        assert_eq!(cal.screen, Screen::Day(2));
        assert_eq!(cal.navigate(Action::Previous), Transition::Moved);
        assert_eq!(cal.navigate(Action::Previous), Transition::Moved);
        assert_eq!(cal.screen, Screen::Welcome);
        assert_eq!(cal.navigate(Action::Previous), Transition::Stayed);
        assert_eq!(cal.navigate(Action::Quit), Transition::Exit);
    }

    #[test]
    fn test_full_year_has_no_comeback() {
        let tree = Tree::new("full", &[("2023/WELCOME.ANS", b"hi")]);
        let mut cal = tree.open(date!(2024 - 12 - 02));
        cal.navigate(Action::Next);
        assert_eq!(cal.navigate(Action::Last), Transition::Moved);
        assert_eq!(cal.screen, Screen::Day(25));
        assert_eq!(cal.navigate(Action::Next), Transition::Stayed);
        assert_eq!(cal.navigate(Action::Quit), Transition::Moved);
        assert_eq!(cal.screen, Screen::Welcome);
    }

    #[test]
    fn test_select_year_from_welcome() {
        let tree = Tree::new("select", &[("2023/WELCOME.ANS", b"a"), ("2024/WELCOME.ANS", b"b")]);
        let mut cal = tree.open(date!(2024 - 12 - 05));
        assert_eq!(cal.navigate(Action::Select(3)), Transition::Stayed);
        assert_eq!(cal.navigate(Action::Select(1)), Transition::Moved);
        assert_eq!(cal.year, 2023);
        assert_eq!(cal.max_day, 25);
        assert_eq!(cal.screen, Screen::Day(1));
        // Digits do nothing away from the welcome screen
        assert_eq!(cal.navigate(Action::Select(2)), Transition::Stayed);
        assert_eq!(cal.year, 2023);
    }

    #[test]
    fn test_day_art_and_fallbacks() {
        let tree = Tree::new("art", &[
            ("2024/1_DEC24.ANS", b"DAY ONE"),
            ("2024/02_dec24.ans", b"DAY TWO"),
            ("2025/01_DEC25.ANS", b"NEW STYLE"),
            ("common/WELCOME.ANS", b"COMMON HI"),
            ("common/MISSING.ANS", b"GONE"),
            ("common/COMEBACK.ANS", b"TOMORROW"),
        ]);
        let mut cal = tree.open(date!(2024 - 12 - 03));
        assert_eq!(text(&cal.current().0), "COMMON HI");

        cal.navigate(Action::Next);
        assert_eq!(cal.screen, Screen::Day(3));
        let (art, missing) = cal.current();
        assert_eq!(text(&art), "GONE");
        assert_eq!(missing.as_deref(), Some("3_DEC24.ANS"));

        cal.navigate(Action::Previous);
        assert_eq!(text(&cal.current().0), "DAY TWO");
        cal.navigate(Action::First);
        assert_eq!(text(&cal.current().0), "DAY ONE");

        cal.navigate(Action::Last);
        cal.navigate(Action::Next);
        assert_eq!(text(&cal.current().0), "TOMORROW");

        cal.navigate(Action::Quit);
        cal.navigate(Action::Select(2));
        assert_eq!(cal.year, 2025);
        assert_eq!(text(&cal.current().0), "NEW STYLE");
    }

    #[test]
    fn test_closed_outside_december() {
        let tree = Tree::new("closed", &[("2024/WELCOME.ANS", b"hi"), ("common/NOTYET.ANS", b"DECEMBER")]);
        let cal = tree.open(date!(2024 - 11 - 28));
        assert_eq!(text(&cal.closed().unwrap()), "DECEMBER");
        assert!(tree.open(date!(2024 - 12 - 01)).closed().is_none());

        let open = Calendar::open(&tree.0, &DisplayConfig::default(), TextMode::Cp437, date!(2024 - 11 - 28), false).unwrap();
        assert!(open.closed().is_none());

        let bare = Tree::new("closed-bare", &[("2024/WELCOME.ANS", b"hi")]);
        assert_eq!(text(&bare.open(date!(2024 - 06 - 01)).closed().unwrap()), NOT_YET);
    }
}
