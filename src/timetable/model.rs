use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{NaiveTime, Timelike, Weekday};
use serde::Deserialize;

use crate::time_provider::ZoneSpec;
use crate::timetable::error::TimetableError;
use crate::timetable::index::{DayIndex, build_index};

pub const MINUTES_PER_DAY: u16 = 1_440;

const DEFAULT_DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// One block of the weekly timetable as authored, before normalization.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScheduleEntry {
    pub weekday: Weekday,
    pub start_time_of_day: String,
    pub end_time_of_day: String,
    pub label: String,
    pub display_color: Option<String>,
    /// Present when the block runs past midnight; names the day it ends on.
    pub end_weekday: Option<Weekday>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EntrySpan {
    SameDay,
    CrossDay { end_weekday: Weekday },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NormalizedEntry {
    /// Declaration order in the authored list; earlier entries win ties.
    pub position: usize,
    pub weekday: Weekday,
    pub start_minutes: u16,
    pub end_minutes: u16,
    pub label: String,
    pub display_color: Option<String>,
    pub span: EntrySpan,
}

impl NormalizedEntry {
    pub fn crosses_midnight(&self) -> bool {
        matches!(self.span, EntrySpan::CrossDay { .. })
    }

    pub fn end_weekday(&self) -> Weekday {
        match self.span {
            EntrySpan::SameDay => self.weekday,
            EntrySpan::CrossDay { end_weekday } => end_weekday,
        }
    }

    /// Number of midnights the block crosses (0 for same-day blocks).
    pub fn span_days(&self) -> u8 {
        days_between(self.weekday, self.end_weekday())
    }

    pub fn total_minutes(&self) -> i32 {
        i32::from(self.span_days()) * i32::from(MINUTES_PER_DAY) + i32::from(self.end_minutes)
            - i32::from(self.start_minutes)
    }

    pub fn start_label(&self) -> String {
        format_minutes(self.start_minutes)
    }

    pub fn end_label(&self) -> String {
        format_minutes(self.end_minutes)
    }
}

/// Immutable, explicitly constructed timetable: normalized entries plus the
/// weekday index built over them.
#[derive(Debug, Clone)]
pub struct Timetable {
    entries: Vec<NormalizedEntry>,
    index: DayIndex,
}

impl Timetable {
    pub fn load(entries: &[ScheduleEntry]) -> Result<Self, TimetableError> {
        let normalized = load(entries)?;
        let index = build_index(&normalized);
        Ok(Self {
            entries: normalized,
            index,
        })
    }

    pub fn entries(&self) -> &[NormalizedEntry] {
        &self.entries
    }

    pub fn index(&self) -> &DayIndex {
        &self.index
    }

    pub fn entry(&self, position: usize) -> Option<&NormalizedEntry> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load(entries: &[ScheduleEntry]) -> Result<Vec<NormalizedEntry>, TimetableError> {
    entries
        .iter()
        .enumerate()
        .map(|(position, entry)| normalize_entry(position, entry))
        .collect()
}

fn normalize_entry(
    position: usize,
    entry: &ScheduleEntry,
) -> Result<NormalizedEntry, TimetableError> {
    let start_minutes = parse_time_of_day(&entry.start_time_of_day).ok_or_else(|| {
        TimetableError::MalformedTime {
            position,
            field: "start time",
            input: entry.start_time_of_day.clone(),
        }
    })?;
    let end_minutes = parse_time_of_day(&entry.end_time_of_day).ok_or_else(|| {
        TimetableError::MalformedTime {
            position,
            field: "end time",
            input: entry.end_time_of_day.clone(),
        }
    })?;

    let span = match entry.end_weekday {
        None => EntrySpan::SameDay,
        Some(end_weekday) if end_weekday == entry.weekday => {
            return Err(TimetableError::InvalidEndWeekday {
                position,
                weekday: entry.weekday,
            });
        }
        Some(end_weekday) => EntrySpan::CrossDay { end_weekday },
    };

    Ok(NormalizedEntry {
        position,
        weekday: entry.weekday,
        start_minutes,
        end_minutes,
        label: entry.label.clone(),
        display_color: entry.display_color.clone(),
        span,
    })
}

pub fn parse_time_of_day(input: &str) -> Option<u16> {
    let time = NaiveTime::parse_from_str(input.trim(), "%H:%M").ok()?;
    u16::try_from(time.hour() * 60 + time.minute()).ok()
}

pub fn format_minutes(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Sunday-based weekday number (0 = Sunday ... 6 = Saturday).
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

pub fn weekday_index(day: Weekday) -> usize {
    day.num_days_from_sunday() as usize
}

/// Forward distance in days from `from` to `to`, in `0..7`.
pub fn days_between(from: Weekday, to: Weekday) -> u8 {
    ((to.num_days_from_sunday() + 7 - from.num_days_from_sunday()) % 7) as u8
}

#[derive(Debug, Clone)]
pub struct TimetableConfig {
    pub version: u32,
    pub settings: TimetableSettings,
    pub entries: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone)]
pub struct TimetableSettings {
    /// Sunday first.
    pub day_names: [String; 7],
    pub idle_label: String,
    pub zone: ZoneSpec,
}

impl TimetableSettings {
    pub fn day_name(&self, day: Weekday) -> &str {
        &self.day_names[weekday_index(day)]
    }
}

impl Default for TimetableSettings {
    fn default() -> Self {
        Self {
            day_names: DEFAULT_DAY_NAMES.map(str::to_string),
            idle_label: default_idle_label(),
            zone: ZoneSpec::Local,
        }
    }
}

pub fn load_timetable_file(path: &Path) -> Result<TimetableConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read timetable file {}", path.display()))?;
    parse_timetable_text(&content)
}

pub fn parse_timetable_text(content: &str) -> Result<TimetableConfig> {
    let raw = serde_json::from_str::<TimetableFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported timetable version {}; expected version 1",
            raw.version
        );
    }

    let settings = parse_settings(raw.settings)?;

    let mut entries = Vec::with_capacity(raw.entries.len());
    for (position, entry) in raw.entries.into_iter().enumerate() {
        let weekday = entry
            .day
            .to_chrono()
            .with_context(|| format!("entry #{position} ('{}') has an invalid day", entry.label))?;
        let end_weekday = match entry.end_day {
            Some(token) => Some(token.to_chrono().with_context(|| {
                format!("entry #{position} ('{}') has an invalid end_day", entry.label)
            })?),
            None if entry.crosses_midnight => Some(weekday.succ()),
            None => None,
        };

        entries.push(ScheduleEntry {
            weekday,
            start_time_of_day: entry.from,
            end_time_of_day: entry.to,
            label: entry.label,
            display_color: entry.color,
            end_weekday,
        });
    }

    Ok(TimetableConfig {
        version: raw.version,
        settings,
        entries,
    })
}

fn parse_settings(raw: SettingsFile) -> Result<TimetableSettings> {
    let mut settings = TimetableSettings::default();
    if let Some(names) = raw.day_names {
        let count = names.len();
        settings.day_names = names.try_into().map_err(|_| {
            anyhow::anyhow!("day_names must list 7 names (Sunday first), got {count}")
        })?;
    }
    if let Some(idle_label) = raw.idle_label {
        settings.idle_label = idle_label;
    }
    if let Some(name) = raw.timezone {
        settings.zone = ZoneSpec::named(&name)?;
    }
    Ok(settings)
}

#[derive(Debug, Deserialize)]
struct TimetableFile {
    version: u32,
    #[serde(default)]
    settings: SettingsFile,
    entries: Vec<EntryFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    #[serde(default)]
    day_names: Option<Vec<String>>,
    #[serde(default)]
    idle_label: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntryFile {
    day: DayToken,
    #[serde(alias = "time_from")]
    from: String,
    #[serde(alias = "time_to")]
    to: String,
    #[serde(alias = "subject")]
    label: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    crosses_midnight: bool,
    #[serde(default)]
    end_day: Option<DayToken>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DayToken {
    Index(u8),
    Name(WeekdayToken),
}

#[derive(Debug, Deserialize)]
enum WeekdayToken {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl DayToken {
    fn to_chrono(&self) -> Result<Weekday> {
        match self {
            DayToken::Index(index) => weekday_from_index(*index)
                .ok_or_else(|| anyhow::anyhow!("weekday index {index} out of range 0-6")),
            DayToken::Name(token) => Ok(match token {
                WeekdayToken::Sun => Weekday::Sun,
                WeekdayToken::Mon => Weekday::Mon,
                WeekdayToken::Tue => Weekday::Tue,
                WeekdayToken::Wed => Weekday::Wed,
                WeekdayToken::Thu => Weekday::Thu,
                WeekdayToken::Fri => Weekday::Fri,
                WeekdayToken::Sat => Weekday::Sat,
            }),
        }
    }
}

fn default_idle_label() -> String {
    "No lesson".to_string()
}
