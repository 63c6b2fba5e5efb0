use chrono::Weekday;
use tracing::{debug, info, warn};

use crate::timetable::model::{
    MINUTES_PER_DAY, NormalizedEntry, Timetable, TimetableSettings, format_minutes,
    weekday_from_index, weekday_index,
};
use crate::timetable::resolver::resolve;

const MINUTES_PER_WEEK: u32 = 7 * MINUTES_PER_DAY as u32;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValidationWarning {
    /// Two same-day blocks overlap; the earlier declaration shadows the later.
    Overlap { first: usize, second: usize },
    /// A cross-midnight block shares time with another block. `at` is the
    /// first shared minute of the week, counted from Sunday 00:00.
    SpanOverlap { first: usize, second: usize, at: u32 },
    DuplicateSlot { first: usize, second: usize },
    /// Same-day block whose end is not after its start. It never resolves.
    InvertedSameDay { position: usize },
}

impl ValidationWarning {
    pub fn describe(&self, timetable: &Timetable, settings: &TimetableSettings) -> String {
        let describe_entry = |position: usize| {
            timetable
                .entry(position)
                .map(|entry| {
                    format!(
                        "'{}' {} {}-{} (#{position})",
                        entry.label,
                        settings.day_name(entry.weekday),
                        entry.start_label(),
                        entry.end_label()
                    )
                })
                .unwrap_or_else(|| format!("#{position}"))
        };
        match *self {
            ValidationWarning::Overlap { first, second } => format!(
                "overlap: {} vs {}; the earlier entry wins",
                describe_entry(first),
                describe_entry(second)
            ),
            ValidationWarning::SpanOverlap { first, second, at } => {
                let day = weekday_from_index((at / u32::from(MINUTES_PER_DAY)) as u8);
                let minute = (at % u32::from(MINUTES_PER_DAY)) as u16;
                let shown = day
                    .and_then(|day| resolve(timetable, day, minute))
                    .map_or("nothing", |entry| entry.label.as_str());
                let day_name = day.map_or("?", |day| settings.day_name(day));
                format!(
                    "overlap: {} vs {} from {day_name} {}; '{shown}' is shown there",
                    describe_entry(first),
                    describe_entry(second),
                    format_minutes(minute)
                )
            }
            ValidationWarning::DuplicateSlot { first, second } => format!(
                "possible duplicate: {} and {}",
                describe_entry(first),
                describe_entry(second)
            ),
            ValidationWarning::InvertedSameDay { position } => format!(
                "{} ends before it starts; set end_day to span midnight",
                describe_entry(position)
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub per_day: [usize; 7],
    pub cross_day: Vec<usize>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn count_on(&self, day: Weekday) -> usize {
        self.per_day[weekday_index(day)]
    }

    /// Human-readable report, one line per item.
    pub fn summary(&self, timetable: &Timetable, settings: &TimetableSettings) -> Vec<String> {
        let mut lines = vec![format!("Timetable entries: {}", timetable.len())];
        for index in 0..7 {
            let Some(day) = weekday_from_index(index) else {
                continue;
            };
            lines.push(format!("  {:<12} {}", settings.day_name(day), self.count_on(day)));
        }
        lines.push(format!("Cross-midnight blocks: {}", self.cross_day.len()));
        for entry in self.cross_day.iter().filter_map(|p| timetable.entry(*p)) {
            lines.push(format!(
                "  '{}' {} {} -> {} {}",
                entry.label,
                settings.day_name(entry.weekday),
                entry.start_label(),
                settings.day_name(entry.end_weekday()),
                entry.end_label()
            ));
        }
        lines.push(format!("Validation warnings: {}", self.warnings.len()));
        for warning in &self.warnings {
            lines.push(format!("  {}", warning.describe(timetable, settings)));
        }
        lines
    }
}

pub fn validate(timetable: &Timetable) -> ValidationReport {
    let mut report = ValidationReport::default();
    let entries = timetable.entries();

    for entry in entries {
        report.per_day[weekday_index(entry.weekday)] += 1;
        if entry.crosses_midnight() {
            report.cross_day.push(entry.position);
        } else if entry.end_minutes <= entry.start_minutes {
            report.warnings.push(ValidationWarning::InvertedSameDay {
                position: entry.position,
            });
        }
    }

    for (i, first) in entries.iter().enumerate() {
        for second in &entries[i + 1..] {
            let (first_pos, second_pos) = (first.position, second.position);
            if is_same_slot(first, second) {
                report.warnings.push(ValidationWarning::DuplicateSlot {
                    first: first_pos,
                    second: second_pos,
                });
            } else if first.crosses_midnight() || second.crosses_midnight() {
                if let Some(at) = first_shared_minute(first, second) {
                    report.warnings.push(ValidationWarning::SpanOverlap {
                        first: first_pos,
                        second: second_pos,
                        at,
                    });
                }
            } else if first.weekday == second.weekday && overlaps(first, second) {
                report.warnings.push(ValidationWarning::Overlap {
                    first: first_pos,
                    second: second_pos,
                });
            }
        }
    }

    report
}

fn is_same_slot(first: &NormalizedEntry, second: &NormalizedEntry) -> bool {
    first.weekday == second.weekday
        && first.start_minutes == second.start_minutes
        && first.end_minutes == second.end_minutes
        && first.span == second.span
}

fn overlaps(first: &NormalizedEntry, second: &NormalizedEntry) -> bool {
    first.start_minutes < second.end_minutes && first.end_minutes > second.start_minutes
}

/// Half-open minute-of-week ranges an entry covers, split at the week wrap.
fn week_ranges(entry: &NormalizedEntry) -> Vec<(u32, u32)> {
    let Ok(total) = u32::try_from(entry.total_minutes()) else {
        return Vec::new();
    };
    if total == 0 {
        return Vec::new();
    }
    let start = weekday_index(entry.weekday) as u32 * u32::from(MINUTES_PER_DAY)
        + u32::from(entry.start_minutes);
    let end = start + total;
    if end <= MINUTES_PER_WEEK {
        vec![(start, end)]
    } else {
        vec![(start, MINUTES_PER_WEEK), (0, end - MINUTES_PER_WEEK)]
    }
}

fn first_shared_minute(first: &NormalizedEntry, second: &NormalizedEntry) -> Option<u32> {
    let theirs = week_ranges(second);
    week_ranges(first)
        .into_iter()
        .flat_map(|(a_start, a_end)| {
            theirs.iter().filter_map(move |&(b_start, b_end)| {
                let start = a_start.max(b_start);
                (start < a_end.min(b_end)).then_some(start)
            })
        })
        .min()
}

pub fn log_report(
    report: &ValidationReport,
    timetable: &Timetable,
    settings: &TimetableSettings,
) {
    if timetable.is_empty() {
        warn!(
            "timetable has no entries; every minute resolves to '{}'",
            settings.idle_label
        );
    } else {
        info!(entries = timetable.len(), "timetable loaded");
    }
    for index in 0..7 {
        let Some(day) = weekday_from_index(index) else {
            continue;
        };
        let count = report.count_on(day);
        if count > 0 {
            info!(day = settings.day_name(day), entries = count, "day summary");
        }
    }
    for entry in report.cross_day.iter().filter_map(|p| timetable.entry(*p)) {
        info!(
            label = %entry.label,
            from = %format!("{} {}", settings.day_name(entry.weekday), entry.start_label()),
            to = %format!("{} {}", settings.day_name(entry.end_weekday()), entry.end_label()),
            "cross-midnight block"
        );
    }
    if report.is_clean() {
        debug!("timetable validation found no issues");
    }
    for warning in &report.warnings {
        warn!("{}", warning.describe(timetable, settings));
    }
}
