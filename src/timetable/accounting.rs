use chrono::Weekday;

use crate::timetable::error::TimetableError;
use crate::timetable::model::{EntrySpan, MINUTES_PER_DAY, NormalizedEntry, days_between};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TimeSnapshot {
    pub remaining_minutes: u32,
    pub progress_percent: u8,
    pub elapsed_minutes: u32,
    pub total_minutes: u32,
}

impl TimeSnapshot {
    pub fn remaining_hours_part(&self) -> u32 {
        self.remaining_minutes / 60
    }

    pub fn remaining_minutes_part(&self) -> u32 {
        self.remaining_minutes % 60
    }
}

/// Remaining time and progress for `entry` at `minute` on `weekday`.
///
/// `None` in gives `None` out. A block with a non-positive duration yields
/// `InvalidDuration`; callers treat that as "no countdown" for the tick.
pub fn account(
    entry: Option<&NormalizedEntry>,
    minute: u16,
    weekday: Weekday,
) -> Result<Option<TimeSnapshot>, TimetableError> {
    let Some(entry) = entry else {
        return Ok(None);
    };

    let total = entry.total_minutes();
    if total <= 0 {
        return Err(TimetableError::InvalidDuration {
            label: entry.label.clone(),
            total_minutes: total,
        });
    }

    let day_offset = match entry.span {
        EntrySpan::SameDay => 0,
        EntrySpan::CrossDay { .. } => days_between(entry.weekday, weekday),
    };
    let elapsed = i32::from(day_offset) * i32::from(MINUTES_PER_DAY) + i32::from(minute)
        - i32::from(entry.start_minutes);
    let remaining = (total - elapsed).clamp(0, total);

    Ok(Some(TimeSnapshot {
        remaining_minutes: remaining.unsigned_abs(),
        progress_percent: progress_percent(elapsed, total),
        elapsed_minutes: elapsed.clamp(0, total).unsigned_abs(),
        total_minutes: total.unsigned_abs(),
    }))
}

/// Clamped to 0..=100 before rounding. 100 is reserved for a finished block.
fn progress_percent(elapsed: i32, total: i32) -> u8 {
    let raw = f64::from(elapsed) / f64::from(total) * 100.0;
    let percent = raw.clamp(0.0, 100.0).round() as u8;
    if elapsed < total { percent.min(99) } else { percent }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ProgressColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ProgressColor {
    pub fn css(&self) -> String {
        format!("rgb({}, {}, {})", self.red, self.green, self.blue)
    }
}

/// Green towards yellow over the first half, yellow towards red afterwards.
pub fn progress_color(percent: u8) -> ProgressColor {
    let percent = f64::from(percent.min(100));
    if percent < 50.0 {
        ProgressColor {
            red: ((percent / 50.0) * 255.0).round() as u8,
            green: 255,
            blue: 100,
        }
    } else {
        ProgressColor {
            red: 255,
            green: (255.0 - ((percent - 50.0) / 50.0) * 155.0).round() as u8,
            blue: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::model::{ScheduleEntry, Timetable, load};
    use crate::timetable::resolver::resolve;

    fn normalized(day: Weekday, from: &str, to: &str, end: Option<Weekday>) -> NormalizedEntry {
        load(&[ScheduleEntry {
            weekday: day,
            start_time_of_day: from.to_string(),
            end_time_of_day: to.to_string(),
            label: "block".to_string(),
            display_color: None,
            end_weekday: end,
        }])
        .expect("valid")
        .remove(0)
    }

    #[test]
    fn same_day_lesson_countdown() {
        let lesson = normalized(Weekday::Thu, "08:00", "08:45", None);

        let at_start = account(Some(&lesson), 480, Weekday::Thu)
            .expect("valid")
            .expect("snapshot");
        assert_eq!(at_start.remaining_minutes, 45);
        assert_eq!(at_start.progress_percent, 0);

        let midway = account(Some(&lesson), 500, Weekday::Thu)
            .expect("valid")
            .expect("snapshot");
        assert_eq!(midway.remaining_minutes, 25);
        assert_eq!(midway.progress_percent, 44);
        assert_eq!(midway.elapsed_minutes, 20);
        assert_eq!(midway.total_minutes, 45);
    }

    #[test]
    fn cross_midnight_countdown_on_start_and_end_day() {
        let free = normalized(Weekday::Thu, "15:05", "07:40", Some(Weekday::Fri));

        let evening = account(Some(&free), 1_200, Weekday::Thu)
            .expect("valid")
            .expect("snapshot");
        assert_eq!(evening.remaining_minutes, 700);
        assert_eq!(evening.remaining_hours_part(), 11);
        assert_eq!(evening.remaining_minutes_part(), 40);
        assert_eq!(evening.progress_percent, 30);

        let morning = account(Some(&free), 360, Weekday::Fri)
            .expect("valid")
            .expect("snapshot");
        assert_eq!(morning.remaining_minutes, 100);
        assert_eq!(morning.remaining_hours_part(), 1);
        assert_eq!(morning.remaining_minutes_part(), 40);
        assert_eq!(morning.progress_percent, 90);
    }

    #[test]
    fn no_entry_means_no_snapshot() {
        assert_eq!(account(None, 600, Weekday::Sun).expect("valid"), None);
    }

    #[test]
    fn zero_length_entry_is_invalid_duration() {
        let empty = normalized(Weekday::Mon, "10:00", "10:00", None);
        let err = account(Some(&empty), 600, Weekday::Mon).expect_err("zero duration");
        assert_eq!(
            err,
            TimetableError::InvalidDuration {
                label: "block".to_string(),
                total_minutes: 0,
            }
        );
    }

    #[test]
    fn one_minute_entry_does_not_divide_by_zero() {
        let short = normalized(Weekday::Mon, "10:00", "10:01", None);
        let snapshot = account(Some(&short), 600, Weekday::Mon)
            .expect("valid")
            .expect("snapshot");
        assert_eq!(snapshot.remaining_minutes, 1);
        assert_eq!(snapshot.progress_percent, 0);
    }

    #[test]
    fn last_minute_stays_below_one_hundred_percent() {
        let long = normalized(Weekday::Mon, "08:00", "15:15", None);
        let snapshot = account(Some(&long), 914, Weekday::Mon)
            .expect("valid")
            .expect("snapshot");
        assert_eq!(snapshot.remaining_minutes, 1);
        assert!(snapshot.progress_percent < 100);
    }

    #[test]
    fn progress_is_clamped_for_inconsistent_readings() {
        let lesson = normalized(Weekday::Thu, "08:00", "08:45", None);
        let early = account(Some(&lesson), 470, Weekday::Thu)
            .expect("valid")
            .expect("snapshot");
        assert_eq!(early.progress_percent, 0);
        assert_eq!(early.remaining_minutes, 45);

        let late = account(Some(&lesson), 530, Weekday::Thu)
            .expect("valid")
            .expect("snapshot");
        assert_eq!(late.progress_percent, 100);
        assert_eq!(late.remaining_minutes, 0);
    }

    #[test]
    fn progress_is_monotonic_across_weekend_span() {
        let timetable = Timetable::load(&[ScheduleEntry {
            weekday: Weekday::Fri,
            start_time_of_day: "12:10".to_string(),
            end_time_of_day: "08:00".to_string(),
            label: "Weekend".to_string(),
            display_color: None,
            end_weekday: Some(Weekday::Mon),
        }])
        .expect("valid");

        let mut previous_percent = 0;
        let mut previous_remaining = u32::MAX;
        let mut day = Weekday::Fri;
        for _ in 0..4 {
            for minute in 0..1_440 {
                let Some(entry) = resolve(&timetable, day, minute) else {
                    continue;
                };
                let snapshot = account(Some(entry), minute, day)
                    .expect("valid")
                    .expect("snapshot");
                assert!(snapshot.progress_percent >= previous_percent, "{day} {minute}");
                assert!(snapshot.remaining_minutes < previous_remaining, "{day} {minute}");
                previous_percent = snapshot.progress_percent;
                previous_remaining = snapshot.remaining_minutes;
            }
            day = day.succ();
        }
        assert_eq!(previous_remaining, 1);
        assert!(previous_percent < 100);
    }

    #[test]
    fn progress_is_monotonic_across_midnight() {
        let free = normalized(Weekday::Thu, "15:05", "07:40", Some(Weekday::Fri));
        let samples = (905..1_440)
            .map(|minute| (Weekday::Thu, minute))
            .chain((0..460).map(|minute| (Weekday::Fri, minute)));

        let mut previous = 0;
        for (day, minute) in samples {
            let snapshot = account(Some(&free), minute, day)
                .expect("valid")
                .expect("snapshot");
            assert!(snapshot.progress_percent >= previous, "{day} {minute}");
            previous = snapshot.progress_percent;
        }
    }

    #[test]
    fn progress_color_runs_green_yellow_red() {
        assert_eq!(
            progress_color(0),
            ProgressColor {
                red: 0,
                green: 255,
                blue: 100
            }
        );
        assert_eq!(progress_color(50).css(), "rgb(255, 255, 100)");
        assert_eq!(progress_color(100).css(), "rgb(255, 100, 100)");
        assert_eq!(progress_color(25).red, 128);
    }
}
