use chrono::Weekday;

use crate::timetable::model::{EntrySpan, NormalizedEntry, days_between, weekday_index};

/// Entry positions grouped by weekday. Every list keeps declaration order so
/// the resolver's first-match rule stays deterministic.
#[derive(Debug, Clone, Default)]
pub struct DayIndex {
    starting: [Vec<usize>; 7],
    ending: [Vec<usize>; 7],
    passing: [Vec<usize>; 7],
}

impl DayIndex {
    /// Entries whose block starts on `day`.
    pub fn starting_on(&self, day: Weekday) -> &[usize] {
        &self.starting[weekday_index(day)]
    }

    /// Cross-midnight entries whose block ends on `day`.
    pub fn ending_on(&self, day: Weekday) -> &[usize] {
        &self.ending[weekday_index(day)]
    }

    /// Multi-day entries that cover the whole of `day`.
    pub fn passing_through(&self, day: Weekday) -> &[usize] {
        &self.passing[weekday_index(day)]
    }
}

pub fn build_index(entries: &[NormalizedEntry]) -> DayIndex {
    let mut index = DayIndex::default();
    for entry in entries {
        index.starting[weekday_index(entry.weekday)].push(entry.position);

        let EntrySpan::CrossDay { end_weekday } = entry.span else {
            continue;
        };
        index.ending[weekday_index(end_weekday)].push(entry.position);

        let mut day = entry.weekday.succ();
        for _ in 1..days_between(entry.weekday, end_weekday) {
            index.passing[weekday_index(day)].push(entry.position);
            day = day.succ();
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::model::{ScheduleEntry, load};

    fn entry(day: Weekday, from: &str, to: &str, end: Option<Weekday>) -> ScheduleEntry {
        ScheduleEntry {
            weekday: day,
            start_time_of_day: from.to_string(),
            end_time_of_day: to.to_string(),
            label: format!("{day} {from}"),
            display_color: None,
            end_weekday: end,
        }
    }

    #[test]
    fn groups_by_start_weekday_preserving_order() {
        let entries = load(&[
            entry(Weekday::Thu, "10:00", "10:45", None),
            entry(Weekday::Fri, "07:40", "08:25", None),
            entry(Weekday::Thu, "08:00", "08:45", None),
        ])
        .expect("valid");
        let index = build_index(&entries);
        assert_eq!(index.starting_on(Weekday::Thu), &[0, 2]);
        assert_eq!(index.starting_on(Weekday::Fri), &[1]);
        assert!(index.starting_on(Weekday::Sun).is_empty());
        assert!(index.ending_on(Weekday::Fri).is_empty());
    }

    #[test]
    fn cross_day_entries_are_indexed_on_end_and_intermediate_days() {
        let entries = load(&[
            entry(Weekday::Thu, "15:05", "07:40", Some(Weekday::Fri)),
            entry(Weekday::Fri, "12:10", "08:00", Some(Weekday::Mon)),
        ])
        .expect("valid");
        let index = build_index(&entries);
        assert_eq!(index.ending_on(Weekday::Fri), &[0]);
        assert_eq!(index.ending_on(Weekday::Mon), &[1]);
        assert!(index.passing_through(Weekday::Fri).is_empty());
        assert_eq!(index.passing_through(Weekday::Sat), &[1]);
        assert_eq!(index.passing_through(Weekday::Sun), &[1]);
        assert!(index.passing_through(Weekday::Mon).is_empty());
    }

    #[test]
    fn saturday_to_sunday_wraps_the_week() {
        let entries =
            load(&[entry(Weekday::Sat, "23:00", "01:00", Some(Weekday::Sun))]).expect("valid");
        let index = build_index(&entries);
        assert_eq!(index.starting_on(Weekday::Sat), &[0]);
        assert_eq!(index.ending_on(Weekday::Sun), &[0]);
        assert!(index.passing_through(Weekday::Sun).is_empty());
    }
}
