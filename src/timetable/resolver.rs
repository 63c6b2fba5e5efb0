use chrono::Weekday;

use crate::timetable::model::{EntrySpan, NormalizedEntry, Timetable};

/// Finds the entry active at `minute` (0..1440) on `weekday`.
///
/// Lookup order: blocks starting today, then cross-midnight blocks ending
/// today, then multi-day blocks covering today entirely. Within each group
/// the first entry in declaration order wins. Overlaps are not rejected at
/// load time, so an overlapping later entry is simply shadowed.
pub fn resolve(timetable: &Timetable, weekday: Weekday, minute: u16) -> Option<&NormalizedEntry> {
    let index = timetable.index();
    let lookup = move |position: &usize| timetable.entry(*position);

    let starting_today = index
        .starting_on(weekday)
        .iter()
        .filter_map(lookup)
        .find(|entry| match entry.span {
            EntrySpan::SameDay => minute >= entry.start_minutes && minute < entry.end_minutes,
            EntrySpan::CrossDay { .. } => {
                weekday == entry.weekday && minute >= entry.start_minutes
            }
        });
    if starting_today.is_some() {
        return starting_today;
    }

    let ending_today = index
        .ending_on(weekday)
        .iter()
        .filter_map(lookup)
        .find(|entry| entry.end_weekday() == weekday && minute < entry.end_minutes);
    if ending_today.is_some() {
        return ending_today;
    }

    index
        .passing_through(weekday)
        .iter()
        .filter_map(lookup)
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::model::ScheduleEntry;

    const ALL_DAYS: [Weekday; 7] = [
        Weekday::Sun,
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
    ];

    fn entry(
        day: Weekday,
        from: &str,
        to: &str,
        end: Option<Weekday>,
        label: &str,
    ) -> ScheduleEntry {
        ScheduleEntry {
            weekday: day,
            start_time_of_day: from.to_string(),
            end_time_of_day: to.to_string(),
            label: label.to_string(),
            display_color: None,
            end_weekday: end,
        }
    }

    fn label_at(timetable: &Timetable, day: Weekday, minute: u16) -> Option<&str> {
        resolve(timetable, day, minute).map(|entry| entry.label.as_str())
    }

    #[test]
    fn same_day_entry_is_active_only_inside_its_half_open_interval() {
        let timetable =
            Timetable::load(&[entry(Weekday::Thu, "08:00", "08:45", None, "T")]).expect("valid");

        for day in ALL_DAYS {
            for minute in 0..1_440 {
                let expected = day == Weekday::Thu && (480..525).contains(&minute);
                assert_eq!(
                    resolve(&timetable, day, minute).is_some(),
                    expected,
                    "{day} minute {minute}"
                );
            }
        }
    }

    #[test]
    fn cross_midnight_entry_covers_evening_and_following_morning_only() {
        let timetable = Timetable::load(&[entry(
            Weekday::Thu,
            "15:05",
            "07:40",
            Some(Weekday::Fri),
            "Free",
        )])
        .expect("valid");

        for day in ALL_DAYS {
            for minute in 0..1_440 {
                let expected = (day == Weekday::Thu && minute >= 905)
                    || (day == Weekday::Fri && minute < 460);
                assert_eq!(
                    resolve(&timetable, day, minute).is_some(),
                    expected,
                    "{day} minute {minute}"
                );
            }
        }
    }

    #[test]
    fn weekend_span_covers_intermediate_days() {
        let timetable = Timetable::load(&[entry(
            Weekday::Fri,
            "12:10",
            "08:00",
            Some(Weekday::Mon),
            "Weekend",
        )])
        .expect("valid");

        assert_eq!(label_at(&timetable, Weekday::Fri, 729), None);
        assert_eq!(label_at(&timetable, Weekday::Fri, 730), Some("Weekend"));
        assert_eq!(label_at(&timetable, Weekday::Sat, 0), Some("Weekend"));
        assert_eq!(label_at(&timetable, Weekday::Sun, 1_439), Some("Weekend"));
        assert_eq!(label_at(&timetable, Weekday::Mon, 479), Some("Weekend"));
        assert_eq!(label_at(&timetable, Weekday::Mon, 480), None);
        assert_eq!(label_at(&timetable, Weekday::Tue, 100), None);
    }

    #[test]
    fn gap_resolves_to_none() {
        let timetable = Timetable::load(&[
            entry(Weekday::Thu, "08:00", "08:45", None, "T"),
            entry(Weekday::Thu, "08:55", "09:40", None, "OBV"),
        ])
        .expect("valid");
        assert_eq!(label_at(&timetable, Weekday::Thu, 530), None);
        assert_eq!(label_at(&timetable, Weekday::Thu, 535), Some("OBV"));
    }

    #[test]
    fn earlier_declaration_wins_on_overlap() {
        let timetable = Timetable::load(&[
            entry(Weekday::Mon, "08:00", "10:00", None, "first"),
            entry(Weekday::Mon, "09:00", "11:00", None, "second"),
        ])
        .expect("valid");
        assert_eq!(label_at(&timetable, Weekday::Mon, 570), Some("first"));
        assert_eq!(label_at(&timetable, Weekday::Mon, 610), Some("second"));
    }

    #[test]
    fn today_entries_take_priority_over_carry_over_from_yesterday() {
        let timetable = Timetable::load(&[
            entry(Weekday::Sun, "22:00", "08:00", Some(Weekday::Mon), "night"),
            entry(Weekday::Mon, "07:30", "08:15", None, "early"),
        ])
        .expect("valid");
        assert_eq!(label_at(&timetable, Weekday::Mon, 420), Some("night"));
        assert_eq!(label_at(&timetable, Weekday::Mon, 450), Some("early"));
        assert_eq!(label_at(&timetable, Weekday::Mon, 485), Some("early"));
    }

    #[test]
    fn resolution_is_repeatable() {
        let timetable = Timetable::load(&[entry(
            Weekday::Thu,
            "15:05",
            "07:40",
            Some(Weekday::Fri),
            "Free",
        )])
        .expect("valid");
        let first = resolve(&timetable, Weekday::Fri, 360).cloned();
        let second = resolve(&timetable, Weekday::Fri, 360).cloned();
        assert_eq!(first, second);
        assert!(first.is_some());
    }
}
