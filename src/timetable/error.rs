use chrono::Weekday;
use thiserror::Error;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum TimetableError {
    #[error("entry #{position} has malformed {field} '{input}', expected HH:MM")]
    MalformedTime {
        position: usize,
        field: &'static str,
        input: String,
    },

    #[error("entry #{position} crosses midnight but ends on its own start day ({weekday})")]
    InvalidEndWeekday { position: usize, weekday: Weekday },

    #[error("entry '{label}' has non-positive duration ({total_minutes} min)")]
    InvalidDuration { label: String, total_minutes: i32 },
}
