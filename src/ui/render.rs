use chrono::{Datelike, NaiveDateTime};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, LineGauge, Paragraph};
use serde::Serialize;

use crate::driver::ActivityUpdate;
use crate::timetable::accounting::{TimeSnapshot, progress_color};
use crate::timetable::model::{NormalizedEntry, TimetableSettings, format_minutes};

const PANEL_BG: Color = Color::Rgb(16, 24, 34);
const PANEL_ALT_BG: Color = Color::Rgb(12, 20, 30);
const BORDER: Color = Color::Rgb(68, 98, 122);
const ACCENT: Color = Color::Rgb(89, 204, 184);
const CLOCK_MAIN: Color = Color::Rgb(255, 204, 96);
const MUTED: Color = Color::Rgb(150, 171, 191);
const WARN: Color = Color::Rgb(255, 187, 99);

pub fn format_clock(local: &NaiveDateTime) -> String {
    local.format("%H:%M:%S").to_string()
}

/// "Thursday, 15.10.2026" with the configured day name.
pub fn format_date(local: &NaiveDateTime, settings: &TimetableSettings) -> String {
    format!(
        "{}, {}.{}.{}",
        settings.day_name(local.weekday()),
        local.day(),
        local.month(),
        local.year()
    )
}

pub fn format_remaining(snapshot: &TimeSnapshot) -> String {
    let hours = snapshot.remaining_hours_part();
    let minutes = snapshot.remaining_minutes_part();
    if hours > 0 {
        format!("{hours}h {minutes}min")
    } else {
        format!("{minutes}min")
    }
}

pub fn format_block_times(entry: &NormalizedEntry, settings: &TimetableSettings) -> String {
    if entry.crosses_midnight() {
        format!(
            "{} {} → {} {}",
            settings.day_name(entry.weekday),
            entry.start_label(),
            settings.day_name(entry.end_weekday()),
            entry.end_label()
        )
    } else {
        format!("{} - {}", entry.start_label(), entry.end_label())
    }
}

/// Everything a display needs to show about the current block, already
/// formatted.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ActivityView {
    pub label: String,
    pub position: Option<usize>,
    pub times: Option<String>,
    pub color: Option<String>,
    pub remaining: Option<String>,
    pub remaining_minutes: Option<u32>,
    pub elapsed_minutes: Option<u32>,
    pub progress_percent: Option<u8>,
    pub progress_color: Option<String>,
    pub crosses_midnight: bool,
    /// Weekday and minute the view was resolved for.
    pub resolved_at: Option<String>,
}

impl ActivityView {
    pub fn from_update(update: &ActivityUpdate<'_>, settings: &TimetableSettings) -> Self {
        let snapshot = update.snapshot;
        let resolved_at = Some(format!(
            "{} {}",
            settings.day_name(update.weekday),
            format_minutes(update.minute_of_day)
        ));
        match update.entry {
            Some(entry) => Self {
                label: entry.label.clone(),
                position: Some(entry.position),
                times: Some(format_block_times(entry, settings)),
                color: entry.display_color.clone(),
                remaining: snapshot.as_ref().map(format_remaining),
                remaining_minutes: snapshot.map(|s| s.remaining_minutes),
                elapsed_minutes: snapshot.map(|s| s.elapsed_minutes),
                progress_percent: snapshot.map(|s| s.progress_percent),
                progress_color: snapshot.map(|s| progress_color(s.progress_percent).css()),
                crosses_midnight: entry.crosses_midnight(),
                resolved_at,
            },
            None => Self {
                resolved_at,
                ..Self::idle(settings)
            },
        }
    }

    pub fn idle(settings: &TimetableSettings) -> Self {
        Self {
            label: settings.idle_label.clone(),
            position: None,
            times: None,
            color: None,
            remaining: None,
            remaining_minutes: None,
            elapsed_minutes: None,
            progress_percent: None,
            progress_color: None,
            crosses_midnight: false,
            resolved_at: None,
        }
    }
}

pub struct ScreenModel<'a> {
    pub clock: &'a str,
    pub date: &'a str,
    pub activity: &'a ActivityView,
    pub source_label: &'a str,
    pub zone_label: &'a str,
    pub paused: bool,
}

pub fn draw(frame: &mut Frame<'_>, model: &ScreenModel<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(6),
            Constraint::Min(7),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_clock_panel(frame, chunks[0], model);
    render_activity_panel(frame, chunks[1], model);
    render_footer(frame, chunks[2], model);
}

fn render_clock_panel(frame: &mut Frame<'_>, area: Rect, model: &ScreenModel<'_>) {
    let title = Line::from(vec![
        Span::styled(
            " LessonClock ",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!("[{}]", model.source_label),
            Style::default().fg(CLOCK_MAIN).add_modifier(Modifier::BOLD),
        ),
    ]);
    let clock_line = Line::from(Span::styled(
        model.clock,
        Style::default().fg(CLOCK_MAIN).add_modifier(Modifier::BOLD),
    ));
    let date_line = Line::from(Span::styled(model.date, Style::default().fg(MUTED)));

    let panel = Paragraph::new(vec![Line::default(), clock_line, date_line])
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(BORDER))
                .style(Style::default().bg(PANEL_BG)),
        );
    frame.render_widget(panel, area);
}

fn render_activity_panel(frame: &mut Frame<'_>, area: Rect, model: &ScreenModel<'_>) {
    let container = Block::default()
        .title(Line::from(Span::styled(
            " Now ",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER))
        .style(Style::default().bg(PANEL_ALT_BG));
    let inner = container.inner(area);
    frame.render_widget(container, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(inner);

    let activity = model.activity;
    let label_color = activity
        .color
        .as_deref()
        .and_then(|color| color.parse::<Color>().ok())
        .unwrap_or(Color::White);
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            activity.label.as_str(),
            Style::default().fg(label_color).add_modifier(Modifier::BOLD),
        )))
        .alignment(Alignment::Center),
        chunks[0],
    );
    if let Some(times) = activity.times.as_deref() {
        frame.render_widget(
            Paragraph::new(times)
                .style(Style::default().fg(MUTED))
                .alignment(Alignment::Center),
            chunks[1],
        );
    }

    let (Some(remaining), Some(percent)) =
        (activity.remaining.as_deref(), activity.progress_percent)
    else {
        return;
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Remaining ", Style::default().fg(MUTED)),
            Span::styled(
                remaining,
                Style::default().fg(CLOCK_MAIN).add_modifier(Modifier::BOLD),
            ),
        ]))
        .alignment(Alignment::Center),
        chunks[2],
    );

    let color = progress_color(percent);
    let gauge = LineGauge::default()
        .ratio(f64::from(percent) / 100.0)
        .label(format!("{percent:>3}%"))
        .line_set(ratatui::symbols::line::THICK)
        .filled_style(
            Style::default()
                .fg(Color::Rgb(color.red, color.green, color.blue))
                .add_modifier(Modifier::BOLD),
        )
        .unfilled_style(Style::default().fg(BORDER));
    frame.render_widget(gauge, chunks[3]);
}

fn render_footer(frame: &mut Frame<'_>, area: Rect, model: &ScreenModel<'_>) {
    let mut spans = vec![
        Span::styled("Keys: ", Style::default().fg(MUTED)),
        Span::styled("[q]", Style::default().fg(CLOCK_MAIN)),
        Span::raw(" quit  "),
        Span::styled("[r]", Style::default().fg(CLOCK_MAIN)),
        Span::raw(" refresh  "),
        Span::styled("[p]", Style::default().fg(CLOCK_MAIN)),
        Span::raw(" pause/resume   "),
        Span::styled("Zone ", Style::default().fg(MUTED)),
        Span::styled(model.zone_label, Style::default().fg(ACCENT)),
    ];
    if model.paused {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(
            "PAUSED",
            Style::default().fg(Color::Black).bg(WARN).add_modifier(Modifier::BOLD),
        ));
    }
    let footer = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(BORDER))
            .style(Style::default().bg(PANEL_BG)),
    );
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Weekday};

    use super::*;
    use crate::timetable::accounting::account;
    use crate::timetable::model::{ScheduleEntry, Timetable};

    fn load(entries: Vec<ScheduleEntry>) -> Timetable {
        Timetable::load(&entries).expect("valid")
    }

    fn entry(day: Weekday, from: &str, to: &str, end: Option<Weekday>) -> ScheduleEntry {
        ScheduleEntry {
            weekday: day,
            start_time_of_day: from.to_string(),
            end_time_of_day: to.to_string(),
            label: "Block".to_string(),
            display_color: Some("#3366ff".to_string()),
            end_weekday: end,
        }
    }

    #[test]
    fn clock_and_date_use_configured_names() {
        let local = NaiveDate::from_ymd_opt(2026, 10, 15)
            .expect("date")
            .and_hms_opt(8, 5, 9)
            .expect("time");
        let mut settings = TimetableSettings::default();
        assert_eq!(format_clock(&local), "08:05:09");
        assert_eq!(format_date(&local, &settings), "Thursday, 15.10.2026");

        settings.day_names[4] = "Čtvrtek".to_string();
        assert_eq!(format_date(&local, &settings), "Čtvrtek, 15.10.2026");
    }

    #[test]
    fn remaining_drops_hours_when_zero() {
        let timetable = load(vec![entry(Weekday::Thu, "15:05", "07:40", Some(Weekday::Fri))]);
        let block = timetable.entry(0);
        let evening = account(block, 1_200, Weekday::Thu)
            .expect("valid")
            .expect("countdown");
        assert_eq!(format_remaining(&evening), "11h 40min");
        let morning = account(block, 435, Weekday::Fri)
            .expect("valid")
            .expect("countdown");
        assert_eq!(format_remaining(&morning), "25min");
    }

    #[test]
    fn block_times_name_both_days_only_across_midnight() {
        let settings = TimetableSettings::default();
        let timetable = load(vec![
            entry(Weekday::Thu, "08:00", "08:45", None),
            entry(Weekday::Thu, "15:05", "07:40", Some(Weekday::Fri)),
        ]);
        let same_day = timetable.entry(0).expect("entry");
        let cross_day = timetable.entry(1).expect("entry");
        assert_eq!(format_block_times(same_day, &settings), "08:00 - 08:45");
        assert_eq!(
            format_block_times(cross_day, &settings),
            "Thursday 15:05 → Friday 07:40"
        );
    }

    #[test]
    fn activity_view_carries_countdown_and_colors() {
        let settings = TimetableSettings::default();
        let timetable = load(vec![entry(Weekday::Thu, "08:00", "08:45", None)]);
        let block = timetable.entry(0);
        let update = ActivityUpdate {
            entry: block,
            snapshot: account(block, 500, Weekday::Thu).expect("valid"),
            entry_changed: true,
            weekday: Weekday::Thu,
            minute_of_day: 500,
        };
        let view = ActivityView::from_update(&update, &settings);
        assert_eq!(view.label, "Block");
        assert_eq!(view.times.as_deref(), Some("08:00 - 08:45"));
        assert_eq!(view.remaining.as_deref(), Some("25min"));
        assert_eq!(view.progress_percent, Some(44));
        assert_eq!(view.elapsed_minutes, Some(20));
        assert_eq!(view.resolved_at.as_deref(), Some("Thursday 08:20"));
        assert_eq!(view.color.as_deref(), Some("#3366ff"));
        assert!(view.progress_color.is_some());
    }

    #[test]
    fn idle_view_uses_idle_label() {
        let settings = TimetableSettings::default();
        let update = ActivityUpdate {
            entry: None,
            snapshot: None,
            entry_changed: true,
            weekday: Weekday::Sun,
            minute_of_day: 0,
        };
        let view = ActivityView::from_update(&update, &settings);
        assert_eq!(view.resolved_at.as_deref(), Some("Sunday 00:00"));
        assert_eq!(
            ActivityView {
                resolved_at: None,
                ..view.clone()
            },
            ActivityView::idle(&settings)
        );
        assert_eq!(view.label, "No lesson");
        assert!(view.remaining.is_none());
    }
}
