use std::io::Write;

use anyhow::Result;

use crate::driver::{ActivityUpdate, DisplaySink, DriverState};
use crate::timetable::model::TimetableSettings;
use crate::ui::render::ActivityView;

/// Line-oriented display for pipes, logs and `--once`.
pub struct PlainDisplay<W: Write> {
    out: W,
    settings: TimetableSettings,
}

impl<W: Write> PlainDisplay<W> {
    pub fn new(out: W, settings: TimetableSettings) -> Self {
        Self { out, settings }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySink for PlainDisplay<W> {
    fn show_clock(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "time: {text}")?;
        Ok(())
    }

    fn show_date(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "date: {text}")?;
        Ok(())
    }

    fn show_activity(&mut self, update: &ActivityUpdate<'_>) -> Result<()> {
        let view = ActivityView::from_update(update, &self.settings);
        match view.times.as_deref() {
            Some(times) => writeln!(self.out, "activity: {} ({times})", view.label)?,
            None => writeln!(self.out, "activity: {}", view.label)?,
        }
        if let (Some(remaining), Some(percent)) = (view.remaining.as_deref(), view.progress_percent)
        {
            writeln!(self.out, "remaining: {remaining}")?;
            writeln!(self.out, "progress: {percent}%")?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn show_state(&mut self, state: DriverState) -> Result<()> {
        if state == DriverState::Idle {
            writeln!(self.out, "paused")?;
        }
        Ok(())
    }
}
