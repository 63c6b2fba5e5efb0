use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Datelike, Timelike};

use crate::time_provider::SelectedTimeProvider;
use crate::timetable::model::{MINUTES_PER_DAY, Timetable, TimetableSettings, weekday_from_index};
use crate::timetable::resolver::resolve;
use crate::timetable::validate::ValidationReport;

/// How far past the second boundary each tick actually sampled the clock.
pub struct TickStats {
    total_ticks: u64,
    late_ticks: u64,
    last_lateness: Duration,
    late_threshold: Duration,
    window_size: usize,
    window: VecDeque<Duration>,
    lateness_histogram: [u64; 6],
}

impl TickStats {
    pub fn new(window_size: usize, late_threshold: Duration) -> Self {
        Self {
            total_ticks: 0,
            late_ticks: 0,
            last_lateness: Duration::ZERO,
            late_threshold,
            window_size: window_size.max(1),
            window: VecDeque::with_capacity(window_size.max(1)),
            lateness_histogram: [0; 6],
        }
    }

    pub fn record_lateness(&mut self, lateness: Duration) {
        self.total_ticks += 1;
        self.last_lateness = lateness;
        if lateness > self.late_threshold {
            self.late_ticks += 1;
        }

        if self.window.len() == self.window_size {
            let _ = self.window.pop_front();
        }
        self.window.push_back(lateness);
        self.update_histogram(lateness);
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub fn late_ticks(&self) -> u64 {
        self.late_ticks
    }

    pub fn last_lateness(&self) -> Duration {
        self.last_lateness
    }

    pub fn rolling_mean_lateness(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.window.iter().sum();
        total / self.window.len() as u32
    }

    pub fn histogram(&self) -> [u64; 6] {
        self.lateness_histogram
    }

    fn update_histogram(&mut self, lateness: Duration) {
        let ms = lateness.as_millis();
        let bucket = if ms <= 1 {
            0
        } else if ms <= 5 {
            1
        } else if ms <= 20 {
            2
        } else if ms <= 50 {
            3
        } else if ms <= 100 {
            4
        } else {
            5
        };
        self.lateness_histogram[bucket] += 1;
    }
}

pub fn run_diagnostics(
    selected: &SelectedTimeProvider,
    timetable: &Timetable,
    settings: &TimetableSettings,
    report: &ValidationReport,
) -> Result<()> {
    println!("LessonClock diagnostics");
    println!("Selected timing source: {}", selected.label);
    println!("Wall clock: {}", selected.provider.is_wall_clock());
    println!(
        "Resolution hint (ms): {}",
        selected.provider.resolution_hint_ms()
    );
    println!("Timezone: {}", settings.zone.label());
    if let Some(note) = selected.correction_note.as_deref() {
        println!("Clock correction: {note}");
    }

    let sample = selected.provider.now()?;
    println!("Sample source: {}", sample.source);
    let local = sample.to_zone_local(&settings.zone)?;
    let minute = (local.hour() * 60 + local.minute()) as u16;
    println!(
        "Current local time: {} {}",
        settings.day_name(local.weekday()),
        local.format("%Y-%m-%d %H:%M:%S")
    );
    match resolve(timetable, local.weekday(), minute) {
        Some(entry) => println!("Current activity: {} (#{})", entry.label, entry.position),
        None => println!("Current activity: {}", settings.idle_label),
    }

    for line in report.summary(timetable, settings) {
        println!("{line}");
    }

    println!("Resolving every minute of the week...");
    let (covered, elapsed) = week_sweep(timetable);
    let samples = 7 * u32::from(MINUTES_PER_DAY);
    println!("Sweep summary:");
    println!("  Samples: {samples}");
    println!("  Covered minutes: {covered}");
    println!("  Idle minutes: {}", samples - covered);
    println!("  Total: {:.3} ms", elapsed.as_secs_f64() * 1_000.0);
    println!(
        "  Per lookup: {:.0} ns",
        elapsed.as_secs_f64() * 1e9 / f64::from(samples)
    );
    Ok(())
}

fn week_sweep(timetable: &Timetable) -> (u32, Duration) {
    let started = Instant::now();
    let mut covered = 0_u32;
    for index in 0..7 {
        let Some(day) = weekday_from_index(index) else {
            continue;
        };
        for minute in 0..MINUTES_PER_DAY {
            if resolve(timetable, day, minute).is_some() {
                covered += 1;
            }
        }
    }
    (covered, started.elapsed())
}
