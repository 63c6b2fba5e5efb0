use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use tracing::{debug, info, warn};

use crate::diagnostics::TickStats;
use crate::time_provider::{TimeProvider, ZoneSpec};
use crate::timetable::accounting::{TimeSnapshot, account};
use crate::timetable::model::{NormalizedEntry, Timetable, TimetableSettings};
use crate::timetable::resolver::resolve;
use crate::ui::render::{format_clock, format_date};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DriverState {
    Idle,
    Ticking,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DriverCommand {
    /// Display hidden: cancel the pending tick and go idle.
    Pause,
    /// Display visible again: tick immediately with a cold cache.
    Resume,
    Refresh,
    Stop,
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityUpdate<'a> {
    pub entry: Option<&'a NormalizedEntry>,
    pub snapshot: Option<TimeSnapshot>,
    /// False when the same block is still active and only the countdown moved.
    pub entry_changed: bool,
    pub weekday: Weekday,
    pub minute_of_day: u16,
}

pub trait DisplaySink {
    fn show_clock(&mut self, text: &str) -> Result<()>;
    fn show_date(&mut self, text: &str) -> Result<()>;
    fn show_activity(&mut self, update: &ActivityUpdate<'_>) -> Result<()>;

    fn show_state(&mut self, _state: DriverState) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TickReport {
    pub skipped: bool,
    pub sample_unix_ms: Option<i64>,
    pub clock_updated: bool,
    pub date_updated: bool,
    pub resolved: bool,
    pub entry_changed: bool,
}

#[derive(Debug, Default)]
struct TickCache {
    last_second: Option<i64>,
    last_weekday: Option<Weekday>,
    last_minute: Option<u16>,
    last_entry: Option<Option<usize>>,
}

impl TickCache {
    fn invalidate(&mut self) {
        *self = Self::default();
    }
}

pub struct Driver {
    timetable: Timetable,
    settings: TimetableSettings,
    zone: ZoneSpec,
    provider: Box<dyn TimeProvider>,
    sinks: Vec<Box<dyn DisplaySink>>,
    state: DriverState,
    cache: TickCache,
    stats: TickStats,
    resolutions: u64,
}

impl Driver {
    pub fn new(
        timetable: Timetable,
        settings: TimetableSettings,
        provider: Box<dyn TimeProvider>,
    ) -> Self {
        let zone = settings.zone;
        Self {
            timetable,
            settings,
            zone,
            provider,
            sinks: Vec::new(),
            state: DriverState::Idle,
            cache: TickCache::default(),
            stats: TickStats::new(120, Duration::from_millis(50)),
            resolutions: 0,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn DisplaySink>) {
        self.sinks.push(sink);
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// How many times the resolver has run since construction.
    pub fn resolutions(&self) -> u64 {
        self.resolutions
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    pub fn start(&mut self) {
        self.cache.invalidate();
        self.transition(DriverState::Ticking);
    }

    pub fn pause(&mut self) {
        self.transition(DriverState::Idle);
    }

    fn transition(&mut self, state: DriverState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "driver state changed");
        self.state = state;
        self.for_each_sink("state", |sink| sink.show_state(state));
    }

    pub fn force_refresh(&mut self) {
        self.cache.last_minute = None;
    }

    /// Reads the time provider once and evaluates the tick. A failing
    /// provider skips the tick instead of stopping the driver.
    pub fn tick(&mut self) -> TickReport {
        let sample = match self.provider.now() {
            Ok(sample) => sample,
            Err(err) => {
                warn!("time provider failed, skipping tick: {err:#}");
                return TickReport {
                    skipped: true,
                    ..TickReport::default()
                };
            }
        };
        let local = match sample.to_zone_local(&self.zone) {
            Ok(local) => local,
            Err(err) => {
                warn!("time conversion failed, skipping tick: {err:#}");
                return TickReport {
                    skipped: true,
                    ..TickReport::default()
                };
            }
        };
        self.stats
            .record_lateness(Duration::from_millis(sample.unix_ms.rem_euclid(1_000) as u64));
        let mut report = self.evaluate(local);
        report.sample_unix_ms = Some(sample.unix_ms);
        report
    }

    /// Clock text, then date label, then resolution and accounting, each
    /// recomputed only when its input changed since the previous tick.
    pub fn evaluate(&mut self, local: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();

        let unix_second = local.and_utc().timestamp();
        if self.cache.last_second != Some(unix_second) {
            let text = format_clock(&local);
            self.for_each_sink("clock", |sink| sink.show_clock(&text));
            self.cache.last_second = Some(unix_second);
            report.clock_updated = true;
        }

        let weekday = local.weekday();
        if self.cache.last_weekday != Some(weekday) {
            let text = format_date(&local, &self.settings);
            self.for_each_sink("date", |sink| sink.show_date(&text));
            info!(day = self.settings.day_name(weekday), "day changed");
            self.cache.last_weekday = Some(weekday);
            report.date_updated = true;
        }

        let minute_of_day = (local.hour() * 60 + local.minute()) as u16;
        if self.cache.last_minute != Some(minute_of_day) {
            self.refresh_activity(weekday, minute_of_day, &mut report);
            self.cache.last_minute = Some(minute_of_day);
        }

        report
    }

    fn refresh_activity(
        &mut self,
        weekday: Weekday,
        minute_of_day: u16,
        report: &mut TickReport,
    ) {
        let entry = resolve(&self.timetable, weekday, minute_of_day);
        self.resolutions += 1;
        report.resolved = true;

        let snapshot = countdown(entry, minute_of_day, weekday);

        let position = entry.map(|entry| entry.position);
        let entry_changed = self.cache.last_entry != Some(position);
        if entry_changed {
            match entry {
                Some(entry) => info!(
                    label = %entry.label,
                    from = %entry.start_label(),
                    to = %entry.end_label(),
                    "activity started"
                ),
                None => info!(label = %self.settings.idle_label, "no activity"),
            }
        }
        self.cache.last_entry = Some(position);
        report.entry_changed = entry_changed;

        let update = ActivityUpdate {
            entry,
            snapshot,
            entry_changed,
            weekday,
            minute_of_day,
        };
        for sink in &mut self.sinks {
            if let Err(err) = sink.show_activity(&update) {
                warn!("display sink failed on activity: {err:#}");
            }
        }
    }

    fn for_each_sink(
        &mut self,
        what: &str,
        mut apply: impl FnMut(&mut dyn DisplaySink) -> Result<()>,
    ) {
        for sink in &mut self.sinks {
            if let Err(err) = apply(sink.as_mut()) {
                warn!("display sink failed on {what}: {err:#}");
            }
        }
    }

    /// Ticks on wall-clock second boundaries until stopped, the command
    /// channel closes while idle, or `max_ticks` is reached. Returns the
    /// number of ticks evaluated.
    pub fn run(
        &mut self,
        commands: &Receiver<DriverCommand>,
        max_ticks: Option<u64>,
    ) -> Result<u64> {
        let mut ticks = 0_u64;
        let mut commands_open = true;
        self.start();

        loop {
            if self.state == DriverState::Idle {
                match commands.recv() {
                    Ok(command) => {
                        if self.handle(command) {
                            break;
                        }
                        continue;
                    }
                    Err(_) => {
                        debug!("command channel closed while idle");
                        break;
                    }
                }
            }

            let started = Instant::now();
            let sample_ms = self.tick().sample_unix_ms.unwrap_or(0);
            ticks += 1;
            if max_ticks.is_some_and(|limit| ticks >= limit) {
                break;
            }

            let delay = next_tick_delay(sample_ms, started.elapsed());
            if !commands_open {
                thread::sleep(delay);
                continue;
            }
            match commands.recv_timeout(delay) {
                Ok(command) => {
                    if self.handle(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    commands_open = false;
                    thread::sleep(delay);
                }
            }
        }

        // Stopped for good; displays are torn down by the caller.
        self.state = DriverState::Idle;
        let stats = self.stats();
        debug!(
            ticks,
            resolutions = self.resolutions(),
            sampled = stats.total_ticks(),
            late = stats.late_ticks(),
            last_lateness_ms = stats.last_lateness().as_millis() as u64,
            mean_lateness_ms = stats.rolling_mean_lateness().as_millis() as u64,
            histogram = ?stats.histogram(),
            "driver stopped"
        );
        Ok(ticks)
    }

    /// Returns true when the driver should stop.
    fn handle(&mut self, command: DriverCommand) -> bool {
        match command {
            DriverCommand::Pause => self.pause(),
            DriverCommand::Resume => self.start(),
            DriverCommand::Refresh => self.force_refresh(),
            DriverCommand::Stop => return true,
        }
        false
    }
}

/// Accounting for one minute. A failure hides the countdown for that minute
/// only; the block label is still shown.
fn countdown(
    entry: Option<&NormalizedEntry>,
    minute: u16,
    weekday: Weekday,
) -> Option<TimeSnapshot> {
    match account(entry, minute, weekday) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!("countdown hidden for this tick: {err}");
            None
        }
    }
}

/// Delay from the end of a tick to the next second boundary, given the
/// instant the tick sampled and how long the tick itself took.
pub fn next_tick_delay(sample_unix_ms: i64, execution: Duration) -> Duration {
    let until_boundary = Duration::from_millis((1_000 - sample_unix_ms.rem_euclid(1_000)) as u64);
    until_boundary.saturating_sub(execution)
}
