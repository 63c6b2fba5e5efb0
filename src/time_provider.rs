use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use chrono::{Local, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::time_software::SoftwareTimeProvider;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimingSourceKind {
    /// Host wall clock, monotonic between resyncs.
    System,
    /// Starts at the given zone-local instant and advances in real time.
    StartAt(NaiveDateTime),
    /// Always reports the given zone-local instant.
    FrozenAt(NaiveDateTime),
}

#[derive(Clone, Debug)]
pub struct TimeSample {
    pub unix_ms: i64,
    pub source: &'static str,
}

impl TimeSample {
    pub fn to_zone_local(&self, zone: &ZoneSpec) -> Result<NaiveDateTime> {
        zone.local_from_unix_ms(self.unix_ms)
    }
}

/// The single fixed zone the timetable is authored in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ZoneSpec {
    Local,
    Named(Tz),
}

impl ZoneSpec {
    pub fn named(name: &str) -> Result<Self> {
        name.parse::<Tz>()
            .map(ZoneSpec::Named)
            .map_err(|_| anyhow!("unknown timezone '{name}'"))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ZoneSpec::Local => "local",
            ZoneSpec::Named(tz) => tz.name(),
        }
    }

    pub fn local_from_unix_ms(&self, unix_ms: i64) -> Result<NaiveDateTime> {
        let converted = match self {
            ZoneSpec::Local => Local
                .timestamp_millis_opt(unix_ms)
                .single()
                .map(|dt| dt.naive_local()),
            ZoneSpec::Named(tz) => tz
                .timestamp_millis_opt(unix_ms)
                .single()
                .map(|dt| dt.naive_local()),
        };
        converted.ok_or_else(|| anyhow!("failed to convert {unix_ms} ms into {}", self.label()))
    }

    /// Ambiguous local times (DST fall-back) resolve to the earlier instant.
    pub fn unix_ms_from_local(&self, naive: NaiveDateTime) -> Result<i64> {
        let converted = match self {
            ZoneSpec::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp_millis()),
            ZoneSpec::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp_millis()),
        };
        converted.ok_or_else(|| anyhow!("local time {naive} does not exist in {}", self.label()))
    }
}

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> Result<TimeSample>;
    fn resolution_hint_ms(&self) -> u64;
    fn is_wall_clock(&self) -> bool;
}

pub struct SelectedTimeProvider {
    pub provider: Box<dyn TimeProvider>,
    pub label: &'static str,
    pub correction: ClockCorrection,
    pub correction_note: Option<String>,
}

pub fn select_provider(
    kind: TimingSourceKind,
    zone: &ZoneSpec,
    offset_ms: i64,
) -> Result<SelectedTimeProvider> {
    let (inner, label): (Box<dyn TimeProvider>, &'static str) = match kind {
        TimingSourceKind::System => (Box::new(SoftwareTimeProvider::new()?), "SYSTEM_CLOCK"),
        TimingSourceKind::StartAt(start) => (
            Box::new(FixedTimeProvider::running_from(zone.unix_ms_from_local(start)?)),
            "START_AT",
        ),
        TimingSourceKind::FrozenAt(instant) => (
            Box::new(FixedTimeProvider::frozen(zone.unix_ms_from_local(instant)?)),
            "FROZEN_AT",
        ),
    };

    let correction = ClockCorrection::new(offset_ms);
    let correction_note = (offset_ms != 0)
        .then(|| format!("external clock correction of {offset_ms:+} ms applied"));
    Ok(SelectedTimeProvider {
        provider: Box::new(OffsetTimeProvider::new(inner, correction.clone())),
        label,
        correction,
        correction_note,
    })
}

/// Shared handle to the correction published by an external time-sync
/// collaborator. Cloned into the API so the offset can change at runtime.
#[derive(Clone, Debug, Default)]
pub struct ClockCorrection(Arc<AtomicI64>);

impl ClockCorrection {
    pub fn new(offset_ms: i64) -> Self {
        Self(Arc::new(AtomicI64::new(offset_ms)))
    }

    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.0.store(offset_ms, Ordering::Relaxed);
    }

    pub fn offset_ms(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct FixedTimeProvider {
    anchor_ms: i64,
    started: Option<Instant>,
}

impl FixedTimeProvider {
    pub fn frozen(anchor_ms: i64) -> Self {
        Self {
            anchor_ms,
            started: None,
        }
    }

    pub fn running_from(anchor_ms: i64) -> Self {
        Self {
            anchor_ms,
            started: Some(Instant::now()),
        }
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> Result<TimeSample> {
        let elapsed_ms = self
            .started
            .map(|started| i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Ok(TimeSample {
            unix_ms: self.anchor_ms.saturating_add(elapsed_ms),
            source: if self.started.is_some() { "START_AT" } else { "FROZEN_AT" },
        })
    }

    fn resolution_hint_ms(&self) -> u64 {
        1
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

pub struct OffsetTimeProvider {
    inner: Box<dyn TimeProvider>,
    correction: ClockCorrection,
}

impl OffsetTimeProvider {
    pub fn new(inner: Box<dyn TimeProvider>, correction: ClockCorrection) -> Self {
        Self { inner, correction }
    }
}

impl TimeProvider for OffsetTimeProvider {
    fn now(&self) -> Result<TimeSample> {
        let sample = self.inner.now()?;
        let unix_ms = sample
            .unix_ms
            .checked_add(self.correction.offset_ms())
            .ok_or_else(|| anyhow!("clock correction overflowed"))?;
        Ok(TimeSample {
            unix_ms,
            source: sample.source,
        })
    }

    fn resolution_hint_ms(&self) -> u64 {
        self.inner.resolution_hint_ms()
    }

    fn is_wall_clock(&self) -> bool {
        self.inner.is_wall_clock()
    }
}

pub fn validate_sample(sample: &TimeSample) -> Result<()> {
    if sample.unix_ms < 0 {
        bail!("time sample predates the UNIX epoch: {} ms", sample.unix_ms);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use chrono::{Datelike, NaiveDate, Timelike, Weekday};

    use super::*;

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .expect("date")
            .and_hms_opt(h, min, 0)
            .expect("time")
    }

    #[test]
    fn software_provider_is_monotonic() {
        let provider = SoftwareTimeProvider::new().expect("provider should initialize");
        let first = provider.now().expect("first sample");
        thread::sleep(Duration::from_millis(2));
        let second = provider.now().expect("second sample");
        assert!(second.unix_ms >= first.unix_ms);
        validate_sample(&second).expect("sample should be after the epoch");
    }

    #[test]
    fn named_zone_round_trips_local_time() {
        let zone = ZoneSpec::named("Europe/Prague").expect("known zone");
        let thursday_evening = naive(2026, 10, 15, 20, 0);
        let unix_ms = zone.unix_ms_from_local(thursday_evening).expect("exists");
        let back = zone.local_from_unix_ms(unix_ms).expect("converts");
        assert_eq!(back, thursday_evening);
        assert_eq!(back.weekday(), Weekday::Thu);
        assert_eq!(back.hour() * 60 + back.minute(), 1_200);
    }

    #[test]
    fn nonexistent_local_time_is_rejected() {
        let zone = ZoneSpec::named("Europe/Prague").expect("known zone");
        let err = zone
            .unix_ms_from_local(naive(2026, 3, 29, 2, 30))
            .expect_err("spring-forward gap");
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn frozen_provider_repeats_its_instant() {
        let provider = FixedTimeProvider::frozen(1_700_000_000_000);
        let first = provider.now().expect("sample");
        thread::sleep(Duration::from_millis(2));
        let second = provider.now().expect("sample");
        assert_eq!(first.unix_ms, second.unix_ms);
        assert_eq!(first.source, "FROZEN_AT");
        assert!(!provider.is_wall_clock());
    }

    #[test]
    fn offset_provider_shifts_inner_clock() {
        let inner = Box::new(FixedTimeProvider::frozen(1_700_000_000_000));
        let correction = ClockCorrection::new(1_500);
        let corrected = OffsetTimeProvider::new(inner, correction.clone());
        assert_eq!(corrected.now().expect("sample").unix_ms, 1_700_000_001_500);
        correction.set_offset_ms(-500);
        assert_eq!(corrected.now().expect("sample").unix_ms, 1_699_999_999_500);
    }

    #[test]
    fn selecting_with_offset_reports_correction() {
        let zone = ZoneSpec::named("Europe/Prague").expect("known zone");
        let selected = select_provider(
            TimingSourceKind::FrozenAt(naive(2026, 10, 15, 20, 0)),
            &zone,
            250,
        )
        .expect("selected");
        assert_eq!(selected.label, "FROZEN_AT");
        assert_eq!(selected.correction.offset_ms(), 250);
        assert!(
            selected
                .correction_note
                .as_deref()
                .is_some_and(|note| note.contains("+250 ms"))
        );
    }
}
