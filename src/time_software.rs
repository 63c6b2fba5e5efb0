use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::time_provider::{TimeProvider, TimeSample, validate_sample};

const SYNC_INTERVAL_MS: i64 = 1_000;
const HARD_RESYNC_THRESHOLD_MS: i64 = 2_000;
const MAX_SLEW_MS_PER_SECOND: i64 = 40;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum SyncAdjustment {
    None,
    Slew(i64),
    Resync(i64),
}

/// Wall clock anchored to a monotonic instant. Small drift against the system
/// clock is slewed in gradually; large jumps (suspend, manual clock change)
/// are applied at once. Output never goes backwards except across such a
/// resync, which moves it straight to the corrected estimate.
pub struct SoftwareTimeProvider {
    wall_anchor_ms: i64,
    monotonic_anchor: Instant,
    correction_ms: AtomicI64,
    last_sync_elapsed_ms: AtomicI64,
    last_output_ms: Mutex<i64>,
}

impl SoftwareTimeProvider {
    pub fn new() -> Result<Self> {
        Ok(Self::anchored(system_time_to_ms(SystemTime::now())?))
    }

    fn anchored(wall_anchor_ms: i64) -> Self {
        Self {
            wall_anchor_ms,
            monotonic_anchor: Instant::now(),
            correction_ms: AtomicI64::new(0),
            last_sync_elapsed_ms: AtomicI64::new(0),
            last_output_ms: Mutex::new(wall_anchor_ms),
        }
    }

    fn maybe_update_sync_correction(
        &self,
        elapsed_ms: i64,
        estimated_now_ms: i64,
    ) -> Result<SyncAdjustment> {
        let previous_sync_elapsed = self.last_sync_elapsed_ms.load(Ordering::Relaxed);
        let delta_since_sync_ms = elapsed_ms.saturating_sub(previous_sync_elapsed);
        if delta_since_sync_ms < SYNC_INTERVAL_MS {
            return Ok(SyncAdjustment::None);
        }

        if self
            .last_sync_elapsed_ms
            .compare_exchange(
                previous_sync_elapsed,
                elapsed_ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return Ok(SyncAdjustment::None);
        }

        let wall_now_ms = system_time_to_ms(SystemTime::now())?;
        let error_ms = wall_now_ms - estimated_now_ms;
        let adjustment = if error_ms.abs() >= HARD_RESYNC_THRESHOLD_MS {
            debug!(error_ms, "system clock jumped, resyncing");
            SyncAdjustment::Resync(error_ms)
        } else {
            let max_step_ms = (MAX_SLEW_MS_PER_SECOND * delta_since_sync_ms) / 1_000;
            match ((error_ms * 25) / 100).clamp(-max_step_ms, max_step_ms) {
                0 => SyncAdjustment::None,
                step_ms => SyncAdjustment::Slew(step_ms),
            }
        };
        if let SyncAdjustment::Slew(delta_ms) | SyncAdjustment::Resync(delta_ms) = adjustment {
            self.correction_ms.fetch_add(delta_ms, Ordering::Relaxed);
        }
        Ok(adjustment)
    }

    fn clamp_output_monotonic(&self, proposed_ms: i64) -> Result<i64> {
        let mut guard = self.lock_last_output()?;
        if proposed_ms < *guard {
            return Ok(*guard);
        }
        *guard = proposed_ms;
        Ok(proposed_ms)
    }

    fn reset_output(&self, now_ms: i64) -> Result<i64> {
        *self.lock_last_output()? = now_ms;
        Ok(now_ms)
    }

    fn lock_last_output(&self) -> Result<MutexGuard<'_, i64>> {
        self.last_output_ms
            .lock()
            .map_err(|_| anyhow!("failed to lock software clock monotonic state"))
    }
}

impl TimeProvider for SoftwareTimeProvider {
    fn now(&self) -> Result<TimeSample> {
        let elapsed_ms =
            i64::try_from(self.monotonic_anchor.elapsed().as_millis()).unwrap_or(i64::MAX);
        let correction_ms = self.correction_ms.load(Ordering::Relaxed);
        let estimated_now_ms = self.wall_anchor_ms + elapsed_ms + correction_ms;
        let now_ms = match self.maybe_update_sync_correction(elapsed_ms, estimated_now_ms)? {
            SyncAdjustment::None => self.clamp_output_monotonic(estimated_now_ms)?,
            SyncAdjustment::Slew(delta_ms) => {
                self.clamp_output_monotonic(estimated_now_ms + delta_ms)?
            }
            SyncAdjustment::Resync(delta_ms) => self.reset_output(estimated_now_ms + delta_ms)?,
        };

        let sample = TimeSample {
            unix_ms: now_ms,
            source: "SYSTEM_CLOCK",
        };
        validate_sample(&sample)?;
        Ok(sample)
    }

    fn resolution_hint_ms(&self) -> u64 {
        1
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

fn system_time_to_ms(system_time: SystemTime) -> Result<i64> {
    let duration = system_time
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?;
    i64::try_from(duration.as_millis()).context("system clock is out of range")
}
