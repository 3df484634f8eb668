use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::model::{DAY_MS, HOUR_MS, Ms};

/// What the policy check does when its store cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraFailureMode {
    /// Allow the booking. Under-enforcing the caps beats blocking all bookings.
    FailOpen,
    /// Deny the booking.
    FailClosed,
}

/// Booking policy thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Pending + confirmed reservations a customer may hold at once.
    pub max_active_reservations: u32,
    /// Cancelling closer than this to the start records a late cancellation.
    pub penalty_window: Ms,
    /// No-show records that trigger a suspension.
    pub no_show_threshold: u32,
    pub suspension_duration: Ms,
    pub on_infra_failure: InfraFailureMode,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_active_reservations: 3,
            penalty_window: 4 * HOUR_MS,
            no_show_threshold: 3,
            suspension_duration: 7 * DAY_MS,
            on_infra_failure: InfraFailureMode::FailOpen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub policy: PolicyConfig,
    /// Offset of venue wall-clock time from UTC.
    pub utc_offset: FixedOffset,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            utc_offset: brasilia_offset(),
        }
    }
}

/// UTC-3, where the venues operate.
pub fn brasilia_offset() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Daemon configuration, read from `BEACHSPOT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends between compactions; 0 disables compaction.
    pub compact_threshold: u64,
    pub sweep_interval: Duration,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable, zero or negative policy
    /// values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse().ok())
        }
        fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u32> {
            parsed::<u32>(lookup, key).filter(|&n| n > 0)
        }
        fn span(lookup: &impl Fn(&str) -> Option<String>, key: &str, unit: Ms) -> Option<Ms> {
            positive(lookup, key).and_then(|n| i64::from(n).checked_mul(unit))
        }

        let defaults = PolicyConfig::default();
        let policy = PolicyConfig {
            max_active_reservations: positive(&lookup, "BEACHSPOT_MAX_ACTIVE")
                .unwrap_or(defaults.max_active_reservations),
            penalty_window: span(&lookup, "BEACHSPOT_PENALTY_WINDOW_HOURS", HOUR_MS)
                .unwrap_or(defaults.penalty_window),
            no_show_threshold: positive(&lookup, "BEACHSPOT_NO_SHOW_THRESHOLD")
                .unwrap_or(defaults.no_show_threshold),
            suspension_duration: span(&lookup, "BEACHSPOT_SUSPENSION_DAYS", DAY_MS)
                .unwrap_or(defaults.suspension_duration),
            on_infra_failure: match parsed::<bool>(&lookup, "BEACHSPOT_FAIL_CLOSED") {
                Some(true) => InfraFailureMode::FailClosed,
                _ => InfraFailureMode::FailOpen,
            },
        };

        let utc_offset = parsed::<i32>(&lookup, "BEACHSPOT_UTC_OFFSET_MINUTES")
            .and_then(|mins| FixedOffset::east_opt(mins * 60))
            .unwrap_or_else(brasilia_offset);

        Self {
            data_dir: lookup("BEACHSPOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            metrics_port: parsed(&lookup, "BEACHSPOT_METRICS_PORT"),
            compact_threshold: parsed(&lookup, "BEACHSPOT_COMPACT_THRESHOLD").unwrap_or(1000),
            sweep_interval: Duration::from_secs(
                parsed(&lookup, "BEACHSPOT_SWEEP_INTERVAL_SECS").unwrap_or(60),
            ),
            engine: EngineConfig { policy, utc_offset },
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("beachspot.wal")
    }
}
