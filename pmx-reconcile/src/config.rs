//! pmx-reconcile configuration
//!
//! Loaded from TOML (`reconcile.toml`), see
//! [`pmx_common::config::resolve_config_path`] for the lookup order. Every
//! field has a default so a partial or absent file is valid.

use chrono::Duration;
use pmx_common::config::{load_toml_or_default, resolve_config_path, LoggingConfig};
use pmx_common::Error;
use serde::Deserialize;
use std::path::Path;

/// Default config file name inside `<config_dir>/pmx/`
pub const CONFIG_FILE_NAME: &str = "reconcile.toml";

/// Complete configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub merge: MergeConfig,
}

impl ReconcilerConfig {
    /// Resolve and load the config file (CLI → env → user config dir → defaults)
    pub fn load(cli_path: Option<&Path>) -> pmx_common::Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_FILE_NAME);
        let config: Self = load_toml_or_default(path.as_deref())?;
        config.merge.validate()?;
        Ok(config)
    }
}

/// Batch runner settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchConfig {
    /// Concurrent reconciliations (0 = number of CPUs)
    #[serde(default)]
    pub workers: usize,
}

impl BatchConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

/// Tolerances and policies of the merge steps
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Clustering tolerance for aware metadata candidates
    pub aware_tolerance_secs: i64,
    /// Clustering tolerance for naive metadata candidates
    pub naive_tolerance_secs: i64,
    /// Clustering tolerance for filename-derived candidates
    pub filename_tolerance_secs: i64,
    /// Last-resort re-clustering of irreconcilable naive candidates
    pub loose_tolerance_secs: i64,
    /// Clustering tolerance for GPS timestamps
    pub gps_datetime_tolerance_secs: i64,
    /// Absolute tolerance for coordinates, degrees
    pub gps_tolerance_deg: f64,
    /// Naive candidate vs. aware primary validation window
    pub naive_validation_secs: i64,
    /// Stated offset accepted when this close to the GPS timezone offset
    pub gps_offset_tolerance_secs: i64,
    /// Inferred offsets further than this from a 30-minute boundary are rejected
    pub offset_snap_tolerance_secs: i64,
    /// UTC/local pairing tolerance for two naive candidates
    pub utc_local_heuristic_secs: i64,
    /// Accept a cloud "taken" value over nearby EXIF/XMP values (assumes a deliberate edit)
    pub trust_cloud_edits: bool,
    pub cloud_edit_window_hours: i64,
    /// Filename-only candidates within this window of the primary skip validation
    pub filename_window_hours: i64,
    /// WhatsApp filename date overrides embedded dates further off than this
    pub whatsapp_threshold_days: i64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            aware_tolerance_secs: 2,
            naive_tolerance_secs: 20,
            filename_tolerance_secs: 60,
            loose_tolerance_secs: 3660,
            gps_datetime_tolerance_secs: 2,
            gps_tolerance_deg: 1e-6,
            naive_validation_secs: 60,
            gps_offset_tolerance_secs: 2 * 3600,
            offset_snap_tolerance_secs: 60,
            utc_local_heuristic_secs: 5,
            trust_cloud_edits: true,
            cloud_edit_window_hours: 24,
            filename_window_hours: 24,
            whatsapp_threshold_days: 4,
        }
    }
}

/// Upper bound for every window, one leap year
const MAX_WINDOW_DAYS: i64 = 366;

impl MergeConfig {
    /// Reject negative or absurdly large windows
    pub fn validate(&self) -> pmx_common::Result<()> {
        let max_secs = MAX_WINDOW_DAYS * 24 * 3600;
        let windows = [
            ("aware_tolerance_secs", self.aware_tolerance_secs, max_secs),
            ("naive_tolerance_secs", self.naive_tolerance_secs, max_secs),
            ("filename_tolerance_secs", self.filename_tolerance_secs, max_secs),
            ("loose_tolerance_secs", self.loose_tolerance_secs, max_secs),
            ("gps_datetime_tolerance_secs", self.gps_datetime_tolerance_secs, max_secs),
            ("naive_validation_secs", self.naive_validation_secs, max_secs),
            ("gps_offset_tolerance_secs", self.gps_offset_tolerance_secs, max_secs),
            ("offset_snap_tolerance_secs", self.offset_snap_tolerance_secs, max_secs),
            ("utc_local_heuristic_secs", self.utc_local_heuristic_secs, max_secs),
            ("cloud_edit_window_hours", self.cloud_edit_window_hours, MAX_WINDOW_DAYS * 24),
            ("filename_window_hours", self.filename_window_hours, MAX_WINDOW_DAYS * 24),
            ("whatsapp_threshold_days", self.whatsapp_threshold_days, MAX_WINDOW_DAYS),
        ];
        for (name, value, max) in windows {
            if !(0..=max).contains(&value) {
                return Err(Error::Config(format!(
                    "merge.{} = {} is outside 0..={}",
                    name, value, max
                )));
            }
        }
        if !self.gps_tolerance_deg.is_finite() || !(0.0..=1.0).contains(&self.gps_tolerance_deg) {
            return Err(Error::Config(format!(
                "merge.gps_tolerance_deg = {} is outside 0..=1",
                self.gps_tolerance_deg
            )));
        }
        Ok(())
    }

    pub fn aware_tolerance(&self) -> Duration {
        Duration::seconds(self.aware_tolerance_secs)
    }

    pub fn naive_tolerance(&self) -> Duration {
        Duration::seconds(self.naive_tolerance_secs)
    }

    pub fn filename_tolerance(&self) -> Duration {
        Duration::seconds(self.filename_tolerance_secs)
    }

    pub fn loose_tolerance(&self) -> Duration {
        Duration::seconds(self.loose_tolerance_secs)
    }

    pub fn gps_datetime_tolerance(&self) -> Duration {
        Duration::seconds(self.gps_datetime_tolerance_secs)
    }

    pub fn naive_validation(&self) -> Duration {
        Duration::seconds(self.naive_validation_secs)
    }

    pub fn utc_local_heuristic(&self) -> Duration {
        Duration::seconds(self.utc_local_heuristic_secs)
    }

    pub fn cloud_edit_window(&self) -> Duration {
        Duration::hours(self.cloud_edit_window_hours)
    }

    pub fn filename_window(&self) -> Duration {
        Duration::hours(self.filename_window_hours)
    }

    pub fn whatsapp_threshold(&self) -> Duration {
        Duration::days(self.whatsapp_threshold_days)
    }
}
