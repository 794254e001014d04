use std::env;
use std::str::FromStr;

use crate::cutoff::CutoffZone;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub worker: WorkerConfig,
    pub reaper: ReaperConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    /// Upper bound the scheduler places on a single invocation.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Six-field cron expression, evaluated in UTC by the scheduler.
    pub cron: String,
    pub timezone: CutoffZone,
    /// Maximum deletes per atomic batch; 0 commits everything in one batch.
    pub max_batch_size: usize,
    pub run_on_start: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            is_leader: true,
            timeout_secs: 300,
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 0 * * *".to_string(),
            timezone: CutoffZone::Local,
            max_batch_size: 500,
            run_on_start: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let worker_defaults = WorkerConfig::default();
        let reaper_defaults = ReaperConfig::default();

        Self {
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/bookings.sled"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", worker_defaults.is_leader),
                timeout_secs: env_or_parse("WORKER_TIMEOUT_SECS", worker_defaults.timeout_secs),
            },
            reaper: ReaperConfig {
                cron: env_or("BOOKING_REAPER_CRON", &reaper_defaults.cron),
                timezone: env_or_parse("BOOKING_REAPER_TIMEZONE", reaper_defaults.timezone),
                max_batch_size: env_or_parse(
                    "BOOKING_REAPER_MAX_BATCH",
                    reaper_defaults.max_batch_size,
                ),
                run_on_start: env_or_bool(
                    "BOOKING_REAPER_RUN_ON_START",
                    reaper_defaults.run_on_start,
                ),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
