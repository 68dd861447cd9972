use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::executor::RetryPolicy;
use crate::records::parse_seasons;
use crate::store;

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_TIMEOUT_SECS: f64 = 45.0;
const DEFAULT_RATE_LIMIT_MIN: f64 = 3.0;
const DEFAULT_RATE_LIMIT_MAX: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub max_retries: u32,
    pub base_timeout: Duration,
    pub rate_limit_min: f64,
    pub rate_limit_max: f64,
    /// Extra sleep after a timeout-class unit failure; `None` disables it.
    pub cool_off_on_timeout: Option<Duration>,
    pub seasons: Vec<String>,
    pub refresh_player_meta: bool,
    pub db_path: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Unparsable or
    /// out-of-range values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_retries = lookup("API_MAX_RETRIES")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| *v >= 1)
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let base_timeout_secs = positive_f64(lookup("API_BASE_TIMEOUT"))
            .unwrap_or(DEFAULT_BASE_TIMEOUT_SECS);

        let mut rate_limit_min = non_negative_f64(lookup("API_RATE_LIMIT_MIN"))
            .unwrap_or(DEFAULT_RATE_LIMIT_MIN);
        let mut rate_limit_max = non_negative_f64(lookup("API_RATE_LIMIT_MAX"))
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX);
        if rate_limit_max < rate_limit_min {
            std::mem::swap(&mut rate_limit_min, &mut rate_limit_max);
        }

        let cool_off_on_timeout = positive_f64(lookup("API_COOL_OFF_ON_TIMEOUT"))
            .map(Duration::from_secs_f64);
        let seasons = parse_seasons(lookup("API_SEASONS").as_deref());
        let refresh_player_meta = lookup("API_REFRESH_PLAYER_META")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);
        let db_path = lookup("HOOPS_DB_PATH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(store::default_db_path);

        Self {
            max_retries,
            base_timeout: Duration::from_secs_f64(base_timeout_secs),
            rate_limit_min,
            rate_limit_max,
            cool_off_on_timeout,
            seasons,
            refresh_player_meta,
            db_path,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_pacing(
            self.max_retries,
            self.base_timeout,
            self.rate_limit_min,
            self.rate_limit_max,
        )
    }
}

fn positive_f64(raw: Option<String>) -> Option<f64> {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn non_negative_f64(raw: Option<String>) -> Option<f64> {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
