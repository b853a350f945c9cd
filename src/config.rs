//! Environment configuration
//!
//! Values come from the process environment (after loading `.env`).
//! Required values and unparsable numbers are errors; everything else
//! falls back to the defaults of the component it configures.

use crate::error::DigestError;
use crate::gemini::DEFAULT_MODEL;
use crate::messaging::fetcher::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::messaging::strategy::DEFAULT_RECENT_WINDOW_DAYS;
use crate::messaging::{FetchLimits, StrategyConfig};
use crate::summary::{RetryPolicy, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_RETRIES};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REPORTS_DIR: &str = "reports";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub messaging_base_url: String,
    pub messaging_token: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub fetch: FetchLimits,
    pub strategy: StrategyConfig,
    pub retry: RetryPolicy,
    pub reports_dir: PathBuf,
    pub port: u16,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> crate::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| DigestError::Config(format!("{} is not set", key)))
        };
        let parsed = |key: &str| -> crate::Result<Option<u64>> {
            get(key).map(|v| parse_number::<u64>(key, &v)).transpose()
        };

        let messaging_base_url = required("MESSAGING_API_BASE_URL")?;
        if !messaging_base_url.starts_with("http://") && !messaging_base_url.starts_with("https://") {
            return Err(DigestError::Config(format!(
                "MESSAGING_API_BASE_URL must be an http(s) URL, got {}",
                messaging_base_url
            )));
        }

        let page_size = parsed("PAGE_SIZE")?.unwrap_or(DEFAULT_PAGE_SIZE as u64);
        let max_pages = parsed("MAX_PAGES")?.unwrap_or(DEFAULT_MAX_PAGES as u64);
        if page_size == 0 || max_pages == 0 {
            return Err(DigestError::Config(
                "PAGE_SIZE and MAX_PAGES must be positive".to_string(),
            ));
        }

        let recent_window_days = match get("RECENT_WINDOW_DAYS") {
            Some(v) => parse_number::<i64>("RECENT_WINDOW_DAYS", &v)?,
            None => DEFAULT_RECENT_WINDOW_DAYS,
        };
        if recent_window_days < 0 {
            return Err(DigestError::Config(format!(
                "RECENT_WINDOW_DAYS must not be negative, got {}",
                recent_window_days
            )));
        }

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(v) => parse_number::<u16>("PORT", &v)?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            messaging_base_url,
            messaging_token: required("MESSAGING_API_TOKEN")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            fetch: FetchLimits {
                page_size: clamp_u32(page_size),
                max_pages: clamp_u32(max_pages),
            },
            strategy: StrategyConfig { recent_window_days },
            retry: RetryPolicy {
                max_retries: parsed("SUMMARY_MAX_RETRIES")?
                    .map(clamp_u32)
                    .unwrap_or(DEFAULT_MAX_RETRIES),
                initial_backoff: Duration::from_millis(
                    parsed("SUMMARY_INITIAL_BACKOFF_MS")?.unwrap_or(DEFAULT_INITIAL_BACKOFF_MS),
                ),
            },
            reports_dir: PathBuf::from(
                get("REPORTS_DIR").unwrap_or_else(|| DEFAULT_REPORTS_DIR.to_string()),
            ),
            port,
        })
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> crate::Result<T> {
    value
        .parse()
        .map_err(|_| DigestError::Config(format!("{} must be a number, got {:?}", key, value)))
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("MESSAGING_API_BASE_URL", "https://chat.example.com/v1"),
        ("MESSAGING_API_TOKEN", "token"),
        ("GEMINI_API_KEY", "key"),
    ];

    #[test]
    fn test_defaults_apply() {
        let config = AppConfig::from_lookup(env(&REQUIRED)).unwrap();

        assert_eq!(config.fetch, FetchLimits::default());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.strategy, StrategyConfig::default());
        assert_eq!(config.gemini_model, DEFAULT_MODEL);
        assert_eq!(config.port, 8080);
        assert_eq!(config.reports_dir, PathBuf::from("reports"));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("MAX_PAGES", "5"),
            ("PAGE_SIZE", "50"),
            ("SUMMARY_MAX_RETRIES", "1"),
            ("SUMMARY_INITIAL_BACKOFF_MS", "10"),
            ("API_PORT", "9000"),
        ]);

        let config = AppConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.fetch.max_pages, 5);
        assert_eq!(config.fetch.page_size, 50);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(10));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_missing_required_value_names_variable() {
        let err = AppConfig::from_lookup(env(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_PAGES", "lots"));
        let err = AppConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("MAX_PAGES"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("PAGE_SIZE", "0"));
        assert!(AppConfig::from_lookup(env(&pairs)).is_err());
    }

    #[test]
    fn test_recent_window_days_range() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RECENT_WINDOW_DAYS", "7"));
        let config = AppConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.strategy.recent_window_days, 7);

        // Larger than i64::MAX: must not wrap around to a negative threshold
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RECENT_WINDOW_DAYS", "18446744073709551615"));
        let err = AppConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("RECENT_WINDOW_DAYS"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RECENT_WINDOW_DAYS", "-1"));
        assert!(AppConfig::from_lookup(env(&pairs)).is_err());
    }
}
