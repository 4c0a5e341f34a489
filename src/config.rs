//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Wizard engine configuration.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Base URL of the onboarding backend (no trailing slash).
    pub backend_url: String,
    /// Optional bearer token sent with every backend request.
    pub api_token: Option<SecretString>,
    /// Path of the local snapshot database.
    pub db_path: String,
    /// Quiet period before a form mutation is written to the store.
    pub autosave_delay: Duration,
    /// Snapshots older than this are discarded at load time.
    pub snapshot_ttl: Duration,
    /// Time before another OTP may be requested.
    pub otp_resend_cooldown: Duration,
    /// Upper bound for every backend call.
    pub request_timeout: Duration,
    /// Minimum PAN name-match score (inclusive, out of 100).
    pub pan_match_threshold: u8,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000/api".to_string(),
            api_token: None,
            db_path: "./data/kyc-wizard.db".to_string(),
            autosave_delay: Duration::from_millis(50),
            snapshot_ttl: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            otp_resend_cooldown: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
            pan_match_threshold: 80,
        }
    }
}

impl WizardConfig {
    /// Build config from `KYC_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend_url = lookup("KYC_BACKEND_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or(defaults.backend_url);

        let api_token = lookup("KYC_API_TOKEN")
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let db_path = lookup("KYC_DB_PATH").unwrap_or(defaults.db_path);

        let autosave_delay = parse_or(&lookup, "KYC_AUTOSAVE_DELAY_MS", defaults.autosave_delay, |v| {
            v.parse().ok().map(Duration::from_millis)
        })?;

        let snapshot_ttl = parse_or(&lookup, "KYC_SNAPSHOT_TTL_DAYS", defaults.snapshot_ttl, |v| {
            v.parse::<u64>()
                .ok()
                .map(|days| Duration::from_secs(days * 24 * 60 * 60))
        })?;

        let otp_resend_cooldown = parse_or(
            &lookup,
            "KYC_OTP_COOLDOWN_SECS",
            defaults.otp_resend_cooldown,
            |v| v.parse().ok().map(Duration::from_secs),
        )?;

        let request_timeout = parse_or(
            &lookup,
            "KYC_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout,
            |v| v.parse().ok().map(Duration::from_secs),
        )?;

        let pan_match_threshold = parse_or(
            &lookup,
            "KYC_PAN_MATCH_THRESHOLD",
            defaults.pan_match_threshold,
            |v| v.parse::<u8>().ok().filter(|n| *n <= 100),
        )?;

        Ok(Self {
            backend_url,
            api_token,
            db_path,
            autosave_delay,
            snapshot_ttl,
            otp_resend_cooldown,
            request_timeout,
            pan_match_threshold,
        })
    }
}

fn parse_or<T, L, P>(lookup: &L, key: &str, default: T, parse: P) -> Result<T, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => parse(raw.trim()).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {raw:?}"),
        }),
    }
}
