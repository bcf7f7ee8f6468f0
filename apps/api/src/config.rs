use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::form::stats::EmptyValuePolicy;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,

    /// Storage key of the petition form template (AcroForm PDF or JSON schema).
    pub form_template_key: String,
    pub min_extracted_chars: usize,
    pub extraction_timeout: Duration,
    pub analysis_timeout: Duration,
    pub value_generation_timeout: Duration,

    pub template_cache_ttl: Duration,
    pub document_cache_ttl: Duration,
    pub analysis_cache_ttl: Duration,
    pub preview_cache_ttl: Duration,
    pub cache_sweep_interval: Duration,

    /// Upper bound on how long a crashed run can hold the fill lock.
    pub fill_lock_ttl: Duration,
    pub empty_value_policy: EmptyValuePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),

            form_template_key: std::env::var("FORM_TEMPLATE_KEY")
                .unwrap_or_else(|_| "templates/i-129.pdf".to_string()),
            min_extracted_chars: env_or("MIN_EXTRACTED_CHARS", 50usize)?,
            extraction_timeout: secs_or("EXTRACTION_TIMEOUT_SECS", 30)?,
            analysis_timeout: secs_or("ANALYSIS_TIMEOUT_SECS", 90)?,
            value_generation_timeout: secs_or("VALUE_GENERATION_TIMEOUT_SECS", 180)?,

            template_cache_ttl: secs_or("TEMPLATE_CACHE_TTL_SECS", 3600)?,
            document_cache_ttl: secs_or("DOCUMENT_CACHE_TTL_SECS", 600)?,
            analysis_cache_ttl: secs_or("ANALYSIS_CACHE_TTL_SECS", 1800)?,
            preview_cache_ttl: secs_or("PREVIEW_CACHE_TTL_SECS", 120)?,
            cache_sweep_interval: secs_or("CACHE_SWEEP_INTERVAL_SECS", 60)?,

            fill_lock_ttl: secs_or("FILL_LOCK_TTL_SECS", 900)?,
            empty_value_policy: env_or("EMPTY_VALUE_POLICY", EmptyValuePolicy::Neither)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn secs_or(key: &str, default: u64) -> Result<Duration> {
    positive_secs(key, env_or(key, default)?)
}

/// Timeouts, TTLs and intervals must be at least one second.
fn positive_secs(key: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        bail!("Environment variable '{key}' must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_is_rejected() {
        let err = positive_secs("CACHE_SWEEP_INTERVAL_SECS", 0).unwrap_err();
        assert!(err.to_string().contains("CACHE_SWEEP_INTERVAL_SECS"));
        assert!(positive_secs("FILL_LOCK_TTL_SECS", 0).is_err());
    }

    #[test]
    fn test_positive_duration_is_seconds() {
        assert_eq!(
            positive_secs("FILL_LOCK_TTL_SECS", 900).unwrap(),
            Duration::from_secs(900)
        );
    }
}
