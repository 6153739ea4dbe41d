use serde::Deserialize;
use std::time::Duration;

use crate::services::processor::ProcessorSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker binary.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Generative API key
    pub gemini_api_key: String,

    /// Image-capable model identifier
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Generative API base URL (overridable for testing)
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// Public base URL that objects in the bucket are served from
    pub r2_public_url: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum jobs claimed per processor pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between jobs in a batch, to stay under the upstream rate limit
    #[serde(default = "default_inter_job_delay_secs")]
    pub inter_job_delay_secs: u64,

    /// Timeout for image downloads
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Timeout for a single generation call
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Whether the API process also runs the job scheduler
    #[serde(default = "default_run_scheduler")]
    pub run_scheduler: bool,

    /// Jobs left in `processing` longer than this are failed as abandoned
    #[serde(default = "default_stale_job_secs")]
    pub stale_job_secs: u64,

    /// Upper bound on a downloaded input image
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    5
}

fn default_inter_job_delay_secs() -> u64 {
    5
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_generation_timeout_secs() -> u64 {
    120
}

fn default_run_scheduler() -> bool {
    true
}

fn default_stale_job_secs() -> u64 {
    900
}

fn default_max_input_bytes() -> usize {
    20 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the processor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("POLL_INTERVAL_SECS", self.poll_interval_secs == 0),
            ("BATCH_SIZE", self.batch_size == 0),
            ("STALE_JOB_SECS", self.stale_job_secs == 0),
            ("MAX_INPUT_BYTES", self.max_input_bytes == 0),
            ("HTTP_TIMEOUT_SECS", self.http_timeout_secs == 0),
            ("GENERATION_TIMEOUT_SECS", self.generation_timeout_secs == 0),
        ];
        match non_zero.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((field, _)) => Err(ConfigError::Invalid {
                field,
                reason: "must be greater than zero",
            }),
            None => Ok(()),
        }
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            batch_size: self.batch_size,
            inter_job_delay: Duration::from_secs(self.inter_job_delay_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            stale_after: Duration::from_secs(self.stale_job_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> Vec<(String, String)> {
        [
            ("DATABASE_URL", "postgres://localhost/styler"),
            ("GEMINI_API_KEY", "key"),
            ("R2_BUCKET", "style-images"),
            ("R2_ENDPOINT", "https://r2.example.com"),
            ("R2_ACCESS_KEY", "ak"),
            ("R2_SECRET_KEY", "sk"),
            ("R2_PUBLIC_URL", "https://cdn.example.com"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn defaults_match_processor_policy() {
        let config: AppConfig = envy::from_iter(required()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.gemini_model, "gemini-2.5-flash-image");
        assert!(config.run_scheduler);

        let settings = config.processor_settings();
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
        assert_eq!(settings.inter_job_delay, Duration::from_secs(5));
        assert_eq!(settings.stale_after, Duration::from_secs(900));
        assert_eq!(config.max_input_bytes, 20 * 1024 * 1024);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn zero_poll_interval_or_batch_size_is_rejected() {
        for key in ["POLL_INTERVAL_SECS", "BATCH_SIZE", "STALE_JOB_SECS"] {
            let mut vars = required();
            vars.push((key.into(), "0".into()));
            let config: AppConfig = envy::from_iter(vars).unwrap();

            let err = tokio_test::assert_err!(config.validate());
            assert!(
                matches!(err, ConfigError::Invalid { field, .. } if field == key),
                "{key}: {err}"
            );
        }
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = required();
        vars.push(("BATCH_SIZE".into(), "2".into()));
        vars.push(("RUN_SCHEDULER".into(), "false".into()));
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.batch_size, 2);
        assert!(!config.run_scheduler);
    }

    #[test]
    fn missing_credentials_fail() {
        let vars = vec![("DATABASE_URL".to_string(), "postgres://x".to_string())];
        assert!(envy::from_iter::<_, AppConfig>(vars).is_err());
    }
}
