//! Notifier configuration.
//!
//! [`NoticeConfig`] can be built in code, deserialized from any serde source,
//! or loaded from a file with environment overrides through
//! [`NoticeConfig::load`].
//!
//! ```yaml
//! application_name: orders
//! profiles: [prod]
//! interval: 1h
//! threshold: 5
//! aggregation_interval: 60s
//! ignored_profiles: [dev, test]
//! webhook:
//!   url: https://chat.example.com/robot/send?access_token=...
//! mail:
//!   to: [oncall@example.com]
//! ```

use crate::application::registry::DEFAULT_MAX_SIGNATURES;
use crate::domain::throttle::ThrottlePolicy;
use crate::error::{BuildError, ConfigError};
use crate::infrastructure::channels::{MailSettings, WebhookSettings};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variables overriding file values, e.g.
/// `NOTICE__THRESHOLD=10`.
pub const ENV_PREFIX: &str = "NOTICE";

/// Throttle, delivery and channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeConfig {
    /// Application name stamped onto notices.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Active deployment profiles.
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Length of a throttle window.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Occurrences inside one window that force a notification.
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Period of the aggregation drain.
    #[serde(default = "default_aggregation_interval", with = "humantime_serde")]
    pub aggregation_interval: Duration,

    /// Cap on tracked signatures.
    #[serde(default = "default_max_signatures")]
    pub max_signatures: usize,

    /// Profiles in which submissions are ignored.
    #[serde(default)]
    pub ignored_profiles: BTreeSet<String>,

    /// Delivery worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delivery tasks that may wait before the oldest is discarded.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Chat robot webhook settings.
    #[serde(default)]
    pub webhook: Option<WebhookSettings>,

    /// Mail settings.
    #[serde(default)]
    pub mail: Option<MailSettings>,
}

fn default_application_name() -> String {
    "application".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_threshold() -> u32 {
    5
}

fn default_aggregation_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_signatures() -> usize {
    DEFAULT_MAX_SIGNATURES
}

fn default_workers() -> usize {
    5
}

fn default_queue_capacity() -> usize {
    1_000
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            profiles: Vec::new(),
            interval: default_interval(),
            threshold: default_threshold(),
            aggregation_interval: default_aggregation_interval(),
            max_signatures: default_max_signatures(),
            ignored_profiles: BTreeSet::new(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            webhook: None,
            mail: None,
        }
    }
}

impl NoticeConfig {
    /// Load from a YAML, TOML or JSON file, chosen by extension, then apply
    /// `NOTICE__*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let parsed: NoticeConfig = config.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Check every value is usable.
    pub fn validate(&self) -> Result<(), BuildError> {
        self.policy()?;
        if self.aggregation_interval.is_zero() {
            return Err(BuildError::ZeroAggregationInterval);
        }
        if self.max_signatures == 0 {
            return Err(BuildError::ZeroMaxSignatures);
        }
        if self.workers == 0 {
            return Err(BuildError::ZeroWorkers);
        }
        if self.queue_capacity == 0 {
            return Err(BuildError::ZeroQueueCapacity);
        }
        Ok(())
    }

    /// Interval and threshold as a validated policy.
    pub fn policy(&self) -> Result<ThrottlePolicy, BuildError> {
        ThrottlePolicy::new(self.interval, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = NoticeConfig::default();
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert_eq!(config.threshold, 5);
        assert_eq!(config.aggregation_interval, Duration::from_secs(60));
        assert_eq!(config.max_signatures, 10_000);
        assert_eq!(config.workers, 5);
        assert_eq!(config.queue_capacity, 1_000);
        assert!(config.ignored_profiles.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml() {
        let file = write(
            ".yaml",
            "application_name: orders\n\
             profiles: [prod]\n\
             interval: 30m\n\
             threshold: 3\n\
             aggregation_interval: 15s\n\
             ignored_profiles: [dev]\n\
             mail:\n  to: [oncall@example.com]\n",
        );

        let config = NoticeConfig::load(file.path()).unwrap();
        assert_eq!(config.application_name, "orders");
        assert_eq!(config.profiles, vec!["prod".to_string()]);
        assert_eq!(config.interval, Duration::from_secs(30 * 60));
        assert_eq!(config.threshold, 3);
        assert_eq!(config.aggregation_interval, Duration::from_secs(15));
        assert!(config.ignored_profiles.contains("dev"));
        assert_eq!(config.max_signatures, 10_000);
        assert_eq!(
            config.mail.unwrap().to,
            vec!["oncall@example.com".to_string()]
        );
        assert!(config.webhook.is_none());
    }

    #[test]
    fn test_load_toml() {
        let file = write(".toml", "threshold = 8\ninterval = \"2h\"\n");

        let config = NoticeConfig::load(file.path()).unwrap();
        assert_eq!(config.threshold, 8);
        assert_eq!(config.interval, Duration::from_secs(7200));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = write(".yaml", "threshold: 0\n");

        let err = NoticeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(BuildError::ZeroThreshold)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = NoticeConfig::load("/nonexistent/notice.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_validate() {
        let config = NoticeConfig {
            workers: 0,
            ..NoticeConfig::default()
        };
        assert_eq!(config.validate(), Err(BuildError::ZeroWorkers));

        let config = NoticeConfig {
            aggregation_interval: Duration::ZERO,
            ..NoticeConfig::default()
        };
        assert_eq!(config.validate(), Err(BuildError::ZeroAggregationInterval));
    }

    #[test]
    fn test_json_round_trip_uses_humantime() {
        let json = serde_json::to_value(NoticeConfig::default()).unwrap();
        assert_eq!(json["interval"], "1h");
        assert_eq!(json["aggregation_interval"], "1m");
    }
}
