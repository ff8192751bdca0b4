use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::batch::BatchOptions;
use crate::session::{RetryPolicy, Session};
use crate::transport::{DEFAULT_USER_AGENT, NetworkError};
use crate::types::{Credential, FilterContext, TargetEntity};

pub const IDENTIFIER_ENV: &str = "SMP_EMIS_CODE";
pub const SECRET_ENV: &str = "SMP_PASSWORD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub pause_ms: u64,
    pub workers: usize,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            base_url: crate::DEFAULT_PORTAL_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            retry_attempts: 3,
            retry_delay_secs: 2,
            pause_ms: 500,
            workers: 1,
        }
    }
}

impl PortalSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            pause: Duration::from_millis(self.pause_ms),
            workers: self.workers,
        }
    }

    pub fn open_session(&self) -> Result<Session, NetworkError> {
        Session::new(
            &self.base_url,
            &self.user_agent,
            Duration::from_secs(self.timeout_secs),
            self.retry_policy(),
        )
    }
}

/// Everything one run needs: where the portal is, who logs in, which
/// jurisdiction to query and which facilities to visit, in order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub portal: PortalSettings,
    pub credential: Credential,
    pub filter: FilterContext,
    #[serde(default)]
    pub targets: Vec<TargetEntity>,
}

impl PortalConfig {
    /// Reads `path`, applies `SMP_EMIS_CODE` / `SMP_PASSWORD` and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());

        Self::from_toml_str(&raw)?
            .with_overrides(
                std::env::var(IDENTIFIER_ENV).ok(),
                std::env::var(SECRET_ENV).ok(),
            )
            .validate()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn with_overrides(mut self, identifier: Option<String>, secret: Option<String>) -> Self {
        if let Some(identifier) = identifier.filter(|v| !v.trim().is_empty()) {
            self.credential.identifier = identifier;
        }
        if let Some(secret) = secret {
            self.credential.secret = secret;
        }
        self
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.credential.identifier.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "credential.identifier must not be empty".to_string(),
            ));
        }
        if self.portal.workers == 0 {
            return Err(ConfigError::Invalid(
                "portal.workers must be greater than 0".to_string(),
            ));
        }
        if self.portal.retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "portal.retry_attempts must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.targets.iter().find(|t| !seen.insert(t.id.as_str())) {
            return Err(ConfigError::Invalid(format!(
                "target {} is listed more than once",
                dup.id
            )));
        }

        Ok(self)
    }

    pub fn target(&self, id: &str) -> Option<&TargetEntity> {
        self.targets.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [portal]
        base_url = "https://portal.test"
        pause_ms = 0

        [credential]
        identifier = "3210390175935"
        secret = "12345678"

        [filter]
        district = "7"
        tehsil = "124"
        markaz = "5218"

        [[targets]]
        id = "32120163"
        name = "GPS HAJWANI"

        [[targets]]
        id = "32120164"
        name = "GPS THATTA LAGHARI"
    "#;

    #[test]
    fn test_parse_sample_with_defaults() {
        let config = PortalConfig::from_toml_str(SAMPLE)
            .and_then(PortalConfig::validate)
            .expect("sample should parse");

        assert_eq!(config.portal.base_url, "https://portal.test");
        assert_eq!(config.portal.timeout_secs, 30);
        assert_eq!(config.portal.workers, 1);
        assert_eq!(
            config.portal.retry_policy(),
            RetryPolicy::new(3, Duration::from_secs(2))
        );
        assert_eq!(config.portal.batch_options().pause, Duration::ZERO);
        assert_eq!(config.filter.markaz, "5218");
        assert_eq!(config.targets.len(), 2);
        assert_eq!(
            config.target("32120164").map(|t| t.name.as_str()),
            Some("GPS THATTA LAGHARI")
        );
        assert!(config.target("999").is_none());
    }

    #[test]
    fn test_overrides_replace_credential() {
        let config = PortalConfig::from_toml_str(SAMPLE)
            .expect("sample should parse")
            .with_overrides(Some("111".into()), Some("pw".into()));

        assert_eq!(config.credential, Credential::new("111", "pw"));

        let untouched = PortalConfig::from_toml_str(SAMPLE)
            .expect("sample should parse")
            .with_overrides(Some("  ".into()), None);
        assert_eq!(untouched.credential.identifier, "3210390175935");
        assert_eq!(untouched.credential.secret, "12345678");
    }

    #[test]
    fn test_rejects_duplicate_targets() {
        let raw = format!("{SAMPLE}\n[[targets]]\nid = \"32120163\"\nname = \"again\"\n");
        let result = PortalConfig::from_toml_str(&raw).and_then(PortalConfig::validate);

        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("32120163")));
    }

    #[test]
    fn test_rejects_zero_workers_and_empty_identifier() {
        let raw = SAMPLE.replace("pause_ms = 0", "workers = 0");
        assert!(matches!(
            PortalConfig::from_toml_str(&raw).and_then(PortalConfig::validate),
            Err(ConfigError::Invalid(_))
        ));

        let raw = SAMPLE.replace("identifier = \"3210390175935\"", "identifier = \"\"");
        assert!(matches!(
            PortalConfig::from_toml_str(&raw).and_then(PortalConfig::validate),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_filter_is_parse_error() {
        let raw = r#"
            [credential]
            identifier = "1"
        "#;
        assert!(matches!(
            PortalConfig::from_toml_str(raw),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_reports_missing_file() {
        assert!(matches!(
            PortalConfig::load("does/not/exist.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
