use std::{
    collections::HashSet,
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::dispatch::Target;

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Configuration for dipa-auto
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DipaConfig {
    /// Base URL of the directory listing, without the branch segment
    pub ipa_base_url: String,
    /// Repositories notified on every new build, in dispatch order
    pub targets: Vec<Target>,
    /// Seconds between two full check passes
    #[serde(default = "defaults::refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Pause between checking two branches in one pass
    #[serde(default = "defaults::branch_delay_secs")]
    pub branch_delay_secs: u64,
    /// Timeout applied to every outbound request
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Location of the persisted branch state
    #[serde(default = "defaults::state_path")]
    pub state_path: PathBuf,
    #[serde(default = "defaults::github_api_url")]
    pub github_api_url: String,
}

impl DipaConfig {
    /// Load configuration from `path`, `$DIPA_AUTO_CONFIG`, or the default
    /// location, then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => expand_tilde(p),
            None => match env::var("DIPA_AUTO_CONFIG") {
                Ok(p) => expand_tilde(&PathBuf::from(p)),
                Err(_) => Self::config_file_path()?,
            },
        };
        tracing::debug!("loading dipa-auto config from {:?}", config_path);

        if !config_path.exists() {
            anyhow::bail!("config file not found at {:?}", config_path);
        }
        let mut config = Self::load_from_file(&config_path)?;

        config.apply_overrides(|key| env::var(key).ok())?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", config_path))?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: DipaConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.state_path = expand_tilde(&config.state_path);

        Ok(config)
    }

    /// Apply `DIPA_*` overrides looked up through `lookup`
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DIPA_IPA_BASE_URL") {
            self.ipa_base_url = url;
        }

        if let Some(path) = lookup("DIPA_STATE_PATH") {
            self.state_path = expand_tilde(&PathBuf::from(path));
        }

        if let Some(secs) = lookup("DIPA_REFRESH_INTERVAL_SECS") {
            self.refresh_interval_secs = secs
                .parse()
                .context("Failed to parse DIPA_REFRESH_INTERVAL_SECS as u64")?;
        }
        Ok(())
    }

    /// Check the values the checker relies on
    pub fn validate(&self) -> Result<()> {
        if self.ipa_base_url.is_empty() {
            anyhow::bail!("ipa_base_url is required");
        }
        if !is_http_url(&self.ipa_base_url) {
            anyhow::bail!("ipa_base_url must be an http(s) URL");
        }
        if !is_http_url(&self.github_api_url) {
            anyhow::bail!("github_api_url must be an http(s) URL");
        }
        if self.refresh_interval_secs == 0 {
            anyhow::bail!("refresh_interval_secs must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }

        if self.targets.is_empty() {
            anyhow::bail!("at least one target is required");
        }
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.repo.is_empty() {
                anyhow::bail!("github_repo is required for all targets");
            }
            if !is_repo_slug(&target.repo) {
                anyhow::bail!(
                    "github_repo must be in the format 'owner/repo', got '{}'",
                    target.repo
                );
            }
            if target.token.is_empty() {
                anyhow::bail!("github_token is required for {}", target.repo);
            }
            if !seen.insert(target.repo.as_str()) {
                anyhow::bail!("duplicate target {}", target.repo);
            }
        }
        Ok(())
    }

    /// Get default config file path
    pub fn config_file_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".config/dipa-auto/config.yaml"))
            .context("Could not determine home directory for config file")
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn branch_delay(&self) -> Duration {
        Duration::from_secs(self.branch_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}

/// `owner/repo` made of ASCII alphanumerics, `-`, `_` and `.`
fn is_repo_slug(repo: &str) -> bool {
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    match repo.split_once('/') {
        Some((owner, name)) => valid(owner) && valid(name),
        None => false,
    }
}

mod defaults {
    use std::path::PathBuf;

    pub(crate) fn refresh_interval_secs() -> u64 {
        3600
    }

    pub(crate) fn branch_delay_secs() -> u64 {
        5
    }

    pub(crate) fn request_timeout_secs() -> u64 {
        30
    }

    pub(crate) fn state_path() -> PathBuf {
        PathBuf::from("/var/lib/dipa-auto/branch_hashes.json")
    }

    pub(crate) fn github_api_url() -> String {
        "https://api.github.com".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;

    const MINIMAL: &str = r#"
ipa_base_url: https://ipa.aspy.dev/discord
targets:
  - github_repo: castdrian/apt-repo
    github_token: ghp_one
  - github_repo: example/other-repo
    github_token: ghp_two
"#;

    fn minimal() -> DipaConfig {
        serde_yaml::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = minimal();
        config.validate().unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(3600));
        assert_eq!(config.branch_delay(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.state_path,
            PathBuf::from("/var/lib/dipa-auto/branch_hashes.json")
        );
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.targets[1].repo, "example/other-repo");
        assert_eq!(config.targets[1].token, "ghp_two");
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let state_path = dir.path().join("state.json");
        std::fs::write(
            &config_path,
            format!(
                "{}refresh_interval_secs: 600\nstate_path: {}\n",
                MINIMAL,
                state_path.display()
            ),
        )
        .unwrap();

        let loaded = DipaConfig::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loaded.refresh_interval_secs, 600);
        assert_eq!(loaded.state_path, state_path);
        assert_eq!(loaded.targets, minimal().targets);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(DipaConfig::load(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = format!("{}\nrefresh_schedule: '0 * * * *'\n", MINIMAL);
        assert!(serde_yaml::from_str::<DipaConfig>(&yaml).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DIPA_IPA_BASE_URL", "http://localhost:8080/discord"),
            ("DIPA_REFRESH_INTERVAL_SECS", "120"),
            ("DIPA_STATE_PATH", "/tmp/state.json"),
        ]);
        let mut config = minimal();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ipa_base_url, "http://localhost:8080/discord");
        assert_eq!(config.refresh_interval_secs, 120);
        assert_eq!(config.state_path, PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn test_bad_override() {
        let mut config = minimal();
        let result = config.apply_overrides(|key| {
            (key == "DIPA_REFRESH_INTERVAL_SECS").then(|| "hourly".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_tilde_expansion() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            format!("{}state_path: ~/dipa/state.json\n", MINIMAL),
        )
        .unwrap();

        let loaded = DipaConfig::load_from_file(&config_path).unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(loaded.state_path, home.join("dipa/state.json"));
        }
    }

    #[test]
    fn test_validation() {
        let mut config = minimal();
        config.ipa_base_url = "ftp://ipa.example".to_string();
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.targets.clear();
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.targets[0].repo = "not-a-slug".to_string();
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.targets[0].token.clear();
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.targets[1].repo = config.targets[0].repo.clone();
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.refresh_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_repo_slug() {
        assert!(is_repo_slug("castdrian/apt-repo"));
        assert!(is_repo_slug("some_org/repo.github.io"));
        assert!(!is_repo_slug("owner/"));
        assert!(!is_repo_slug("/repo"));
        assert!(!is_repo_slug("a/b/c"));
        assert!(!is_repo_slug("owner/re po"));
    }
}
