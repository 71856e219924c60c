use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StatsError, StatsResult};

pub const DEFAULT_CONFIG_FILENAME: &str = "commons-stats.toml";
pub const DEFAULT_COMMONS_API_URL: &str = "https://commons.wikimedia.org/w/api.php";
pub const DEFAULT_METRICS_API_URL: &str = "https://wikimedia.org/api/rest_v1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: usize = 5;
pub const DEFAULT_BACKOFF_FACTOR_MS: u64 = 100;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 100;

/// `{contact}` is substituted with the caller-supplied contact identity.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "commons-stats/",
    env!("CARGO_PKG_VERSION"),
    " (https://meta.wikimedia.org/wiki/User-Agent_policy; {contact})"
);

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct StatsConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub endpoints: EndpointSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ClientSection {
    pub contact: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub backoff_factor_ms: Option<u64>,
    pub rate_limit_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EndpointSection {
    pub commons_api_url: Option<String>,
    pub metrics_api_url: Option<String>,
}

/// Fully resolved client parameters. Only constructible with a contact identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub contact: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub backoff_factor: Duration,
    pub rate_limit: Duration,
}

impl StatsConfig {
    /// Resolve the Commons Action API URL: env COMMONS_API_URL > config > default.
    pub fn commons_api_url(&self) -> String {
        self.commons_api_url_with(&process_env)
    }

    /// Resolve the metrics REST base: env WIKIMEDIA_METRICS_URL > config > default.
    pub fn metrics_api_url(&self) -> String {
        self.metrics_api_url_with(&process_env)
    }

    pub fn client_settings(&self, contact_override: Option<&str>) -> StatsResult<ClientSettings> {
        self.client_settings_with(contact_override, &process_env)
    }

    fn commons_api_url_with(&self, lookup: &dyn Fn(&str) -> Option<String>) -> String {
        lookup("COMMONS_API_URL")
            .or_else(|| self.endpoints.commons_api_url.clone())
            .unwrap_or_else(|| DEFAULT_COMMONS_API_URL.to_string())
    }

    fn metrics_api_url_with(&self, lookup: &dyn Fn(&str) -> Option<String>) -> String {
        lookup("WIKIMEDIA_METRICS_URL")
            .or_else(|| self.endpoints.metrics_api_url.clone())
            .unwrap_or_else(|| DEFAULT_METRICS_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    fn client_settings_with(
        &self,
        contact_override: Option<&str>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> StatsResult<ClientSettings> {
        let contact = contact_override
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .or_else(|| lookup("COMMONS_STATS_CONTACT"))
            .or_else(|| self.client.contact.clone())
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                StatsError::Config(
                    "a contact identity (username or e-mail) is required for the User-Agent"
                        .to_string(),
                )
            })?;

        let template = lookup("COMMONS_STATS_USER_AGENT")
            .or_else(|| self.client.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let user_agent = render_user_agent(&template, &contact);

        let timeout_ms = parse_lookup(lookup, "COMMONS_STATS_TIMEOUT_MS")?
            .or(self.client.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let max_retries = parse_lookup(lookup, "COMMONS_STATS_RETRIES")?
            .or(self.client.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES);
        let backoff_ms = parse_lookup(lookup, "COMMONS_STATS_BACKOFF_MS")?
            .or(self.client.backoff_factor_ms)
            .unwrap_or(DEFAULT_BACKOFF_FACTOR_MS);
        let rate_limit_ms = parse_lookup(lookup, "COMMONS_STATS_RATE_LIMIT_MS")?
            .or(self.client.rate_limit_ms)
            .unwrap_or(DEFAULT_RATE_LIMIT_MS);
        if timeout_ms == 0 {
            return Err(StatsError::Config("timeout must be positive".to_string()));
        }

        Ok(ClientSettings {
            contact,
            user_agent,
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            backoff_factor: Duration::from_millis(backoff_ms),
            rate_limit: Duration::from_millis(rate_limit_ms),
        })
    }
}

/// Load and parse a StatsConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> StatsResult<StatsConfig> {
    if !config_path.exists() {
        return Ok(StatsConfig::default());
    }
    let content = fs::read_to_string(config_path).map_err(|error| {
        StatsError::Config(format!("failed to read {}: {error}", config_path.display()))
    })?;
    toml::from_str(&content).map_err(|error| {
        StatsError::Config(format!("failed to parse {}: {error}", config_path.display()))
    })
}

fn render_user_agent(template: &str, contact: &str) -> String {
    if template.contains("{contact}") {
        template.replace("{contact}", contact)
    } else {
        format!("{template} ({contact})")
    }
}

fn parse_lookup<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
) -> StatsResult<Option<T>> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| StatsError::Config(format!("{key} is not a valid number: {value}"))),
        None => Ok(None),
    }
}

fn process_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
