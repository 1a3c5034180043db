//! Server configuration

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use rounds_core::{Policy, PolicyError, PolicyTable, RateLimitPolicy};
use thiserror::Error;

/// Configuration errors surface at startup instead of silently falling back
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid rate limit policy {key}: {source}")]
    Policy {
        key: String,
        #[source]
        source: PolicyError,
    },
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// API key -> subject id
    pub api_keys: HashMap<String, String>,
    pub cors_origins: Vec<String>,
    /// Peers whose `X-Forwarded-For` / `X-Real-IP` headers are believed
    pub trusted_proxies: Vec<IpAddr>,
    pub request_timeout: Duration,
    pub cache_max_entries: usize,
    pub cache_default_ttl: Duration,
    pub policies: PolicyTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            api_keys: HashMap::new(),
            cors_origins: vec!["*".to_string()],
            trusted_proxies: Vec::new(),
            request_timeout: Duration::from_secs(30),
            cache_max_entries: 1000,
            cache_default_ttl: Duration::from_secs(300),
            policies: PolicyTable::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let mut policies = defaults.policies.clone();
        for policy in Policy::ALL {
            let key = format!("RATE_LIMIT_{}", policy.as_str().to_uppercase());
            if let Some(value) = lookup(&key) {
                policies = policies.with(policy, parse_policy(&key, &value)?);
            }
        }

        Ok(Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            api_keys: match lookup("API_KEYS") {
                Some(value) => parse_api_keys(&value)?,
                None => defaults.api_keys,
            },
            cors_origins: lookup("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            trusted_proxies: match lookup("TRUSTED_PROXIES") {
                Some(value) => parse_trusted_proxies(&value)?,
                None => defaults.trusted_proxies,
            },
            request_timeout: match lookup("REQUEST_TIMEOUT_SECS") {
                Some(value) => Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", &value)?),
                None => defaults.request_timeout,
            },
            cache_max_entries: match lookup("CACHE_MAX_ENTRIES") {
                Some(value) => parse_number("CACHE_MAX_ENTRIES", &value)?,
                None => defaults.cache_max_entries,
            },
            cache_default_ttl: match lookup("CACHE_DEFAULT_TTL_SECS") {
                Some(value) => {
                    Duration::from_secs(parse_number("CACHE_DEFAULT_TTL_SECS", &value)?)
                }
                None => defaults.cache_default_ttl,
            },
            policies,
        })
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(key, value, "expected a non-negative integer"))
}

/// Parse a comma-separated list of proxy addresses
fn parse_trusted_proxies(value: &str) -> Result<Vec<IpAddr>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| {
            ip.parse()
                .map_err(|_| invalid("TRUSTED_PROXIES", ip, "expected an IP address"))
        })
        .collect()
}

/// Parse `key=subject,key2=subject2`
fn parse_api_keys(value: &str) -> Result<HashMap<String, String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, subject)) if !key.trim().is_empty() && !subject.trim().is_empty() => {
                Ok((key.trim().to_string(), subject.trim().to_string()))
            }
            _ => Err(invalid("API_KEYS", pair, "expected key=subject")),
        })
        .collect()
}

/// Parse `<max_requests>/<window_secs>`
fn parse_policy(key: &str, value: &str) -> Result<RateLimitPolicy, ConfigError> {
    let (max, window) = value
        .split_once('/')
        .ok_or_else(|| invalid(key, value, "expected <max_requests>/<window_secs>"))?;
    let max: u32 = parse_number(key, max)?;
    let window: u64 = parse_number(key, window)?;

    RateLimitPolicy::new(Duration::from_secs(window), max).map_err(|source| ConfigError::Policy {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert!(config.api_keys.is_empty());
        assert_eq!(config.policies, PolicyTable::default());
    }

    #[test]
    fn test_reads_policies_and_cache_settings() {
        let config = Config::from_lookup(lookup(&[
            ("RATE_LIMIT_WRITE", "3/60"),
            ("CACHE_MAX_ENTRIES", "2"),
            ("CACHE_DEFAULT_TTL_SECS", "10"),
            ("API_KEYS", "k1=learner-1, k2=educator-7"),
        ]))
        .unwrap();

        let write = config.policies.get(Policy::Write);
        assert_eq!(write.max_requests(), 3);
        assert_eq!(write.window(), Duration::from_secs(60));
        assert_eq!(config.cache_max_entries, 2);
        assert_eq!(config.cache_default_ttl, Duration::from_secs(10));
        assert_eq!(config.api_keys["k2"], "educator-7");
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("RATE_LIMIT_PUBLIC", "100")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("RATE_LIMIT_PUBLIC", "0/60")])),
            Err(ConfigError::Policy {
                source: PolicyError::ZeroMaxRequests,
                ..
            })
        ));
        assert!(Config::from_lookup(lookup(&[("API_KEYS", "no-subject")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CACHE_MAX_ENTRIES", "lots")])).is_err());
    }

    #[test]
    fn test_reads_trusted_proxies() {
        assert!(Config::from_lookup(|_| None).unwrap().trusted_proxies.is_empty());

        let config =
            Config::from_lookup(lookup(&[("TRUSTED_PROXIES", "10.0.0.1, ::1")])).unwrap();
        assert_eq!(
            config.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );

        assert!(matches!(
            Config::from_lookup(lookup(&[("TRUSTED_PROXIES", "10.0.0.1,proxy.internal")])),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
