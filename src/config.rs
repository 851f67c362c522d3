use std::collections::BTreeMap;
use std::time::Duration;

const ENV_LISTEN: &str = "PROMPTGATE_LISTEN";
const ENV_PORT: &str = "PROMPTGATE_PORT";
const ENV_MASTER_KEY: &str = "PROMPTGATE_MASTER_KEY";
const ENV_AUTH_DISABLED: &str = "PROMPTGATE_AUTH_DISABLED";
const ENV_UPSTREAM_BASE_URL: &str = "PROMPTGATE_UPSTREAM_BASE_URL";
const ENV_UPSTREAM_ORIGIN: &str = "PROMPTGATE_UPSTREAM_ORIGIN";
const ENV_UPSTREAM_USER_AGENT: &str = "PROMPTGATE_UPSTREAM_USER_AGENT";
const ENV_MODEL_MAP: &str = "PROMPTGATE_MODEL_MAP";
pub(crate) const ENV_DEFAULT_MODEL: &str = "PROMPTGATE_DEFAULT_MODEL";
const ENV_STREAM_CHUNK_SIZE: &str = "PROMPTGATE_STREAM_CHUNK_SIZE";
const ENV_STREAM_DELAY_MS: &str = "PROMPTGATE_STREAM_DELAY_MS";
const ENV_METRICS_PATH: &str = "PROMPTGATE_METRICS_PATH";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CHUNK_SIZE: usize = 2;
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 10;
pub const DEFAULT_UPSTREAM_ORIGIN: &str = "chrome-extension://promptgate";
pub const DEFAULT_UPSTREAM_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 PromptgateExtension/1.0";

const BUILTIN_MODELS: &[(&str, &str)] = &[
    ("prompt-standard", "/api/prompt/standard"),
    ("prompt-advanced", "/api/prompt/advanced"),
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Whether `/v1/*` requests must present the master key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    Disabled,
    Bearer(String),
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub origin: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::from_millis(DEFAULT_CHUNK_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub metrics_path: String,
    pub auth: AuthMode,
    pub upstream: UpstreamConfig,
    pub models: BTreeMap<String, String>,
    pub default_model: String,
    pub stream: StreamConfig,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen = match get(ENV_LISTEN) {
            Some(listen) => listen,
            None => {
                let port = match get(ENV_PORT) {
                    Some(raw) => raw.trim().parse::<u16>().map_err(|err| ConfigError::Invalid {
                        key: ENV_PORT,
                        reason: err.to_string(),
                    })?,
                    None => DEFAULT_PORT,
                };
                format!("0.0.0.0:{port}")
            }
        };

        let metrics_path = get(ENV_METRICS_PATH).unwrap_or_else(|| "/metrics".to_string());
        validate_metrics_path(&metrics_path)?;

        let auth_disabled = get(ENV_AUTH_DISABLED)
            .map(|raw| parse_flag(ENV_AUTH_DISABLED, &raw))
            .transpose()?
            .unwrap_or(false);
        let auth = match get(ENV_MASTER_KEY) {
            _ if auth_disabled => AuthMode::Disabled,
            Some(key) => AuthMode::Bearer(key),
            None => {
                tracing::warn!("{ENV_MASTER_KEY} not set, /v1 endpoints are open");
                AuthMode::Disabled
            }
        };

        let upstream = UpstreamConfig {
            base_url: get(ENV_UPSTREAM_BASE_URL).ok_or(ConfigError::Missing(ENV_UPSTREAM_BASE_URL))?,
            origin: get(ENV_UPSTREAM_ORIGIN).unwrap_or_else(|| DEFAULT_UPSTREAM_ORIGIN.to_string()),
            user_agent: get(ENV_UPSTREAM_USER_AGENT)
                .unwrap_or_else(|| DEFAULT_UPSTREAM_USER_AGENT.to_string()),
        };

        let models = match get(ENV_MODEL_MAP) {
            Some(raw) => parse_model_map(&raw)?,
            None => builtin_models(),
        };
        let default_model = match get(ENV_DEFAULT_MODEL) {
            Some(model) => model,
            None => models
                .keys()
                .next()
                .cloned()
                .ok_or(ConfigError::Missing(ENV_DEFAULT_MODEL))?,
        };
        if !models.contains_key(&default_model) {
            return Err(ConfigError::Invalid {
                key: ENV_DEFAULT_MODEL,
                reason: format!("{default_model} is not in the model map"),
            });
        }

        let chunk_size = match get(ENV_STREAM_CHUNK_SIZE) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        key: ENV_STREAM_CHUNK_SIZE,
                        reason: "must be at least 1".to_string(),
                    });
                }
                Ok(size) => size,
                Err(err) => {
                    return Err(ConfigError::Invalid {
                        key: ENV_STREAM_CHUNK_SIZE,
                        reason: err.to_string(),
                    });
                }
            },
            None => DEFAULT_CHUNK_SIZE,
        };
        let delay_ms = match get(ENV_STREAM_DELAY_MS) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|err| ConfigError::Invalid {
                key: ENV_STREAM_DELAY_MS,
                reason: err.to_string(),
            })?,
            None => DEFAULT_CHUNK_DELAY_MS,
        };

        Ok(Self {
            listen,
            metrics_path,
            auth,
            upstream,
            models,
            default_model,
            stream: StreamConfig {
                chunk_size,
                chunk_delay: Duration::from_millis(delay_ms),
            },
        })
    }
}

pub fn builtin_models() -> BTreeMap<String, String> {
    BUILTIN_MODELS
        .iter()
        .map(|(id, path)| (id.to_string(), path.to_string()))
        .collect()
}

fn parse_model_map(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let models: BTreeMap<String, String> =
        serde_json::from_str(raw).map_err(|err| ConfigError::Invalid {
            key: ENV_MODEL_MAP,
            reason: err.to_string(),
        })?;
    if models.is_empty() {
        return Err(ConfigError::Invalid {
            key: ENV_MODEL_MAP,
            reason: "at least one model is required".to_string(),
        });
    }
    Ok(models)
}

// The path becomes a router route, so it must be absolute and stay clear of /v1.
fn validate_metrics_path(path: &str) -> Result<(), ConfigError> {
    let reason = if !path.starts_with('/') {
        "must start with /"
    } else if path == "/v1" || path.starts_with("/v1/") {
        "must not live under /v1"
    } else {
        return Ok(());
    };
    Err(ConfigError::Invalid {
        key: ENV_METRICS_PATH,
        reason: reason.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(pairs: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_base_url_is_set() {
        let config = parse(&[(ENV_UPSTREAM_BASE_URL, "http://upstream.local")]).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.metrics_path, "/metrics");
        assert_eq!(config.auth, AuthMode::Disabled);
        assert_eq!(config.stream, StreamConfig::default());
        assert_eq!(config.models, builtin_models());
        assert!(config.models.contains_key(&config.default_model));
        assert_eq!(config.upstream.origin, DEFAULT_UPSTREAM_ORIGIN);
    }

    #[test]
    fn base_url_is_required() {
        let err = parse(&[]).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_UPSTREAM_BASE_URL));
    }

    #[test]
    fn master_key_enables_bearer_auth() {
        let config = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_MASTER_KEY, "1"),
        ])
        .unwrap();
        assert_eq!(config.auth, AuthMode::Bearer("1".to_string()));
    }

    #[test]
    fn explicit_switch_disables_auth_even_with_key() {
        let config = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_MASTER_KEY, "secret"),
            (ENV_AUTH_DISABLED, "true"),
        ])
        .unwrap();
        assert_eq!(config.auth, AuthMode::Disabled);
    }

    #[test]
    fn port_builds_listen_address() {
        let config = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_PORT, "9100"),
        ])
        .unwrap();
        assert_eq!(config.listen, "0.0.0.0:9100");
    }

    #[test]
    fn model_map_and_default_model_are_validated() {
        let config = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_MODEL_MAP, r#"{"fast":"/api/fast","smart":"/api/smart"}"#),
            (ENV_DEFAULT_MODEL, "smart"),
        ])
        .unwrap();
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.default_model, "smart");

        let err = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_MODEL_MAP, r#"{"fast":"/api/fast"}"#),
            (ENV_DEFAULT_MODEL, "missing"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_DEFAULT_MODEL, .. }));
    }

    #[test]
    fn relative_metrics_path_is_rejected() {
        let err = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_METRICS_PATH, "metrics"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_METRICS_PATH, .. }));
    }

    #[test]
    fn metrics_path_under_v1_is_rejected() {
        for path in ["/v1", "/v1/models", "/v1/chat/completions", "/v1/metrics"] {
            let err = parse(&[
                (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
                (ENV_METRICS_PATH, path),
            ])
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: ENV_METRICS_PATH, .. }));
        }
        let config = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_METRICS_PATH, "/internal/metrics"),
        ])
        .unwrap();
        assert_eq!(config.metrics_path, "/internal/metrics");
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_STREAM_CHUNK_SIZE, "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_STREAM_CHUNK_SIZE, .. }));
    }

    #[test]
    fn stream_settings_are_parsed() {
        let config = parse(&[
            (ENV_UPSTREAM_BASE_URL, "http://upstream.local"),
            (ENV_STREAM_CHUNK_SIZE, "5"),
            (ENV_STREAM_DELAY_MS, "0"),
        ])
        .unwrap();
        assert_eq!(config.stream.chunk_size, 5);
        assert!(config.stream.chunk_delay.is_zero());
    }
}
