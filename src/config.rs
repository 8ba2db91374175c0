use crate::error::{NodeProbeError, Result};
use crate::probe::ProbeMethod;
use crate::services::CycleConfig;
use crate::stats::{RateFilter, RatePrecision, DEFAULT_RENAME_FORMAT};
use std::env;
use std::path::PathBuf;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Probe cycle configuration
    pub probe: ProbeConfig,
    /// Node list pipeline configuration
    pub pipeline: PipelineConfig,
    /// Ping service configuration
    pub server: ServerConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Stat store CSV file (required)
    pub stats_path: PathBuf,
    /// Per-probe timeout in milliseconds (default: 500)
    pub timeout_ms: u64,
    /// Maximum probes in flight (default: 10)
    pub concurrency: usize,
    /// Reachability primitive (icmp, tcp, http)
    pub method: ProbeMethod,
    /// Base URL of the HTTP ping service used by the `http` method
    pub ping_service: Url,
    /// Rounding of rates served by `/rate` (two_decimals, integer)
    pub rate_precision: RatePrecision,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// JSON node list to read, stdin when unset
    pub nodes_path: Option<PathBuf>,
    /// Where to write the alive nodes, stdout when unset
    pub output_path: Option<PathBuf>,
    /// Drop nodes below the success rate threshold
    pub filter_enabled: bool,
    pub filter: RateFilter,
    /// Prefix node names with their success rate
    pub rename_enabled: bool,
    pub rename_format: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Port for the ping service (default: 9876)
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let stats_path = env::var("STATS_PATH")
            .ok()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| NodeProbeError::MissingEnvVar("STATS_PATH".into()))?;

        let method_raw = get_env_or("PROBE_METHOD", "icmp");
        let method = ProbeMethod::from_str(&method_raw).ok_or_else(|| {
            NodeProbeError::InvalidConfig(format!(
                "PROBE_METHOD must be one of icmp, tcp, http (got `{}`)",
                method_raw
            ))
        })?;

        let ping_service = Url::parse(&get_env_or("PING_SERVICE_URL", "http://127.0.0.1:9876"))
            .map_err(|e| {
                NodeProbeError::InvalidConfig(format!("PING_SERVICE_URL must be a valid URL: {}", e))
            })?;

        let precision_raw = get_env_or("RATE_PRECISION", "two_decimals");
        let rate_precision = RatePrecision::from_str(&precision_raw).ok_or_else(|| {
            NodeProbeError::InvalidConfig(format!(
                "RATE_PRECISION must be two_decimals or integer (got `{}`)",
                precision_raw
            ))
        })?;

        Ok(Config {
            probe: ProbeConfig {
                stats_path: PathBuf::from(stats_path),
                timeout_ms: get_env_or("PROBE_TIMEOUT_MS", "500").parse().map_err(|_| {
                    NodeProbeError::InvalidConfig("PROBE_TIMEOUT_MS must be a valid number".into())
                })?,
                concurrency: get_env_or("PROBE_CONCURRENCY", "10").parse().map_err(|_| {
                    NodeProbeError::InvalidConfig("PROBE_CONCURRENCY must be a valid number".into())
                })?,
                method,
                ping_service,
                rate_precision,
            },
            pipeline: PipelineConfig {
                nodes_path: get_env_path("NODES_PATH"),
                output_path: get_env_path("OUTPUT_PATH"),
                filter_enabled: get_env_or("FILTER_ENABLED", "false")
                    .parse()
                    .unwrap_or(false),
                filter: RateFilter {
                    min_rate: get_env_or("FILTER_MIN_RATE", "30").parse().map_err(|_| {
                        NodeProbeError::InvalidConfig("FILTER_MIN_RATE must be a valid number".into())
                    })?,
                    min_count: get_env_or("FILTER_MIN_COUNT", "10").parse().map_err(|_| {
                        NodeProbeError::InvalidConfig(
                            "FILTER_MIN_COUNT must be a valid number".into(),
                        )
                    })?,
                },
                rename_enabled: get_env_or("RENAME_ENABLED", "false")
                    .parse()
                    .unwrap_or(false),
                rename_format: get_env_or("RENAME_FORMAT", DEFAULT_RENAME_FORMAT),
            },
            server: ServerConfig {
                host: get_env_or("SERVER_HOST", "0.0.0.0"),
                port: get_env_or("SERVER_PORT", "9876").parse().map_err(|_| {
                    NodeProbeError::InvalidConfig("SERVER_PORT must be a valid port number".into())
                })?,
            },
            log: LogConfig::from_env(),
        })
    }

    /// Cycle settings for [`crate::services::ProbeEngine`]
    pub fn cycle(&self) -> CycleConfig {
        CycleConfig {
            timeout_ms: self.probe.timeout_ms,
            concurrency: self.probe.concurrency,
            stat_store_path: self.probe.stats_path.clone(),
            precision: self.probe.rate_precision,
        }
    }

    /// Get the ping service address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl LogConfig {
    /// Logging settings alone, so tracing can start before the rest is validated
    pub fn from_env() -> Self {
        LogConfig {
            level: get_env_or("LOG_LEVEL", "info"),
            format: get_env_or("LOG_FORMAT", "json"),
        }
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "STATS_PATH",
        "PROBE_TIMEOUT_MS",
        "PROBE_CONCURRENCY",
        "PROBE_METHOD",
        "PING_SERVICE_URL",
        "RATE_PRECISION",
        "NODES_PATH",
        "OUTPUT_PATH",
        "FILTER_ENABLED",
        "FILTER_MIN_RATE",
        "FILTER_MIN_COUNT",
        "RENAME_ENABLED",
        "RENAME_FORMAT",
        "SERVER_HOST",
        "SERVER_PORT",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("STATS_PATH", "/var/lib/nodeprobe/stats.csv");
        let config = Config::from_env().unwrap();

        assert_eq!(config.probe.stats_path, PathBuf::from("/var/lib/nodeprobe/stats.csv"));
        assert_eq!(config.probe.timeout_ms, 500);
        assert_eq!(config.probe.concurrency, 10);
        assert_eq!(config.probe.method, ProbeMethod::Icmp);
        assert_eq!(config.probe.ping_service.as_str(), "http://127.0.0.1:9876/");
        assert_eq!(config.probe.rate_precision, RatePrecision::TwoDecimals);

        assert!(config.pipeline.nodes_path.is_none());
        assert!(config.pipeline.output_path.is_none());
        assert!(!config.pipeline.filter_enabled);
        assert_eq!(config.pipeline.filter, RateFilter::default());
        assert!(!config.pipeline.rename_enabled);
        assert_eq!(config.pipeline.rename_format, "{rate}|{name}");

        assert_eq!(config.server_addr(), "0.0.0.0:9876");
        assert_eq!(config.log.format, "json");

        let cycle = config.cycle();
        assert_eq!(cycle.timeout_ms, 500);
        assert_eq!(cycle.concurrency, 10);
        assert!(cycle.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("STATS_PATH", "stats.csv");
        env::set_var("PROBE_TIMEOUT_MS", "1500");
        env::set_var("PROBE_CONCURRENCY", "4");
        env::set_var("PROBE_METHOD", "http_meta");
        env::set_var("PING_SERVICE_URL", "http://10.0.0.2:9000/");
        env::set_var("NODES_PATH", "nodes.json");
        env::set_var("FILTER_ENABLED", "true");
        env::set_var("FILTER_MIN_RATE", "45.5");
        env::set_var("FILTER_MIN_COUNT", "20");
        env::set_var("RENAME_ENABLED", "true");
        env::set_var("RENAME_FORMAT", "[{rate}] {name}");
        env::set_var("SERVER_PORT", "19876");
        env::set_var("RATE_PRECISION", "integer");

        let config = Config::from_env().unwrap();

        assert_eq!(config.probe.timeout_ms, 1500);
        assert_eq!(config.probe.concurrency, 4);
        assert_eq!(config.probe.method, ProbeMethod::Http);
        assert_eq!(config.probe.ping_service.host_str(), Some("10.0.0.2"));
        assert_eq!(config.pipeline.nodes_path, Some(PathBuf::from("nodes.json")));
        assert!(config.pipeline.filter_enabled);
        assert_eq!(
            config.pipeline.filter,
            RateFilter {
                min_rate: 45.5,
                min_count: 20
            }
        );
        assert!(config.pipeline.rename_enabled);
        assert_eq!(config.pipeline.rename_format, "[{rate}] {name}");
        assert_eq!(config.server.port, 19876);
        assert_eq!(config.probe.rate_precision, RatePrecision::Integer);
        assert_eq!(config.cycle().precision, RatePrecision::Integer);
    }

    #[test]
    fn test_config_from_env_requires_stats_path() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, NodeProbeError::MissingEnvVar(ref key) if key == "STATS_PATH"));

        env::set_var("STATS_PATH", "   ");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, NodeProbeError::MissingEnvVar(_)));
    }

    #[test]
    fn test_config_from_env_invalid_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);
        env::set_var("STATS_PATH", "stats.csv");

        env::set_var("PROBE_TIMEOUT_MS", "soon");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            NodeProbeError::InvalidConfig(_)
        ));
        env::remove_var("PROBE_TIMEOUT_MS");

        env::set_var("PROBE_METHOD", "carrier-pigeon");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            NodeProbeError::InvalidConfig(_)
        ));
        env::remove_var("PROBE_METHOD");

        env::set_var("SERVER_PORT", "not-a-port");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            NodeProbeError::InvalidConfig(_)
        ));
        env::remove_var("SERVER_PORT");

        env::set_var("RATE_PRECISION", "three");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            NodeProbeError::InvalidConfig(_)
        ));
        env::remove_var("RATE_PRECISION");

        env::set_var("PING_SERVICE_URL", "not a url");
        assert!(matches!(
            Config::from_env().unwrap_err(),
            NodeProbeError::InvalidConfig(_)
        ));
    }
}
