//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::LimiterConfig;

/// Legacy variable overriding the quota per window.
pub const MAX_REQUESTS_ENV: &str = "MAX_REQUESTS";
/// Legacy variable overriding the window duration.
pub const WINDOW_DURATION_ENV: &str = "WINDOW_DURATION";
/// Prefix for nested overrides, e.g. `TURNSTILE__SERVER__HTTP_ADDR`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Key callers on the `x-caller-id` header rather than the peer IP.
    /// Only safe behind a proxy that sets the header itself.
    #[serde(default)]
    pub trust_caller_header: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            trust_caller_header: false,
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window duration, e.g. `1m`, `30s`, `1h30m`
    #[serde(default = "default_window_duration")]
    pub window_duration: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_duration: default_window_duration(),
        }
    }
}

fn default_max_requests() -> u64 {
    3
}

fn default_window_duration() -> String {
    "1m".to_string()
}

impl RateLimitingConfig {
    /// Build the limiter settings, parsing the window duration.
    pub fn limiter_config(&self) -> Result<LimiterConfig> {
        Ok(LimiterConfig::new(
            self.max_requests,
            parse_duration(&self.window_duration)?,
        ))
    }
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Expiration for entries written without an explicit TTL
    #[serde(default = "default_ttl")]
    pub default_ttl: String,

    /// How often expired entries are purged
    #[serde(default = "default_purge_interval")]
    pub purge_interval: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: default_ttl(),
            purge_interval: default_purge_interval(),
        }
    }
}

fn default_ttl() -> String {
    "60m".to_string()
}

fn default_purge_interval() -> String {
    "120m".to_string()
}

impl StoreConfig {
    pub fn default_ttl(&self) -> Result<Duration> {
        let ttl = parse_duration(&self.default_ttl)?;
        if ttl.is_zero() {
            return Err(TurnstileError::Config(
                "store.default_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(ttl)
    }

    pub fn purge_interval(&self) -> Result<Duration> {
        let interval = parse_duration(&self.purge_interval)?;
        if interval.is_zero() {
            return Err(TurnstileError::Config(
                "store.purge_interval must be greater than zero".to_string(),
            ));
        }
        Ok(interval)
    }
}

/// Explicit values for the legacy environment overrides.
#[derive(Debug, Clone, Default)]
pub struct LegacyOverrides {
    pub max_requests: Option<String>,
    pub window_duration: Option<String>,
}

impl LegacyOverrides {
    /// Read `MAX_REQUESTS` and `WINDOW_DURATION` from the process environment.
    pub fn from_env() -> Self {
        Self {
            max_requests: std::env::var(MAX_REQUESTS_ENV).ok(),
            window_duration: std::env::var(WINDOW_DURATION_ENV).ok(),
        }
    }
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// Load the effective configuration.
    ///
    /// Starts from the YAML file at `path` (or defaults), then applies
    /// `TURNSTILE__`-prefixed variables and the legacy `MAX_REQUESTS` /
    /// `WINDOW_DURATION` variables, later sources winning.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_overrides(path, LegacyOverrides::from_env())
    }

    /// Same as [`TurnstileConfig::load`] with explicit legacy overrides.
    pub fn load_with_overrides(path: Option<&Path>, overrides: LegacyOverrides) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let config = ::config::Config::builder()
            .add_source(::config::Config::try_from(&base).map_err(config_error)?)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("rate_limiting.max_requests", overrides.max_requests)
            .map_err(config_error)?
            .set_override_option("rate_limiting.window_duration", overrides.window_duration)
            .map_err(config_error)?
            .build()
            .map_err(config_error)?;

        config.try_deserialize().map_err(config_error)
    }

    /// Check that every duration parses and the quota is usable.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.max_requests == 0 {
            return Err(TurnstileError::Config(
                "rate_limiting.max_requests must be at least 1".to_string(),
            ));
        }
        self.rate_limiting.limiter_config()?;
        self.store.default_ttl()?;
        self.store.purge_interval()?;
        Ok(())
    }
}

fn config_error(e: ::config::ConfigError) -> TurnstileError {
    TurnstileError::Config(e.to_string())
}

/// Parse a duration string such as `300ms`, `1.5h` or `2h45m`.
///
/// A duration is a sequence of decimal numbers, each with an optional
/// fraction and a unit suffix. Valid units are `ns`, `us` (or `µs`), `ms`,
/// `s`, `m` and `h`. The bare string `0` is also accepted. Arithmetic is
/// done in whole nanoseconds; fractions finer than a nanosecond truncate.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || TurnstileError::Config(format!("invalid duration {:?}", input));
    let overflow = || TurnstileError::Config(format!("duration {:?} is too large", input));

    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut rest = s;
    let mut total_nanos: u128 = 0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => {
                return Err(TurnstileError::Config(format!(
                    "missing unit in duration {:?}",
                    input
                )))
            }
            _ => {
                return Err(TurnstileError::Config(format!(
                    "unknown unit {:?} in duration {:?}",
                    unit, input
                )))
            }
        };

        let whole_value: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole_value.checked_mul(scale).ok_or_else(overflow)?;

        // Digits past the 18th cannot change the result at nanosecond scale.
        let fraction = &fraction[..fraction.len().min(18)];
        if !fraction.is_empty() {
            let digits: u128 = fraction.parse().map_err(|_| invalid())?;
            let divisor = 10u128.pow(fraction.len() as u32);
            nanos = nanos
                .checked_add(digits * scale / divisor)
                .ok_or_else(overflow)?;
        }

        total_nanos = total_nanos.checked_add(nanos).ok_or_else(overflow)?;
        rest = tail;
    }

    let total_nanos = u64::try_from(total_nanos).map_err(|_| overflow())?;
    Ok(Duration::from_nanos(total_nanos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::default();

        assert_eq!(config.server.http_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.rate_limiting.max_requests, 3);
        assert_eq!(
            config.rate_limiting.limiter_config().unwrap(),
            LimiterConfig::new(3, Duration::from_secs(60))
        );
        assert_eq!(config.store.default_ttl().unwrap(), Duration::from_secs(3600));
        assert_eq!(config.store.purge_interval().unwrap(), Duration::from_secs(7200));
        assert_ok!(config.validate());
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("5ns").unwrap(), Duration::from_nanos(5));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_compound_and_fraction() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2m0.5s").unwrap(), Duration::from_millis(120_500));
    }

    #[test]
    fn test_parse_duration_exact_nanoseconds() {
        // Beyond 2^53 a float accumulator would round these.
        assert_eq!(
            parse_duration("9007199254740993ns").unwrap(),
            Duration::from_nanos(9_007_199_254_740_993)
        );
        assert_eq!(
            parse_duration("18446744073709551615ns").unwrap(),
            Duration::from_nanos(u64::MAX)
        );
        assert_eq!(parse_duration(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.s").unwrap(), Duration::from_secs(1));
        assert_eq!(
            parse_duration("0.0000000015s").unwrap(),
            Duration::from_nanos(1)
        );
    }

    #[test]
    fn test_parse_duration_rejects_overflow() {
        assert_err!(parse_duration("18446744073709551616ns"));
        assert_err!(parse_duration("5124096h"));
        assert_err!(parse_duration("99999999999999999999999999999999999999999h"));
    }

    #[test]
    fn test_parse_duration_rejects_invalid() {
        for input in ["", "abc", "10", "5x", "-1m", "m", ".s", "1m30", "1.2.3s"] {
            assert_err!(parse_duration(input), "{:?} should be rejected", input);
        }
    }

    #[test]
    fn test_from_yaml_partial_uses_defaults() {
        let yaml = r#"
rate_limiting:
  max_requests: 100
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.rate_limiting.max_requests, 100);
        assert_eq!(config.rate_limiting.window_duration, "1m");
        assert_eq!(config.server.http_addr, default_http_addr());
    }

    #[test]
    fn test_trust_caller_header_is_opt_in() {
        assert!(!TurnstileConfig::default().server.trust_caller_header);

        let config = TurnstileConfig::from_yaml("server:\n  trust_caller_header: true\n").unwrap();
        assert!(config.server.trust_caller_header);
        assert_eq!(config.server.http_addr, default_http_addr());
    }

    #[test]
    fn test_from_yaml_invalid() {
        let result = TurnstileConfig::from_yaml("rate_limiting: [1, 2");
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_load_with_legacy_overrides() {
        let overrides = LegacyOverrides {
            max_requests: Some("42".to_string()),
            window_duration: Some("30s".to_string()),
        };

        let config = assert_ok!(TurnstileConfig::load_with_overrides(None, overrides));

        assert_eq!(config.rate_limiting.max_requests, 42);
        assert_eq!(
            config.rate_limiting.limiter_config().unwrap().window_duration,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_load_from_file_then_override() {
        let path = std::env::temp_dir().join(format!(
            "turnstile-config-{}-{}.yaml",
            std::process::id(),
            line!()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "server:\n  http_addr: \"127.0.0.1:9000\"\nrate_limiting:\n  max_requests: 7\n  window_duration: \"5m\""
        )
        .unwrap();
        drop(file);

        let overrides = LegacyOverrides {
            max_requests: None,
            window_duration: Some("10s".to_string()),
        };
        let config = TurnstileConfig::load_with_overrides(Some(&path), overrides);
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.rate_limiting.max_requests, 7);
        assert_eq!(config.rate_limiting.window_duration, "10s");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = Path::new("/nonexistent/turnstile.yaml");
        let result = TurnstileConfig::load_with_overrides(Some(path), LegacyOverrides::default());
        assert!(matches!(result, Err(TurnstileError::Io(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TurnstileConfig::default();
        config.rate_limiting.window_duration = "soon".to_string();
        assert_err!(config.validate());

        let mut config = TurnstileConfig::default();
        config.rate_limiting.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = TurnstileConfig::default();
        config.store.purge_interval = "0".to_string();
        assert!(config.validate().is_err());
    }
}
