use avatar_core::{backend::Capability, streaming::DEFAULT_VOICE_ID, transport::AuthScheme};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub api_key: SecretString,
    pub base_url: String,
    pub capability: Capability,
    pub default_voice_id: String,
    pub avatar_cache_ttl: Duration,
    pub request_timeout: Duration,
    pub video_poll_interval: Duration,
    pub video_auth: AuthScheme,
    pub viewer_template_path: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let api_key = std::env::var("HEYGEN_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("HEYGEN_API_KEY".to_string()))?;

        let base_url = std::env::var("HEYGEN_BASE_URL")
            .unwrap_or_else(|_| avatar_core::transport::HttpTransport::DEFAULT_BASE_URL.to_string());

        let mode_str = std::env::var("AVATAR_MODE").unwrap_or_else(|_| "streaming".to_string());
        let capability = match mode_str.to_lowercase().as_str() {
            "streaming" => Capability::LiveStreaming,
            "render" => Capability::BatchRender,
            other => {
                return Err(ConfigError::InvalidValue(
                    "AVATAR_MODE".to_string(),
                    format!("'{}' is not one of 'streaming' or 'render'", other),
                ));
            }
        };

        let default_voice_id =
            std::env::var("DEFAULT_VOICE_ID").unwrap_or_else(|_| DEFAULT_VOICE_ID.to_string());

        let avatar_cache_ttl = Duration::from_secs(parse_number("AVATAR_CACHE_TTL_SECS", 300)?);
        let request_timeout = Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", 30)?);
        let video_poll_interval =
            Duration::from_millis(parse_number("VIDEO_POLL_INTERVAL_MS", 1000)?);
        if video_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "VIDEO_POLL_INTERVAL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let auth_str = std::env::var("VIDEO_AUTH").unwrap_or_else(|_| "api_key".to_string());
        let video_auth = match auth_str.to_lowercase().as_str() {
            "api_key" => AuthScheme::ApiKey,
            "bearer" => AuthScheme::Bearer,
            other => {
                return Err(ConfigError::InvalidValue(
                    "VIDEO_AUTH".to_string(),
                    format!("'{}' is not one of 'api_key' or 'bearer'", other),
                ));
            }
        };

        let viewer_template_path = std::env::var("VIEWER_TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./assets/viewer.html"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            api_key,
            base_url,
            capability,
            default_voice_id,
            avatar_cache_ttl,
            request_timeout,
            video_poll_interval,
            video_auth,
            viewer_template_path,
            log_level,
        })
    }
}

fn parse_number(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            for var in [
                "BIND_ADDRESS",
                "HEYGEN_API_KEY",
                "HEYGEN_BASE_URL",
                "AVATAR_MODE",
                "DEFAULT_VOICE_ID",
                "AVATAR_CACHE_TTL_SECS",
                "REQUEST_TIMEOUT_SECS",
                "VIDEO_POLL_INTERVAL_MS",
                "VIDEO_AUTH",
                "VIEWER_TEMPLATE_PATH",
                "RUST_LOG",
            ] {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("HEYGEN_API_KEY", "test-heygen-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.api_key.expose_secret(), "test-heygen-key");
        assert_eq!(config.base_url, "https://api.heygen.com");
        assert_eq!(config.capability, Capability::LiveStreaming);
        assert_eq!(config.default_voice_id, DEFAULT_VOICE_ID);
        assert_eq!(config.avatar_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.video_poll_interval, Duration::from_secs(1));
        assert_eq!(config.video_auth, AuthScheme::ApiKey);
        assert_eq!(config.viewer_template_path, PathBuf::from("./assets/viewer.html"));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("HEYGEN_API_KEY", "custom-key");
            env::set_var("HEYGEN_BASE_URL", "http://localhost:9999");
            env::set_var("AVATAR_MODE", "render");
            env::set_var("DEFAULT_VOICE_ID", "voice-123");
            env::set_var("AVATAR_CACHE_TTL_SECS", "0");
            env::set_var("REQUEST_TIMEOUT_SECS", "5");
            env::set_var("VIDEO_POLL_INTERVAL_MS", "250");
            env::set_var("VIDEO_AUTH", "bearer");
            env::set_var("VIEWER_TEMPLATE_PATH", "/srv/viewer.html");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.capability, Capability::BatchRender);
        assert_eq!(config.default_voice_id, "voice-123");
        assert!(config.avatar_cache_ttl.is_zero());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.video_poll_interval, Duration::from_millis(250));
        assert_eq!(config.video_auth, AuthScheme::Bearer);
        assert_eq!(config.viewer_template_path, PathBuf::from("/srv/viewer.html"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_api_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("HEYGEN_API_KEY")),
            _ => panic!("Expected MissingVar for HEYGEN_API_KEY"),
        }

        unsafe {
            env::set_var("HEYGEN_API_KEY", "   ");
        }
        assert!(matches!(Config::from_env(), Err(ConfigError::MissingVar(_))));
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_mode() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("AVATAR_MODE", "hologram");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, msg) => {
                assert_eq!(var, "AVATAR_MODE");
                assert!(msg.contains("hologram"));
            }
            _ => panic!("Expected InvalidValue for AVATAR_MODE"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_numbers() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("AVATAR_CACHE_TTL_SECS", "five minutes");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "AVATAR_CACHE_TTL_SECS"),
            _ => panic!("Expected InvalidValue for AVATAR_CACHE_TTL_SECS"),
        }

        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("VIDEO_POLL_INTERVAL_MS", "0");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VIDEO_POLL_INTERVAL_MS"),
            _ => panic!("Expected InvalidValue for VIDEO_POLL_INTERVAL_MS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
