//! # Observability Configuration
//!
//! Environment-specific settings for logging, metrics and trace export.

use std::env;
use std::path::PathBuf;

use crate::errors::{AppError, AppResult};

/// Observability configuration for different environments
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// OTLP endpoint for trace export
    pub otlp_endpoint: Option<String>,
    /// Log level for the crate's own targets
    pub log_level: String,
    /// Log format override: "pretty" or "json"
    pub log_format: String,
    /// Whether to enable trace sampling
    pub enable_trace_sampling: bool,
    /// Trace sampling ratio (0.0-1.0)
    pub trace_sampling_ratio: f64,
    /// Whether to install the Prometheus recorder
    pub enable_metrics: bool,
    /// Where the Prometheus exposition text is written at the end of a batch
    pub metrics_output_path: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            otlp_endpoint: None,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            enable_trace_sampling: false,
            trace_sampling_ratio: 1.0,
            enable_metrics: true,
            metrics_output_path: None,
        }
    }
}

impl ObservabilityConfig {
    /// Baseline for an environment name before individual overrides apply
    pub fn for_environment(environment: &str) -> Self {
        match environment {
            "production" => presets::production(),
            "development" => presets::development(),
            other => Self {
                environment: other.to_string(),
                ..Self::default()
            },
        }
    }

    /// Load configuration from environment variables. `ENVIRONMENT` picks the
    /// baseline; other variables override it and fall back to the baseline when
    /// they do not parse.
    pub fn from_env() -> Self {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let defaults = Self::for_environment(environment.trim());
        Self {
            environment: defaults.environment,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.trim().is_empty()),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: env::var("LOG_FORMAT").unwrap_or(defaults.log_format),
            enable_trace_sampling: env::var("ENABLE_TRACE_SAMPLING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enable_trace_sampling),
            trace_sampling_ratio: env::var("TRACE_SAMPLING_RATIO")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.trace_sampling_ratio),
            enable_metrics: env::var("ENABLE_METRICS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enable_metrics),
            metrics_output_path: env::var("METRICS_OUTPUT_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Pretty output in development or when explicitly requested
    pub fn use_pretty_logs(&self) -> bool {
        self.is_development() || self.log_format.eq_ignore_ascii_case("pretty")
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if let Some(endpoint) = &self.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "Invalid OTLP endpoint format: {}",
                    endpoint
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.trace_sampling_ratio) {
            return Err(AppError::Config(format!(
                "Invalid trace sampling ratio: {}",
                self.trace_sampling_ratio
            )));
        }

        if !["trace", "debug", "info", "warn", "error"]
            .contains(&self.log_level.to_lowercase().as_str())
        {
            return Err(AppError::Config(format!(
                "Invalid log level: {}",
                self.log_level
            )));
        }

        if !["json", "pretty"].contains(&self.log_format.to_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "Invalid log format: {} (expected 'json' or 'pretty')",
                self.log_format
            )));
        }

        if self.metrics_output_path.is_some() && !self.enable_metrics {
            return Err(AppError::Config(
                "METRICS_OUTPUT_PATH requires ENABLE_METRICS=true".to_string(),
            ));
        }

        Ok(())
    }
}

/// Environment-specific configuration presets
pub mod presets {
    use super::ObservabilityConfig;

    /// Development configuration: pretty logs, every trace kept
    pub fn development() -> ObservabilityConfig {
        ObservabilityConfig {
            environment: "development".to_string(),
            ..Default::default()
        }
    }

    /// Production configuration: sampled traces, quieter logs
    pub fn production() -> ObservabilityConfig {
        ObservabilityConfig {
            environment: "production".to_string(),
            enable_trace_sampling: true,
            trace_sampling_ratio: 0.1,
            log_level: "warn".to_string(),
            ..Default::default()
        }
    }

    /// Minimal configuration for tests and one-off runs
    pub fn minimal() -> ObservabilityConfig {
        ObservabilityConfig {
            environment: "minimal".to_string(),
            enable_metrics: false,
            log_level: "error".to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.log_level, "info");
        assert!(!config.enable_trace_sampling);
        assert_eq!(config.trace_sampling_ratio, 1.0);
        assert!(config.enable_metrics);
        assert!(config.metrics_output_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ObservabilityConfig::default();

        config.otlp_endpoint = Some("invalid-endpoint".to_string());
        assert!(config.validate().is_err());
        config.otlp_endpoint = Some("http://localhost:4317".to_string());
        assert!(config.validate().is_ok());

        config.trace_sampling_ratio = 1.5;
        assert!(config.validate().is_err());
        config.trace_sampling_ratio = 1.0;

        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
        config.log_level = "info".to_string();

        config.enable_metrics = false;
        config.metrics_output_path = Some(PathBuf::from("metrics.prom"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets() {
        let dev = presets::development();
        assert!(dev.is_development());
        assert!(dev.use_pretty_logs());

        let prod = presets::production();
        assert!(prod.is_production());
        assert!(!prod.use_pretty_logs());
        assert_eq!(prod.trace_sampling_ratio, 0.1);

        let minimal = presets::minimal();
        assert!(!minimal.enable_metrics);
    }

    #[test]
    fn test_environment_selects_baseline() {
        let prod = ObservabilityConfig::for_environment("production");
        assert!(prod.enable_trace_sampling);
        assert_eq!(prod.log_level, "warn");

        let dev = ObservabilityConfig::for_environment("development");
        assert_eq!(dev.log_level, "info");
        assert!(!dev.enable_trace_sampling);

        let staging = ObservabilityConfig::for_environment("staging");
        assert_eq!(staging.environment, "staging");
        assert_eq!(staging.log_level, "info");
        assert!(staging.validate().is_ok());
    }
}
