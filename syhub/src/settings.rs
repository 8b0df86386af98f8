//! Dashboard settings.
//!
//! Settings are read once at startup from a YAML file, with environment
//! variables layered on top, and are never reloaded. Environment overrides
//! use the `SYHUB_` prefix and `__` as the nesting separator, e.g.
//! `SYHUB_DASHBOARD__PORT=8080`.
//!
//! # Example
//!
//! ```yaml
//! project:
//!   name: Plantomio
//! dashboard:
//!   port: 5000
//! telemetry:
//!   max_points: 10
//!   allowed_fields: [temperature, pH, ORP, TDS, EC, distance]
//! services:
//!   - name: mosquitto
//!   - name: victoriametrics
//!     health_url: http://localhost:8428/health
//! thresholds:
//!   - { field: temperature, min: 10.0, max: 30.0 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::alert::Threshold;
use crate::error::{Result, SettingsError};
use crate::store::DEFAULT_MAX_POINTS;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "SYHUB";

/// Services checked when the settings name none.
pub const DEFAULT_SERVICES: [&str; 7] = [
    "hostapd",
    "dnsmasq",
    "avahi-daemon",
    "mosquitto",
    "victoriametrics",
    "nodered",
    "flask-dashboard",
];

/// Top-level dashboard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Project identity.
    pub project: ProjectSettings,
    /// HTTP server settings.
    #[serde(default)]
    pub dashboard: DashboardSettings,
    /// Telemetry retention and feed settings.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    /// Services to health-check, in display order.
    #[serde(default = "default_services")]
    pub services: Vec<ServiceSettings>,
    /// Acceptable ranges per telemetry field.
    #[serde(default)]
    pub thresholds: Vec<ThresholdSettings>,
}

/// Project identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Name shown on the dashboard.
    pub name: String,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSettings {
    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl DashboardSettings {
    /// Returns `bind:port`.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Telemetry retention and feed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// Samples retained per metric key.
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    /// Address the line-delimited JSON feed listens on.
    #[serde(default = "default_feed_addr")]
    pub feed_addr: String,
    /// If set, only these fields are ingested.
    #[serde(default)]
    pub allowed_fields: Option<Vec<String>>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
            feed_addr: default_feed_addr(),
            allowed_fields: None,
        }
    }
}

/// One service to health-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service (systemd unit) name.
    pub name: String,
    /// If set, the service is checked over HTTP instead of `systemctl`.
    #[serde(default)]
    pub health_url: Option<String>,
}

/// Acceptable range for one telemetry field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSettings {
    /// Telemetry field name.
    pub field: String,
    /// Lowest acceptable value.
    pub min: f64,
    /// Highest acceptable value.
    pub max: f64,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_points() -> usize {
    DEFAULT_MAX_POINTS
}

fn default_feed_addr() -> String {
    "127.0.0.1:1884".to_string()
}

fn default_services() -> Vec<ServiceSettings> {
    DEFAULT_SERVICES
        .iter()
        .map(|name| ServiceSettings {
            name: (*name).to_string(),
            health_url: None,
        })
        .collect()
}

impl Settings {
    /// Loads settings from a YAML file plus `SYHUB_` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Load`] if the file cannot be read or parsed,
    /// or [`SettingsError::Invalid`] if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).format(FileFormat::Yaml))
            .add_source(Self::environment())
            .build()
            .map_err(SettingsError::from)?;
        Self::from_config(config)
    }

    /// Parses settings from a YAML string, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if parsing or validation fails.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .map_err(SettingsError::from)?;
        Self::from_config(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn from_config(config: Config) -> Result<Self> {
        let settings: Self = config.try_deserialize().map_err(SettingsError::from)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            return Err(invalid("project.name must not be empty"));
        }
        if self.telemetry.max_points == 0 {
            return Err(invalid("telemetry.max_points must be at least 1"));
        }
        if let Some(service) = self.services.iter().find(|s| s.name.trim().is_empty()) {
            return Err(invalid(format!(
                "service names must not be empty (health_url: {:?})",
                service.health_url
            )));
        }
        for threshold in &self.thresholds {
            if threshold.field.is_empty() {
                return Err(invalid("threshold field must not be empty"));
            }
            if threshold.min.is_nan() || threshold.max.is_nan() || threshold.min > threshold.max {
                return Err(invalid(format!(
                    "threshold for '{}' has min {} above max {}",
                    threshold.field, threshold.min, threshold.max
                )));
            }
        }
        Ok(())
    }

    /// Returns the thresholds keyed by field.
    pub fn thresholds(&self) -> BTreeMap<String, Threshold> {
        self.thresholds
            .iter()
            .map(|t| (t.field.clone(), Threshold::new(t.min, t.max)))
            .collect()
    }
}

fn invalid(reason: impl Into<String>) -> crate::error::SyhubError {
    SettingsError::Invalid {
        reason: reason.into(),
    }
    .into()
}
