//! System and service health collection.
//!
//! Health is gathered on demand, once per request, and never cached. It has
//! two halves:
//!
//! - [`SystemStats`]: global CPU and memory utilization from a
//!   [`SystemSampler`]
//! - [`ServiceStatus`]: one [`ServiceState`] per configured service, resolved
//!   through a [`ServiceProbe`]
//!
//! Every service is probed independently. A probe that fails resolves that
//! one service to [`ServiceState::Unknown`]; the others are unaffected.
//!
//! # Probes
//!
//! - [`SystemctlProbe`] asks the service manager via `systemctl is-active`
//! - `HttpProbe` (feature `http-probe`) calls an HTTP health endpoint
//!
//! Both sit behind the [`ServiceProbe`] trait, so tests substitute their own.

use std::fmt;
use std::process::Command;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::error::HealthCheckError;

/// Resolved state of one external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// The service is running.
    Active,
    /// The service is known to the manager but not running.
    Inactive,
    /// The status could not be determined.
    Unknown,
}

impl ServiceState {
    /// Returns the lowercase name used in pages and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability to resolve the state of a named service.
pub trait ServiceProbe: fmt::Debug + Send + Sync {
    /// Returns the current state of `service`.
    ///
    /// # Errors
    ///
    /// Returns [`HealthCheckError`] if the state cannot be determined.
    fn check(&self, service: &str) -> Result<ServiceState, HealthCheckError>;
}

/// Probes services with `systemctl is-active <name>`.
#[derive(Debug, Clone)]
pub struct SystemctlProbe {
    program: String,
}

impl SystemctlProbe {
    /// Creates a probe that runs `systemctl` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("systemctl")
    }

    /// Creates a probe that runs `program` instead of `systemctl`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemctlProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceProbe for SystemctlProbe {
    fn check(&self, service: &str) -> Result<ServiceState, HealthCheckError> {
        // `is-active` exits non-zero for inactive units, so only the printed
        // state is meaningful.
        let output = Command::new(&self.program)
            .arg("is-active")
            .arg(service)
            .output()
            .map_err(|source| HealthCheckError::Spawn {
                service: service.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_is_active(&stdout).ok_or_else(|| HealthCheckError::UnrecognizedOutput {
            service: service.to_string(),
            output: stdout.trim().to_string(),
        })
    }
}

/// Maps `systemctl is-active` output to a [`ServiceState`].
///
/// Returns `None` for output that names no known unit state, including
/// systemd's own `unknown`.
pub fn parse_is_active(output: &str) -> Option<ServiceState> {
    match output.lines().next().map(str::trim)? {
        "active" | "reloading" => Some(ServiceState::Active),
        "inactive" | "failed" | "activating" | "deactivating" | "maintenance" => {
            Some(ServiceState::Inactive)
        }
        _ => None,
    }
}

/// Probes a service by calling its HTTP health endpoint.
///
/// A 2xx response is `Active`, any other status is `Inactive`, and a
/// transport failure is an error (and so `Unknown`).
#[cfg(feature = "http-probe")]
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http-probe")]
impl HttpProbe {
    /// Timeout applied to each health request.
    pub const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

    /// Creates a probe for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`HealthCheckError::Http`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, HealthCheckError> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|source| HealthCheckError::Http {
                service: url.clone(),
                source,
            })?;
        Ok(Self { url, client })
    }
}

#[cfg(feature = "http-probe")]
impl ServiceProbe for HttpProbe {
    fn check(&self, service: &str) -> Result<ServiceState, HealthCheckError> {
        let response =
            self.client
                .get(&self.url)
                .send()
                .map_err(|source| HealthCheckError::Http {
                    service: service.to_string(),
                    source,
                })?;

        if response.status().is_success() {
            Ok(ServiceState::Active)
        } else {
            Ok(ServiceState::Inactive)
        }
    }
}

/// Global CPU and memory utilization, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SystemStats {
    /// CPU utilization across all cores, 0–100.
    pub cpu_percent: f32,
    /// Share of physical memory in use, 0–100.
    pub memory_percent: f32,
}

/// Source of [`SystemStats`].
pub trait SystemSampler: fmt::Debug + Send + Sync {
    /// Samples current utilization.
    fn sample(&self) -> SystemStats;
}

/// [`SystemSampler`] backed by `sysinfo`.
///
/// CPU usage is measured between consecutive samples; the first sample
/// measures from construction.
pub struct SysinfoSampler {
    system: Mutex<sysinfo::System>,
}

impl SysinfoSampler {
    /// Creates a sampler and takes the CPU baseline.
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SysinfoSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysinfoSampler").finish_non_exhaustive()
    }
}

impl SystemSampler for SysinfoSampler {
    #[allow(clippy::cast_precision_loss)] // Percentages are display-only
    fn sample(&self) -> SystemStats {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu_usage();
        system.refresh_memory();

        let total = system.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (system.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        SystemStats {
            cpu_percent: system.global_cpu_usage(),
            memory_percent,
        }
    }
}

/// State of one configured service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Service name as configured.
    pub name: String,
    /// Resolved state.
    pub state: ServiceState,
}

/// Everything the health collector gathered for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// System utilization.
    pub system: SystemStats,
    /// Service states, in configured order.
    pub services: Vec<ServiceStatus>,
}

impl HealthReport {
    /// Returns `true` if every service is active.
    pub fn all_active(&self) -> bool {
        self.services
            .iter()
            .all(|service| service.state == ServiceState::Active)
    }
}

#[derive(Debug, Clone)]
struct ServiceCheck {
    name: String,
    probe: Arc<dyn ServiceProbe>,
}

/// Gathers system and service health on demand.
#[derive(Debug, Clone)]
pub struct HealthCollector {
    sampler: Arc<dyn SystemSampler>,
    services: Vec<ServiceCheck>,
}

impl HealthCollector {
    /// Creates a collector with no services.
    pub fn new(sampler: Arc<dyn SystemSampler>) -> Self {
        Self {
            sampler,
            services: Vec::new(),
        }
    }

    /// Adds a service resolved through `probe`.
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, probe: Arc<dyn ServiceProbe>) -> Self {
        self.services.push(ServiceCheck {
            name: name.into(),
            probe,
        });
        self
    }

    /// Adds every name in `names`, all resolved through the same `probe`.
    #[must_use]
    pub fn with_services<I, S>(mut self, names: I, probe: &Arc<dyn ServiceProbe>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.with_service(name, Arc::clone(probe));
        }
        self
    }

    /// Returns the configured service names, in order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.services.iter().map(|check| check.name.as_str())
    }

    /// Samples system utilization.
    pub fn system_stats(&self) -> SystemStats {
        self.sampler.sample()
    }

    /// Resolves every configured service.
    pub fn service_status(&self) -> Vec<ServiceStatus> {
        self.services
            .iter()
            .map(|check| {
                let state = match check.probe.check(&check.name) {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::debug!(service = %check.name, "status unknown: {e}");
                        ServiceState::Unknown
                    }
                };
                ServiceStatus {
                    name: check.name.clone(),
                    state,
                }
            })
            .collect()
    }

    /// Collects system stats and every service status.
    pub fn collect(&self) -> HealthReport {
        HealthReport {
            system: self.system_stats(),
            services: self.service_status(),
        }
    }
}
