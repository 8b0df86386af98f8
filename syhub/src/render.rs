//! HTML rendering of the dashboard page.
//!
//! Rendering is a pure function of its inputs: a [`Page`] borrows a
//! snapshot, the health results and any alerts, and turns them into an HTML
//! string. No I/O happens here and nothing is retained afterwards.
//!
//! The template is compiled into the binary and rendered with minijinja.
//! Auto-escaping is on, so metric keys and string samples from the feed
//! cannot inject markup. The environment is built once per process.

use std::sync::OnceLock;

use minijinja::{Environment, context};
use serde::Serialize;

use crate::alert::Alert;
use crate::error::{RenderError, Result};
use crate::health::{ServiceStatus, SystemStats};
use crate::snapshot::Snapshot;
use crate::Sample;

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const INDEX_NAME: &str = "index.html";

static ENVIRONMENT: OnceLock<Environment<'static>> = OnceLock::new();

/// Returns the shared template environment, compiling the template on first
/// use.
fn environment() -> Result<&'static Environment<'static>> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    env.add_template(INDEX_NAME, INDEX_TEMPLATE)
        .map_err(RenderError::from)?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// Inputs for one rendered page.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    /// Project name shown in the title and header.
    pub project_name: &'a str,
    /// Telemetry to display.
    pub snapshot: &'a Snapshot,
    /// System utilization.
    pub system: &'a SystemStats,
    /// Service states, in display order.
    pub services: &'a [ServiceStatus],
    /// Out-of-range readings to highlight.
    pub alerts: &'a [Alert],
}

/// One telemetry row as handed to the template.
#[derive(Debug, Serialize)]
struct MetricRow<'a> {
    key: &'a str,
    latest: String,
    history: Vec<String>,
    count: usize,
    alerting: bool,
}

impl<'a> Page<'a> {
    /// Creates a page with no alerts.
    pub fn new(
        project_name: &'a str,
        snapshot: &'a Snapshot,
        system: &'a SystemStats,
        services: &'a [ServiceStatus],
    ) -> Self {
        Self {
            project_name,
            snapshot,
            system,
            services,
            alerts: &[],
        }
    }

    /// Sets the alerts to highlight.
    #[must_use]
    pub fn with_alerts(mut self, alerts: &'a [Alert]) -> Self {
        self.alerts = alerts;
        self
    }

    /// Renders the page to HTML.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if the template fails to render.
    pub fn render(&self) -> Result<String> {
        let template = environment()?
            .get_template(INDEX_NAME)
            .map_err(RenderError::from)?;

        let rows: Vec<MetricRow<'_>> = self
            .snapshot
            .iter()
            .map(|(key, samples)| MetricRow {
                key,
                latest: samples.last().map(display_sample).unwrap_or_default(),
                history: samples.iter().map(display_sample).collect(),
                count: samples.len(),
                alerting: self.alerts.iter().any(|alert| alert.field == key),
            })
            .collect();

        let html = template
            .render(context! {
                project_name => self.project_name,
                last_update => self.snapshot.last_update(),
                telemetry => rows,
                system => self.system,
                services => self.services,
                alerts => self.alerts,
            })
            .map_err(RenderError::from)?;
        Ok(html)
    }
}

/// Renders a page with no alerts.
///
/// # Errors
///
/// Returns [`RenderError::Template`] if the template fails to render.
pub fn render(
    project_name: &str,
    snapshot: &Snapshot,
    system: &SystemStats,
    services: &[ServiceStatus],
) -> Result<String> {
    Page::new(project_name, snapshot, system, services).render()
}

/// Formats a sample for display: strings unquoted, everything else as
/// compact JSON.
pub fn display_sample(sample: &Sample) -> String {
    match sample {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
