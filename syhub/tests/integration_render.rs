//! End-to-end rendering: ingest, snapshot, evaluate thresholds, render.

use std::sync::Arc;

use syhub::health::{ServiceState, ServiceStatus, SystemStats};
use syhub::{IngestionAdapter, Page, SeriesStore, Settings, evaluate_thresholds};

const SETTINGS: &str = r"
project:
  name: Plantomio
telemetry:
  max_points: 3
services: []
thresholds:
  - { field: temperature, min: 10.0, max: 30.0 }
  - { field: pH, min: 6.0, max: 8.0 }
";

#[test]
fn test_dashboard_page_from_ingested_feed() {
    let settings = Settings::from_yaml_str(SETTINGS).unwrap();
    let store = Arc::new(SeriesStore::new(settings.telemetry.max_points).unwrap());
    let adapter = IngestionAdapter::new(Arc::clone(&store));

    for payload in [
        r#"{"temperature": 24.0, "pH": 6.9}"#,
        r#"{"temperature": 28.5, "pH": 6.8}"#,
        r#"{"temperature": 31.5, "pH": 6.7}"#,
        r#"{"temperature": 32.0, "pH": 6.6}"#,
    ] {
        assert!(adapter.ingest(payload.as_bytes()));
    }

    let snapshot = store.snapshot();
    let alerts = evaluate_thresholds(&snapshot, &settings.thresholds());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].field, "temperature");

    let system = SystemStats {
        cpu_percent: 8.0,
        memory_percent: 33.3,
    };
    let services = vec![ServiceStatus {
        name: "nodered".to_string(),
        state: ServiceState::Inactive,
    }];

    let html = Page::new(&settings.project.name, &snapshot, &system, &services)
        .with_alerts(&alerts)
        .render()
        .unwrap();

    assert!(html.contains("Plantomio"));
    assert!(html.contains("28.5, 31.5, 32.0"));
    assert!(!html.contains("24.0"));
    assert!(html.contains("temperature is 32.0"));
    assert!(html.contains("status-inactive"));
}

#[test]
fn test_render_is_pure() {
    let store = SeriesStore::new(5).unwrap();
    store.append("EC", serde_json::json!(1.1)).unwrap();
    let snapshot = store.snapshot();
    let system = SystemStats::default();

    let first = syhub::render::render("Hub", &snapshot, &system, &[]).unwrap();
    let second = syhub::render::render("Hub", &snapshot, &system, &[]).unwrap();
    assert_eq!(first, second);
}
