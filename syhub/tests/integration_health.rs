//! Integration tests for the health collector with mock probes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use syhub::error::HealthCheckError;
use syhub::health::{HealthCollector, ServiceProbe, ServiceState, SystemSampler, SystemStats};

#[derive(Debug)]
struct FixedSampler(SystemStats);

impl SystemSampler for FixedSampler {
    fn sample(&self) -> SystemStats {
        self.0
    }
}

/// Answers from a table; services missing from it fail like a broken
/// service manager would.
#[derive(Debug, Default)]
struct TableProbe {
    states: HashMap<String, ServiceState>,
    calls: AtomicUsize,
}

impl TableProbe {
    fn with(mut self, name: &str, state: ServiceState) -> Self {
        self.states.insert(name.to_string(), state);
        self
    }
}

impl ServiceProbe for TableProbe {
    fn check(&self, service: &str) -> Result<ServiceState, HealthCheckError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.states
            .get(service)
            .copied()
            .ok_or_else(|| HealthCheckError::UnrecognizedOutput {
                service: service.to_string(),
                output: String::new(),
            })
    }
}

fn sampler() -> Arc<FixedSampler> {
    Arc::new(FixedSampler(SystemStats {
        cpu_percent: 17.0,
        memory_percent: 52.5,
    }))
}

#[test]
fn test_each_service_resolved_independently() {
    let probe = Arc::new(
        TableProbe::default()
            .with("hostapd", ServiceState::Active)
            .with("dnsmasq", ServiceState::Inactive)
            .with("nodered", ServiceState::Active),
    );
    let shared: Arc<dyn ServiceProbe> = probe.clone();

    let collector = HealthCollector::new(sampler())
        .with_services(["hostapd", "mosquitto", "dnsmasq", "nodered"], &shared);

    let report = collector.collect();
    let states: Vec<_> = report
        .services
        .iter()
        .map(|s| (s.name.as_str(), s.state))
        .collect();

    assert_eq!(
        states,
        vec![
            ("hostapd", ServiceState::Active),
            ("mosquitto", ServiceState::Unknown),
            ("dnsmasq", ServiceState::Inactive),
            ("nodered", ServiceState::Active),
        ]
    );
    assert_eq!(probe.calls.load(Ordering::Relaxed), 4);
    assert!(!report.all_active());
    assert_eq!(report.system.memory_percent, 52.5);
}

#[test]
fn test_mixed_probes_per_service() {
    let always_up: Arc<dyn ServiceProbe> =
        Arc::new(TableProbe::default().with("victoriametrics", ServiceState::Active));
    let broken: Arc<dyn ServiceProbe> = Arc::new(TableProbe::default());

    let collector = HealthCollector::new(sampler())
        .with_service("victoriametrics", always_up)
        .with_service("flask-dashboard", broken);

    let services = collector.service_status();
    assert_eq!(services[0].state, ServiceState::Active);
    assert_eq!(services[1].state, ServiceState::Unknown);
}

#[test]
fn test_no_caching_between_collections() {
    let probe = Arc::new(TableProbe::default().with("avahi-daemon", ServiceState::Active));
    let shared: Arc<dyn ServiceProbe> = probe.clone();
    let collector = HealthCollector::new(sampler()).with_services(["avahi-daemon"], &shared);

    collector.collect();
    collector.collect();
    collector.collect();
    assert_eq!(probe.calls.load(Ordering::Relaxed), 3);
}

#[test]
fn test_report_serializes_for_health_endpoint() {
    let shared: Arc<dyn ServiceProbe> =
        Arc::new(TableProbe::default().with("mosquitto", ServiceState::Active));
    let collector = HealthCollector::new(sampler()).with_services(["mosquitto"], &shared);

    let json = serde_json::to_value(collector.collect()).unwrap();
    assert_eq!(json["services"][0]["name"], "mosquitto");
    assert_eq!(json["services"][0]["state"], "active");
    assert_eq!(json["system"]["cpu_percent"], 17.0);
}

#[cfg(feature = "http-probe")]
mod http_probe {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::sync::Arc;
    use std::thread;

    use syhub::error::HealthCheckError;
    use syhub::health::{HealthCollector, HttpProbe, ServiceProbe, ServiceState};

    use super::sampler;

    /// Serves a single request with `status_line`, then closes.
    fn serve_once(status_line: &'static str) -> (SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(&stream);
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line.trim().is_empty() {
                    break;
                }
            }
            let mut stream = &stream;
            write!(
                stream,
                "HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
            stream.flush().unwrap();
        });

        (addr, handle)
    }

    /// Returns an address nothing is listening on.
    fn closed_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[test]
    fn test_success_status_is_active() {
        let (addr, server) = serve_once("200 OK");
        let probe = HttpProbe::new(format!("http://{addr}/health")).unwrap();

        assert_eq!(probe.check("victoriametrics").unwrap(), ServiceState::Active);
        server.join().unwrap();
    }

    #[test]
    fn test_error_status_is_inactive() {
        let (addr, server) = serve_once("503 Service Unavailable");
        let probe = HttpProbe::new(format!("http://{addr}/health")).unwrap();

        assert_eq!(probe.check("nodered").unwrap(), ServiceState::Inactive);
        server.join().unwrap();
    }

    #[test]
    fn test_refused_connection_is_error() {
        let probe = HttpProbe::new(format!("http://{}/health", closed_addr())).unwrap();

        let err = probe.check("victoriametrics").unwrap_err();
        assert!(matches!(err, HealthCheckError::Http { ref service, .. } if service == "victoriametrics"));
    }

    #[test]
    fn test_collector_maps_http_outcomes() {
        let (up_addr, up_server) = serve_once("204 No Content");
        let (down_addr, down_server) = serve_once("500 Internal Server Error");

        let up: Arc<dyn ServiceProbe> =
            Arc::new(HttpProbe::new(format!("http://{up_addr}/health")).unwrap());
        let down: Arc<dyn ServiceProbe> =
            Arc::new(HttpProbe::new(format!("http://{down_addr}/")).unwrap());
        let unreachable: Arc<dyn ServiceProbe> =
            Arc::new(HttpProbe::new(format!("http://{}/", closed_addr())).unwrap());

        let collector = HealthCollector::new(sampler())
            .with_service("victoriametrics", up)
            .with_service("nodered", down)
            .with_service("flask-dashboard", unreachable);

        let states: Vec<_> = collector
            .service_status()
            .into_iter()
            .map(|status| status.state)
            .collect();
        assert_eq!(
            states,
            vec![
                ServiceState::Active,
                ServiceState::Inactive,
                ServiceState::Unknown
            ]
        );

        up_server.join().unwrap();
        down_server.join().unwrap();
    }
}
