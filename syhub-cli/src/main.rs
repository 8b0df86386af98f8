//! CLI for a syhub dashboard.
//!
//! Provides commands for reading the latest telemetry from a running
//! dashboard, publishing telemetry into its feed, and benchmarking the
//! store's append path.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use syhub::SeriesStore;
use syhub::render::display_sample;
use syhub::snapshot::LAST_UPDATE_FIELD;

/// syhub — inspect and feed a sensor hub dashboard.
#[derive(Parser)]
#[command(name = "syhub", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the latest value of every metric.
    Latest {
        /// Base URL of the dashboard.
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        url: String,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Send line-delimited JSON telemetry to the dashboard feed.
    Publish {
        /// Address of the telemetry feed.
        #[arg(long, default_value = "127.0.0.1:1884")]
        addr: String,

        /// File of JSON messages, one per line (stdin if omitted).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Delay between messages in milliseconds.
        #[arg(long, default_value = "0")]
        interval_ms: u64,
    },

    /// Run an append-path microbenchmark.
    Bench {
        /// Number of samples to append.
        #[arg(long, default_value = "1000000")]
        points: u64,

        /// Number of metric keys to spread samples over.
        #[arg(long, default_value = "8")]
        keys: u32,

        /// Samples retained per key.
        #[arg(long, default_value = "10")]
        capacity: usize,
    },
}

/// Output format for telemetry values.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object keyed by metric.
    Json,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Latest { url, format } => cmd_latest(&url, &format),
        Commands::Publish {
            addr,
            file,
            interval_ms,
        } => cmd_publish(&addr, file.as_deref(), Duration::from_millis(interval_ms)),
        Commands::Bench {
            points,
            keys,
            capacity,
        } => cmd_bench(points, keys, capacity),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `syhub latest`.
fn cmd_latest(url: &str, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = format!("{}/api/latest", url.trim_end_matches('/'));
    let response = reqwest::blocking::get(&endpoint)?.error_for_status()?;
    let latest: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&response.text()?)?;

    match format {
        OutputFormat::Csv => print!("{}", latest_csv(&latest)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&latest)?);
        }
    }

    Ok(())
}

/// Formats `/api/latest` as CSV rows, with the capture time as a leading comment.
fn latest_csv(latest: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut out = String::new();
    if let Some(serde_json::Value::String(at)) = latest.get(LAST_UPDATE_FIELD) {
        out.push_str(&format!("# {LAST_UPDATE_FIELD}={at}\n"));
    }
    out.push_str("metric,value\n");
    for (key, value) in latest.iter().filter(|(key, _)| *key != LAST_UPDATE_FIELD) {
        out.push_str(&format!("{key},{}\n", csv_field(&display_sample(value))));
    }
    out
}

/// Quotes a CSV field if it contains a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Implements `syhub publish`.
fn cmd_publish(addr: &str, file: Option<&Path>, interval: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let input: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };

    let mut stream = TcpStream::connect(addr)?;
    let mut sent = 0u64;

    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(line) {
            eprintln!("Warning: sending line that is not valid JSON ({e})");
        }

        writeln!(stream, "{line}")?;
        sent += 1;
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
    stream.flush()?;

    println!("Sent {sent} messages to {addr}");
    Ok(())
}

/// Implements `syhub bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(points: u64, key_count: u32, capacity: usize) -> Result<(), Box<dyn std::error::Error>> {
    if key_count == 0 {
        return Err("--keys must be at least 1".into());
    }

    println!("syhub append-path benchmark");
    println!("  Points: {points}");
    println!("  Keys: {key_count}");
    println!("  Capacity: {capacity}");
    println!();

    let store = SeriesStore::new(capacity)?;
    let keys: Vec<String> = (0..key_count).map(|i| format!("metric_{i}")).collect();
    let points_per_key = points / u64::from(key_count);

    println!("Appending {points} samples across {key_count} keys...");

    let start = Instant::now();

    for i in 0..points_per_key {
        for key in &keys {
            store.append(key, serde_json::json!(i))?;
        }
    }

    let elapsed = start.elapsed();
    let total_appends = points_per_key * u64::from(key_count);
    let ns_per_append = elapsed.as_nanos() as f64 / total_appends.max(1) as f64;
    let appends_per_sec = total_appends as f64 / elapsed.as_secs_f64();

    let snapshot_start = Instant::now();
    let snapshot = store.snapshot();
    let snapshot_elapsed = snapshot_start.elapsed();

    println!();
    println!("Results:");
    println!("  Total appends: {total_appends}");
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_append:.1} ns/append");
    println!("  Throughput: {appends_per_sec:.0} appends/sec");
    println!("  Snapshot of {} keys: {snapshot_elapsed:.3?}", snapshot.len());
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("25.5"), "25.5");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field(r#"{"a":1}"#), r#""{""a"":1}""#);
    }

    #[test]
    fn test_latest_csv_moves_last_update_to_header() {
        let latest = serde_json::json!({
            "EC": 1.2,
            "lastUpdate": "2024-05-01T12:00:00.000Z",
            "deviceID": "hub,1",
        });

        let csv = latest_csv(latest.as_object().unwrap());
        assert_eq!(
            csv,
            "# lastUpdate=2024-05-01T12:00:00.000Z\nmetric,value\nEC,1.2\ndeviceID,\"hub,1\"\n"
        );
    }

    #[test]
    fn test_bench_rejects_zero_keys() {
        assert!(cmd_bench(10, 0, 10).is_err());
    }

    #[test]
    fn test_bench_rejects_zero_capacity() {
        assert!(cmd_bench(10, 1, 0).is_err());
    }
}
