//! Stream an E4 wristband and report per-channel sample rates
//!
//! Run with: cargo run --example e4_stream [BRIDGE_ADDR] [DEVICE_ID] [DURATION_S]
//!
//! Examples:
//!   cargo run --example e4_stream                              # 127.0.0.6:3002, D931CD, 30s
//!   cargo run --example e4_stream 127.0.0.1:28000 A01B2C 60
//!
//! Set RUST_LOG=e4_streamer=debug to see handshake replies and dropped lines.
//!
//! If the stream fails, the demo reconnects (up to a few attempts) until the
//! duration has elapsed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use e4_streamer::channel::{ChannelDescriptor, Demultiplexer};
use e4_streamer::protocol::Modality;
use e4_streamer::{AdapterConfig, E4Adapter};
use tracing_subscriber::EnvFilter;

const MAX_ATTEMPTS: u32 = 5;
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Per-modality sample counters shared with the sinks
#[derive(Default)]
struct Counters {
    samples: [AtomicU64; 4],
}

impl Counters {
    fn report(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let mut line = format!(" Duration: {:6.2}s", secs);
        for modality in Modality::ALL {
            let count = self.samples[modality.index()].load(Ordering::Relaxed);
            let channel = ChannelDescriptor::for_modality(modality);
            line.push_str(&format!(
                " | {}: {:6.2} Hz ({:4} samples)",
                channel,
                count as f64 / secs,
                count
            ));
        }
        println!("{}", line);
    }
}

/// Counting sink per modality
fn counting_demux(counters: &Arc<Counters>) -> Demultiplexer {
    let mut demux = Demultiplexer::new();
    for modality in Modality::ALL {
        let counters = Arc::clone(counters);
        let sink = move |_: &ChannelDescriptor, _: f64, _: &[f64]| {
            counters.samples[modality.index()].fetch_add(1, Ordering::Relaxed);
        };
        if let Err(e) = demux.register(modality, ChannelDescriptor::for_modality(modality), sink) {
            eprintln!("Failed to register {}: {}", modality, e);
        }
    }
    demux
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = AdapterConfig::default();
    if let Some(addr) = args.get(1) {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => config = config.bridge(addr),
            Err(e) => {
                eprintln!("Invalid bridge address '{}': {}", addr, e);
                std::process::exit(2);
            }
        }
    }
    if let Some(device_id) = args.get(2) {
        config = config.device_id(device_id.as_str());
    }
    let duration = args
        .get(3)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30));

    println!(
        "Streaming device {} from {} for {:?}",
        config.device_id, config.bridge_addr, duration
    );

    let counters = Arc::new(Counters::default());
    let started = Instant::now();
    let deadline = started + duration;
    let mut attempts = 0;

    while Instant::now() < deadline && attempts < MAX_ATTEMPTS {
        attempts += 1;

        let mut adapter = E4Adapter::new(config.clone(), counting_demux(&counters));
        if !adapter.connect().await {
            eprintln!("Connect attempt {}/{} failed", attempts, MAX_ATTEMPTS);
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }

        let (stop, mut task) = adapter.spawn();
        let mut ticker = tokio::time::interval(REPORT_INTERVAL);
        ticker.tick().await;

        let mut interrupted = false;
        let finished = loop {
            tokio::select! {
                result = &mut task => break result,
                _ = ticker.tick() => {
                    counters.report(started.elapsed());
                    if Instant::now() >= deadline {
                        stop.stop();
                    }
                }
                _ = tokio::signal::ctrl_c(), if !interrupted => {
                    println!("Interrupted");
                    interrupted = true;
                    stop.stop();
                }
            }
        };

        match finished {
            Ok(Ok(adapter)) => {
                let stats = adapter.stats();
                println!(
                    "Stopped: {} bytes, {} samples, {} dropped lines",
                    stats.bytes_received,
                    stats.total_dispatched(),
                    stats.dropped_lines()
                );
                for modality in adapter.connection().subscriptions() {
                    println!("  {}: {:6.2} Hz this session", modality, stats.rate_hz(*modality));
                }
                break;
            }
            Ok(Err(e)) if !interrupted => eprintln!("Stream failed: {}; reconnecting", e),
            Ok(Err(e)) => {
                eprintln!("Stream failed: {}", e);
                break;
            }
            Err(e) => {
                eprintln!("Stream task panicked: {}", e);
                break;
            }
        }
    }

    counters.report(started.elapsed());
    println!("Done!");
}
