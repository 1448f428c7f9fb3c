//! Traffic Sonifier
//!
//! Replays a capture (or generated traffic) through the classifier and plays
//! one tone per admitted packet.
//!
//! Usage:
//!   sonifier [--config PATH] [--speed X] <capture.pcap>
//!   sonifier [--config PATH] --synthetic [--count N]
//!   sonifier --list-devices

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use traffic_sonifier::{
    audio::{
        device::list_output_devices, AudioSink, NullSink, PerTaskSink, SharedStreamSink, ToneBank,
        ToneSynthesizer,
    },
    config::{SinkMode, SonifierConfig},
    dispatch::{Classifier, Dispatcher},
    network::{Pacing, PacketSource, PacketView, PcapReplay, SyntheticTraffic},
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    capture: Option<PathBuf>,
    synthetic: bool,
    count: Option<u64>,
    speed: Option<f64>,
    list_devices: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = Some(iter.next().context("--config needs a path")?.into());
            }
            "--speed" => {
                let value = iter.next().context("--speed needs a value")?;
                let speed: f64 = value.parse().context("Invalid --speed")?;
                if speed <= 0.0 {
                    bail!("--speed must be positive");
                }
                args.speed = Some(speed);
            }
            "--count" => {
                let value = iter.next().context("--count needs a value")?;
                args.count = Some(value.parse().context("Invalid --count")?);
            }
            "--synthetic" => args.synthetic = true,
            "--list-devices" => args.list_devices = true,
            other if other.starts_with('-') => bail!("Unknown option {}", other),
            path => args.capture = Some(path.into()),
        }
    }

    if !args.list_devices && args.capture.is_none() && !args.synthetic {
        bail!("Usage: sonifier [--config PATH] [--speed X] <capture.pcap> | --synthetic [--count N] | --list-devices");
    }
    Ok(args)
}

fn print_devices() {
    println!("\n=== Available Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

fn build_sink(config: &SonifierConfig) -> Result<Arc<dyn AudioSink>> {
    let spec = config.output_spec();
    let sink: Arc<dyn AudioSink> = match config.audio.sink {
        SinkMode::PerTask => Arc::new(PerTaskSink::new(config.audio.device.clone(), spec)),
        SinkMode::Shared => Arc::new(SharedStreamSink::open(
            config.audio.device.clone(),
            spec,
            config.audio.shared_queue_chunks,
        )?),
        SinkMode::Null => Arc::new(NullSink::new()),
    };
    Ok(sink)
}

fn build_source(args: &Args) -> Result<Box<dyn PacketSource>> {
    if let Some(path) = &args.capture {
        let pacing = Pacing::Realtime {
            speed: args.speed.unwrap_or(1.0),
        };
        let replay = PcapReplay::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .with_pacing(pacing);
        tracing::info!("Replaying {} ({:?})", path.display(), replay.link_type());
        return Ok(Box::new(replay));
    }

    let mut traffic = SyntheticTraffic::default();
    if let Some(count) = args.count {
        traffic = traffic.with_limit(count);
    }
    Ok(Box::new(traffic))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;
    if args.list_devices {
        print_devices();
        return Ok(());
    }

    tracing::info!("Starting Traffic Sonifier");

    let config = SonifierConfig::load_or_default(args.config.as_deref())?;
    let tones = config.tone_map();
    let classifier = Classifier::new(tones, config.local_network()?);

    let synth = ToneSynthesizer::new(config.tone_shape())?;
    let bank = if config.synth.precompute {
        ToneBank::precomputed(synth, tones.all_descriptors())
    } else {
        ToneBank::live(synth)
    };

    let sink = build_sink(&config)?;
    let dispatcher = Arc::new(Dispatcher::new(
        classifier,
        config.limits(),
        Arc::new(bank),
        sink,
    )?);

    let mut source = build_source(&args)?;
    let stop = Arc::new(AtomicBool::new(false));

    let capture_dispatcher = dispatcher.clone();
    let capture_stop = stop.clone();
    let mut capture = tokio::task::spawn_blocking(move || {
        tracing::info!("Listening on {}", source.name());
        source.run(&capture_stop, &mut |packet: &PacketView<'_>| {
            capture_dispatcher.handle(packet);
        })
    });

    tracing::info!("Press Ctrl+C to stop");
    let mut stats_timer = tokio::time::interval(STATS_INTERVAL);
    stats_timer.tick().await;

    let delivered = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                stop.store(true, Ordering::Relaxed);
                break capture.await;
            }
            finished = &mut capture => {
                break finished;
            }
            _ = stats_timer.tick() => {
                let stats = dispatcher.stats();
                tracing::info!(
                    "Packets: {}, tones: {} accepted / {} dropped, played: {}, failed: {}, in flight: {}",
                    stats.packets,
                    stats.accepted,
                    stats.dropped,
                    stats.played,
                    stats.failed,
                    dispatcher.outstanding()
                );
            }
        }
    };

    match delivered.context("Capture task failed")? {
        Ok(count) => tracing::info!("Capture finished after {} packets", count),
        Err(e) => tracing::error!("Capture error: {}", e),
    }

    let grace = config.shutdown_grace();
    match Arc::try_unwrap(dispatcher) {
        Ok(dispatcher) => {
            let stats = dispatcher.stats();
            let report = dispatcher.shutdown(grace);
            tracing::info!(
                "Stopped after {} packets: {} played, {} dropped, {} abandoned",
                stats.packets,
                stats.played,
                stats.dropped,
                report.outstanding_tasks
            );
        }
        Err(_) => tracing::warn!("Dispatcher still shared at exit, skipping graceful shutdown"),
    }

    Ok(())
}
