use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info, warn};
use rtmp_ingest::{CancellationToken, OutputFormat, RtmpServer};

/// Listens for an RTMP publisher and decodes its video stream.
#[derive(Parser, Debug)]
#[command(author, version, about = "RTMP ingest server", long_about = None)]
struct Args {
    /// Listening URL
    #[arg(short, long, default_value = "rtmp://0.0.0.0:1935/live")]
    url: String,

    /// Transport buffer in milliseconds
    #[arg(long, default_value_t = 1000)]
    buffer_ms: u64,

    /// Packet queue capacity between reader and decoder
    #[arg(long, default_value_t = 64)]
    queue_size: usize,

    /// Give up waiting for a publisher after this many seconds (retried until stopped)
    #[arg(long)]
    listen_timeout: Option<u64>,

    /// Output pixel format (bgr24, rgb24, bgra, rgba, gray)
    #[arg(short, long, default_value_t = OutputFormat::Bgr24)]
    format: OutputFormat,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let mut builder = RtmpServer::builder()
        .url(&args.url)
        .buffer_time(Duration::from_millis(args.buffer_ms))
        .queue_size(args.queue_size)
        .output_format(args.format);
    if let Some(secs) = args.listen_timeout {
        builder = builder.listen_timeout(Duration::from_secs(secs));
    }

    let server = match builder.build() {
        Ok(server) => server,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let images = Arc::new(AtomicU64::new(0));
    let started = Arc::new(std::sync::Mutex::new(Instant::now()));

    let counter = images.clone();
    let since = started.clone();
    server.set_connected_handler(move |info| {
        counter.store(0, Ordering::Relaxed);
        if let Ok(mut since) = since.lock() {
            *since = Instant::now();
        }
        info!("Connected: {info}");
    });

    let counter = images.clone();
    let since = started.clone();
    server.set_disconnected_handler(move || {
        let count = counter.load(Ordering::Relaxed);
        let elapsed = since.lock().map(|since| since.elapsed()).unwrap_or_default();
        info!(
            "Disconnected after {count} images in {:.1}s",
            elapsed.as_secs_f64()
        );
    });

    let counter = images.clone();
    server.set_image_handler(move |image| {
        let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 100 == 0 {
            info!(
                "Decoded {count} images (last #{} {} {})",
                image.sequence(),
                image.resolution(),
                image.format()
            );
        }
    });

    server.set_error_handler(|e| warn!("{e}"));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown signal received, stopping server");
        interrupt.cancel();
    }) {
        error!("Failed to set signal handler: {e}");
    }

    if let Err(e) = server.start() {
        error!("{e}");
        std::process::exit(1);
    }

    while !cancel.sleep(Duration::from_millis(100)) {}

    server.stop();
    info!("Total images decoded: {}", images.load(Ordering::Relaxed));
}
