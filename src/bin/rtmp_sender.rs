use clap::Parser;
use log::{error, info};
use rtmp_ingest::sender::{publish, PublishSettings};
use rtmp_ingest::CancellationToken;

/// Streams an animated H.264 test pattern to an RTMP server.
#[derive(Parser, Debug)]
#[command(author, version, about = "RTMP test-pattern sender", long_about = None)]
struct Args {
    /// Target URL, e.g. rtmp://127.0.0.1:1935/live
    url: String,

    #[arg(long, default_value_t = 1920)]
    width: u32,

    #[arg(long, default_value_t = 1080)]
    height: u32,

    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Bit rate in bits per second
    #[arg(long, default_value_t = 4_000_000)]
    bitrate: usize,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("User interrupt");
        interrupt.cancel();
    }) {
        error!("Failed to set signal handler: {e}");
    }

    let settings = PublishSettings {
        width: args.width,
        height: args.height,
        fps: args.fps,
        bitrate: args.bitrate,
        max_frames: args.frames,
    };

    match publish(&args.url, &settings, &cancel) {
        Ok(sent) => info!("Exiting after {sent} frames"),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
