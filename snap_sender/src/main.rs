//! Capture one still from a camera or file and send it to the detect server.
//!
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use env_logger::TimestampPrecision;
use snap_sender::{
    sensors::{parse_resolution, FileSource, StillSource},
    transport::{post_over_http, send_over_socket},
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    /// Length-delimited frames on the data socket
    Socket,
    /// POST to the HTTP capture endpoint
    Http,
}

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Video device to capture from
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// Send this image file instead of capturing from the device
    #[clap(long)]
    file: Option<PathBuf>,

    /// Pixel format of the device, must deliver encoded frames
    #[clap(long, default_value = "MJPG")]
    format: String,

    /// Capture resolution as WIDTHxHEIGHT, defaults to the largest supported
    #[clap(long, value_parser = parse_resolution)]
    resolution: Option<(u32, u32)>,

    /// Frames to drop before the still is taken
    #[clap(long, default_value_t = 3)]
    warmup_frames: usize,

    /// How to deliver the still
    #[clap(long, value_enum, default_value = "socket")]
    transport: Transport,

    /// Address of the data socket of the detect server
    #[clap(long, default_value = "127.0.0.1:3001")]
    socket_address: String,

    /// Address of the HTTP server of the detect server
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let mut source = open_source(&args)?;
    let name = source.name();
    let data = source.capture()?;
    log::info!("Captured {} bytes from {}", data.len(), name);

    match args.transport {
        Transport::Socket => send_over_socket(&args.socket_address, &name, data).await?,
        Transport::Http => post_over_http(&args.server_address, data).await?,
    }
    log::info!("Capture delivered");

    Ok(())
}

fn open_source(args: &Args) -> Result<Box<dyn StillSource>> {
    match &args.file {
        Some(path) => Ok(Box::new(FileSource::new(path))),
        None => open_camera(args),
    }
}

#[cfg(feature = "v4l")]
fn open_camera(args: &Args) -> Result<Box<dyn StillSource>> {
    let camera = snap_sender::sensors::V4lCamera::open(
        &args.device,
        &args.format,
        args.resolution,
        args.warmup_frames,
    )?;

    Ok(Box::new(camera))
}

#[cfg(not(feature = "v4l"))]
fn open_camera(args: &Args) -> Result<Box<dyn StillSource>> {
    anyhow::bail!(
        "built without camera support, cannot open {} (enable feature `v4l` or pass --file)",
        args.device
    )
}
