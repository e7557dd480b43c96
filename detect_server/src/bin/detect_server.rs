//! Detect server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use detect_server::{
    annotate::Annotator,
    config::ModelConfig,
    data_socket::spawn_data_socket,
    endpoints::router,
    labels::Labels,
    nn::YoloModel,
    state::AppState,
    utils::resolve_model_path,
};
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the page on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Address of the data socket receiving captures from `snap_sender`
    #[clap(long, default_value = "127.0.0.1:3001")]
    socket_address: String,

    /// YOLOv5 network exported to ONNX
    #[clap(long, default_value = "yolov5s.onnx")]
    model_path: PathBuf,

    /// Where to download the model from if it is not found locally
    #[clap(long)]
    model_url: Option<String>,

    /// Category names, one per line. Defaults to the COCO names
    #[clap(long)]
    labels_path: Option<PathBuf>,

    /// TrueType font for the box labels
    #[clap(long, default_value = "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf")]
    font_path: PathBuf,

    /// Side length of the square network input
    #[clap(long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(1..))]
    input_size: u32,

    /// Initial confidence threshold
    #[clap(long, default_value_t = 0.25)]
    confidence: f32,

    /// Initial IoU threshold of the non-maximum-suppression
    #[clap(long, default_value_t = 0.45)]
    overlap: f32,

    /// Suppress overlapping boxes across categories
    #[clap(long)]
    class_agnostic: bool,

    /// Allow several categories per box
    #[clap(long)]
    multi_label: bool,

    /// Maximum number of detections per image
    #[clap(long, default_value_t = 1000)]
    max_detections: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let mut config = ModelConfig::default()
        .with_confidence_threshold(args.confidence)
        .with_overlap_threshold(args.overlap);
    config.class_agnostic = args.class_agnostic;
    config.multi_label = args.multi_label;
    config.max_detections = args.max_detections;
    log::info!("Starting with {:?}", config);

    let labels = match &args.labels_path {
        Some(path) => Labels::from_file(path)?,
        None => Labels::coco(),
    };

    // Build the detector once, it is shared by all events of the session
    let model_path = resolve_model_path(&args.model_path, args.model_url.as_deref()).await?;
    let detector = Arc::new(YoloModel::new(&model_path, args.input_size, labels)?);
    let annotator = Annotator::with_font_file(&args.font_path);

    let state = Arc::new(AppState::new(config, detector, annotator));

    // Create socket to receive captures via network
    spawn_data_socket(Arc::clone(&state), &args.socket_address).await?;

    // Build HTTP server with endpoints
    let app = router(state);

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
