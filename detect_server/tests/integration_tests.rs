use std::{
    io::Cursor,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use detect_server::{
    annotate::Annotator,
    capture::encode_jpeg,
    config::ModelConfig,
    detection::{Detection, DetectionResult},
    endpoints::router,
    error::SnapshotError,
    nn::Detector,
    render::render_page,
    session::{Event, Phase, Session},
    state::AppState,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use reqwest::{header, redirect::Policy, Client, StatusCode};

/// Detector returning a fixed result and counting its invocations.
struct StubDetector {
    detections: DetectionResult,
    calls: AtomicUsize,
    seen_configs: std::sync::Mutex<Vec<ModelConfig>>,
}

impl StubDetector {
    fn new(detections: DetectionResult) -> Self {
        Self {
            detections,
            calls: AtomicUsize::new(0),
            seen_configs: std::sync::Mutex::new(vec![]),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for StubDetector {
    fn detect(&self, _image: &RgbImage, config: &ModelConfig) -> Result<DetectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_configs.lock().unwrap().push(config.clone());
        Ok(self.detections.clone())
    }

    fn category_name(&self, category_id: usize) -> Option<&str> {
        match category_id {
            0 => Some("person"),
            2 => Some("car"),
            _ => None,
        }
    }
}

struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _image: &RgbImage, _config: &ModelConfig) -> Result<DetectionResult> {
        bail!("backend exploded")
    }

    fn category_name(&self, _category_id: usize) -> Option<&str> {
        None
    }
}

/// Detector that takes its time, flagging when it has started.
struct SlowDetector {
    started: AtomicBool,
    delay: Duration,
}

impl Detector for SlowDetector {
    fn detect(&self, _image: &RgbImage, _config: &ModelConfig) -> Result<DetectionResult> {
        self.started.store(true, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(vec![])
    }

    fn category_name(&self, _category_id: usize) -> Option<&str> {
        None
    }
}

fn person_person_car() -> DetectionResult {
    vec![
        Detection::new(0, 0.91, [4.0, 4.0, 20.0, 40.0]),
        Detection::new(0, 0.84, [30.0, 6.0, 44.0, 44.0]),
        Detection::new(2, 0.66, [50.0, 20.0, 62.0, 30.0]),
    ]
}

fn jpeg_still() -> Vec<u8> {
    let image = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 90]));
    encode_jpeg(&image).expect("encode test still")
}

fn png_still() -> Vec<u8> {
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 200, 30])))
        .write_to(&mut png, ImageOutputFormat::Png)
        .expect("encode test still");
    png.into_inner()
}

#[test]
fn test_capture_yields_tally_and_total() {
    let detector = StubDetector::new(person_person_car());
    let mut session = Session::new(ModelConfig::default());

    let phase = session.handle(Event::Capture(jpeg_still()), &detector, &Annotator::new(None));

    assert_eq!(phase, Phase::Displaying);
    assert_eq!(detector.calls(), 1);

    let report = session.report().expect("report after capture");
    assert_eq!(report.detections, person_person_car());
    assert_eq!(report.tally.get("person"), 2);
    assert_eq!(report.tally.get("car"), 1);
    assert_eq!(report.tally.len(), 2);
    assert_eq!(report.tally.total(), 3);
    assert!(report.annotated_jpeg.starts_with(&[0xFF, 0xD8, 0xFF]));

    let summary = session.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.categories[0].category, "person");
    assert_eq!(summary.categories[0].count, 2);
}

#[test]
fn test_no_capture_means_no_detection_and_no_results() {
    let detector = StubDetector::new(person_person_car());
    let annotator = Annotator::new(None);
    let mut session = Session::new(ModelConfig::default());

    assert_eq!(session.handle(Event::SetConfidence(0.5), &detector, &annotator), Phase::Idle);
    assert_eq!(session.handle(Event::Capture(vec![]), &detector, &annotator), Phase::Idle);

    assert_eq!(detector.calls(), 0);
    assert!(session.report().is_none());

    let page = render_page(&session);
    assert!(page.contains("Model Settings"));
    assert!(!page.contains("Detection Results"));
    assert!(!page.contains("Image captured successfully"));
}

#[test]
fn test_zero_detections_give_empty_table() {
    let detector = StubDetector::new(vec![]);
    let mut session = Session::new(ModelConfig::default());

    let phase = session.handle(Event::Capture(png_still()), &detector, &Annotator::new(None));

    assert_eq!(phase, Phase::Displaying);
    let report = session.report().expect("report after capture");
    assert!(report.tally.is_empty());
    assert_eq!(report.tally.total(), 0);

    let page = render_page(&session);
    assert!(page.contains("Total objects detected: 0"));
    assert!(!page.contains("<td>"));
}

#[test]
fn test_slider_change_reevaluates_with_new_settings() {
    let detector = StubDetector::new(person_person_car());
    let annotator = Annotator::new(None);
    let mut session = Session::new(ModelConfig::default());

    session.handle(Event::Capture(jpeg_still()), &detector, &annotator);
    session.handle(Event::SetConfidence(0.6), &detector, &annotator);
    session.handle(Event::SetOverlap(0.3), &detector, &annotator);

    assert_eq!(detector.calls(), 3);
    let seen = detector.seen_configs.lock().unwrap();
    assert_eq!(seen[0].confidence_threshold(), 0.25);
    assert_eq!(seen[1].confidence_threshold(), 0.6);
    assert_eq!(seen[2].overlap_threshold(), 0.3);
    assert_eq!(seen[2].confidence_threshold(), 0.6);
}

#[test]
fn test_repeated_detection_is_deterministic() {
    let detector = StubDetector::new(person_person_car());
    let annotator = Annotator::new(None);
    let mut session = Session::new(ModelConfig::default());

    session.handle(Event::Capture(jpeg_still()), &detector, &annotator);
    let first = session.report().map(|report| report.detections.clone());
    session.handle(Event::Capture(jpeg_still()), &detector, &annotator);
    let second = session.report().map(|report| report.detections.clone());

    assert_eq!(first, second);
    assert_eq!(session.evaluations(), 2);
}

#[test]
fn test_extreme_thresholds_are_accepted() {
    let detector = StubDetector::new(vec![]);
    let annotator = Annotator::new(None);
    let mut session = Session::new(ModelConfig::default());

    for (confidence, overlap) in [(0.0, 0.0), (1.0, 1.0), (0.0, 1.0), (1.0, 0.0)] {
        session.handle(Event::SetConfidence(confidence), &detector, &annotator);
        session.handle(Event::SetOverlap(overlap), &detector, &annotator);
        assert_eq!(session.config().confidence_threshold(), confidence);
        assert_eq!(session.config().overlap_threshold(), overlap);
    }

    session.handle(Event::SetConfidence(3.0), &detector, &annotator);
    assert_eq!(session.config().confidence_threshold(), 1.0);
}

#[test]
fn test_malformed_capture_is_reported() {
    let detector = StubDetector::new(person_person_car());
    let mut session = Session::new(ModelConfig::default());

    let phase = session.handle(
        Event::Capture(b"not an image at all".to_vec()),
        &detector,
        &Annotator::new(None),
    );

    assert_eq!(phase, Phase::Failed);
    assert_eq!(detector.calls(), 0);
    assert!(matches!(session.error(), Some(SnapshotError::Decode(_))));
    assert!(session.report().is_none());

    let page = render_page(&session);
    assert!(page.contains("Failed to decode captured image"));
}

#[test]
fn test_detector_failure_is_reported_and_recoverable() {
    let annotator = Annotator::new(None);
    let mut session = Session::new(ModelConfig::default());

    let phase = session.handle(Event::Capture(jpeg_still()), &FailingDetector, &annotator);
    assert_eq!(phase, Phase::Failed);
    match session.error() {
        Some(SnapshotError::Inference(message)) => assert!(message.contains("backend exploded")),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        session.summary().error.as_deref(),
        Some("Object detection failed: backend exploded")
    );

    let detector = StubDetector::new(person_person_car());
    let phase = session.handle(Event::SetOverlap(0.5), &detector, &annotator);
    assert_eq!(phase, Phase::Displaying);
    assert!(session.error().is_none());
}

#[test]
fn test_reset_returns_to_idle() {
    let detector = StubDetector::new(person_person_car());
    let annotator = Annotator::new(None);
    let mut session = Session::new(ModelConfig::default());

    session.handle(Event::Capture(jpeg_still()), &detector, &annotator);
    let phase = session.handle(Event::Reset, &detector, &annotator);

    assert_eq!(phase, Phase::Idle);
    assert!(session.capture().is_none());
    assert!(session.report().is_none());
    assert_eq!(detector.calls(), 1);
}

#[test]
fn test_page_shows_results_table() {
    let detector = StubDetector::new(person_person_car());
    let mut session = Session::new(ModelConfig::default().with_confidence_threshold(0.4));

    session.handle(Event::Capture(jpeg_still()), &detector, &Annotator::new(None));
    let page = render_page(&session);

    assert!(page.contains("Image captured successfully!"));
    assert!(page.contains("Detection Results"));
    assert!(page.contains("<tr><td>person</td>"));
    assert!(page.contains("<tr><td>car</td>"));
    assert!(page.contains("Total objects detected: 3"));
    assert!(page.contains("Detection completed."));
    assert!(page.contains("value=\"0.40\""));
    assert!(page.contains("value=\"0.45\""));
}

#[tokio::test]
async fn test_app_state_dispatch_runs_on_blocking_worker() {
    let detector = Arc::new(StubDetector::new(person_person_car()));
    let state = Arc::new(AppState::new(
        ModelConfig::default(),
        detector.clone(),
        Annotator::new(None),
    ));

    let phase = state
        .dispatch(Event::Capture(jpeg_still()))
        .await
        .expect("dispatch joins");

    assert_eq!(phase, Phase::Displaying);
    assert_eq!(detector.calls(), 1);
    assert_eq!(state.with_session(|session| session.summary().total).await, 3);
}

#[tokio::test]
async fn test_session_reads_wait_without_blocking_runtime() {
    let detector = Arc::new(SlowDetector {
        started: AtomicBool::new(false),
        delay: Duration::from_millis(500),
    });
    let state = Arc::new(AppState::new(
        ModelConfig::default(),
        detector.clone(),
        Annotator::new(None),
    ));

    let running = tokio::spawn({
        let state = Arc::clone(&state);
        async move { state.dispatch(Event::Capture(jpeg_still())).await }
    });
    while !detector.started.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The read waits for the detection while other tasks keep running
    let ticker = tokio::spawn(tokio::time::sleep(Duration::from_millis(10)));
    let read = tokio::time::timeout(
        Duration::from_millis(100),
        state.with_session(|session| session.phase()),
    )
    .await;
    assert!(read.is_err());
    ticker.await.expect("ticker finishes during detection");

    let phase = running.await.expect("task joins").expect("dispatch joins");
    assert_eq!(phase, Phase::Displaying);
    assert_eq!(state.with_session(|session| session.phase()).await, Phase::Displaying);
}

/// Serve the full router on an ephemeral port.
fn serve(state: Arc<AppState>) -> String {
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(router(state).into_make_service());
    let address = server.local_addr();
    tokio::spawn(server);

    format!("http://{address}")
}

fn client() -> Client {
    Client::builder()
        .redirect(Policy::none())
        .build()
        .expect("build client")
}

fn stub_state() -> (Arc<StubDetector>, Arc<AppState>) {
    let detector = Arc::new(StubDetector::new(person_person_car()));
    let state = Arc::new(AppState::new(
        ModelConfig::default(),
        detector.clone(),
        Annotator::new(None),
    ));

    (detector, state)
}

#[tokio::test]
async fn test_http_slider_post_runs_detector_once_per_change() -> Result<()> {
    let (detector, state) = stub_state();
    let base = serve(state);
    let client = client();

    let resp = client
        .post(format!("{base}/capture"))
        .body(jpeg_still())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/");
    assert_eq!(detector.calls(), 1);

    // Only the overlap slider moved
    let resp = client
        .post(format!("{base}/config"))
        .form(&[("confidence", "0.25"), ("overlap", "0.6")])
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/");
    assert_eq!(detector.calls(), 2);
    {
        let seen = detector.seen_configs.lock().unwrap();
        assert_eq!(seen[1].overlap_threshold(), 0.6);
        assert_eq!(seen[1].confidence_threshold(), 0.25);
    }

    // Submitting unchanged values does not run the detector again
    client
        .post(format!("{base}/config"))
        .form(&[("confidence", "0.25"), ("overlap", "0.6")])
        .send()
        .await?;
    assert_eq!(detector.calls(), 2);

    Ok(())
}

#[tokio::test]
async fn test_http_images_only_after_capture() -> Result<()> {
    let (_detector, state) = stub_state();
    let base = serve(state);
    let client = client();

    let health = client.get(format!("{base}/healthcheck")).send().await?;
    assert_eq!(health.text().await?, "healthy");
    for path in ["/captured", "/annotated.jpg"] {
        let resp = client.get(format!("{base}{path}")).send().await?;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
    }
    let page = client.get(format!("{base}/")).send().await?.text().await?;
    assert!(page.contains("Model Settings"));
    assert!(!page.contains("Detection Results"));

    let still = png_still();
    client
        .post(format!("{base}/capture"))
        .body(still.clone())
        .send()
        .await?;

    let resp = client.get(format!("{base}/captured")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(resp.bytes().await?.to_vec(), still);

    let resp = client.get(format!("{base}/annotated.jpg")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert!(resp.bytes().await?.starts_with(&[0xFF, 0xD8, 0xFF]));

    Ok(())
}

async fn get_summary(client: &Client, base: &str) -> Result<serde_json::Value> {
    let body = client.get(format!("{base}/summary")).send().await?.text().await?;
    Ok(serde_json::from_str(&body)?)
}

#[tokio::test]
async fn test_http_summary_reports_session() -> Result<()> {
    let (_detector, state) = stub_state();
    let base = serve(state);
    let client = client();

    client
        .post(format!("{base}/capture"))
        .body(jpeg_still())
        .send()
        .await?;

    let summary = get_summary(&client, &base).await?;
    assert_eq!(summary["phase"], "displaying");
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["categories"][0]["category"], "person");
    assert_eq!(summary["categories"][0]["count"], 2);
    assert_eq!(summary["categories"][1]["category"], "car");
    assert_eq!(summary["categories"][1]["count"], 1);
    assert_eq!(summary["config"]["max_detections"], 1000);
    assert!(summary["error"].is_null());

    let resp = client.post(format!("{base}/reset")).send().await?;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let summary = get_summary(&client, &base).await?;
    assert_eq!(summary["phase"], "idle");
    assert_eq!(summary["total"], 0);
    assert_eq!(summary["categories"], serde_json::json!([]));

    Ok(())
}
