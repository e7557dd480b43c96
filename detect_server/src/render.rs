//! HTML rendering of the session page.
//!
use std::fmt::Write;

use crate::{
    detection::{CategoryTally, TallyRow},
    session::{Phase, Session},
};

const TITLE: &str = "Object Detection on Captured Images";

/// Yellow-green color ramp for the summary table, low to high.
const GRADIENT_STOPS: [[f32; 3]; 3] = [
    [255.0, 255.0, 229.0],
    [120.0, 198.0, 121.0],
    [0.0, 69.0, 41.0],
];

/// Relative luminance below which cell text switches to white.
const TEXT_LUMINANCE_THRESHOLD: f32 = 0.408;

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 0; display: flex; }
aside { width: 18rem; min-height: 100vh; padding: 1rem; background: #f0f2f6; box-sizing: border-box; }
main { flex: 1; padding: 1rem 2rem; }
label { display: block; margin-top: 1rem; }
input[type=range] { width: 100%; }
.info { background: #e1effe; color: #1c4f8c; padding: 0.75rem; border-radius: 0.4rem; margin-top: 1.5rem; }
.success { background: #dff5e3; color: #1b5e20; padding: 0.75rem; border-radius: 0.4rem; margin: 1rem 0; }
.error { background: #fde2e1; color: #8c1c13; padding: 0.75rem; border-radius: 0.4rem; margin: 1rem 0; }
.columns { display: flex; gap: 2rem; }
.columns .wide { flex: 2; }
.columns .narrow { flex: 1; }
img, video { max-width: 100%; }
table { border-collapse: collapse; }
th, td { padding: 0.4rem 0.8rem; border: 1px solid #ddd; text-align: left; }
#spinner { display: none; margin: 1rem 0; }
#spinner.active { display: block; }
"#;

const SCRIPT: &str = r#"
function busy() { document.getElementById('spinner').classList.add('active'); }
async function sendCapture(blob) {
  busy();
  await fetch('/capture', { method: 'POST', body: blob });
  window.location.reload();
}
async function startCamera() {
  try {
    const stream = await navigator.mediaDevices.getUserMedia({ video: true });
    document.getElementById('camera').srcObject = stream;
  } catch (err) {
    document.getElementById('camera-error').textContent = 'Camera unavailable: ' + err;
  }
}
function takePicture() {
  const video = document.getElementById('camera');
  if (!video.videoWidth) { return; }
  const canvas = document.createElement('canvas');
  canvas.width = video.videoWidth;
  canvas.height = video.videoHeight;
  canvas.getContext('2d').drawImage(video, 0, 0);
  canvas.toBlob(sendCapture, 'image/jpeg', 0.95);
}
function uploadPicture(input) {
  if (input.files.length > 0) { sendCapture(input.files[0]); }
}
window.addEventListener('load', startCamera);
"#;

/// Render the full page for the current session state.
pub fn render_page(session: &Session) -> String {
    let mut page = String::new();

    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(page, "<title>{TITLE}</title>");
    let _ = writeln!(page, "<style>{STYLE}</style>");
    let _ = writeln!(page, "<script>{SCRIPT}</script>");
    page.push_str("</head>\n<body>\n");

    render_sidebar(&mut page, session);

    page.push_str("<main>\n");
    let _ = writeln!(page, "<h1>{TITLE}</h1>");
    render_capture_section(&mut page);
    render_results(&mut page, session);
    page.push_str("</main>\n</body>\n</html>\n");

    page
}

fn render_sidebar(page: &mut String, session: &Session) {
    let config = session.config();

    page.push_str("<aside>\n<h2>Model Settings</h2>\n");
    page.push_str("<form method=\"post\" action=\"/config\" onchange=\"busy(); this.submit()\">\n");
    render_slider(page, "overlap", "IoU threshold", config.overlap_threshold());
    render_slider(page, "confidence", "Confidence level", config.confidence_threshold());
    page.push_str("<noscript><button type=\"submit\">Apply</button></noscript>\n</form>\n");
    page.push_str(
        "<div class=\"info\">Adjust the parameters to improve the object detection.</div>\n",
    );
    page.push_str("</aside>\n");
}

fn render_slider(page: &mut String, name: &str, label: &str, value: f32) {
    let _ = writeln!(
        page,
        "<label for=\"{name}\">{label}: <output id=\"{name}-value\">{value:.2}</output></label>\n\
         <input type=\"range\" id=\"{name}\" name=\"{name}\" min=\"0\" max=\"1\" step=\"0.01\" \
         value=\"{value:.2}\" oninput=\"document.getElementById('{name}-value').value = Number(this.value).toFixed(2)\">"
    );
}

fn render_capture_section(page: &mut String) {
    page.push_str("<h2>Image Capture</h2>\n");
    page.push_str("<video id=\"camera\" autoplay playsinline width=\"480\"></video>\n");
    page.push_str("<div id=\"camera-error\"></div>\n");
    page.push_str("<button onclick=\"takePicture()\">Click to take a photo</button>\n");
    page.push_str(
        "<input type=\"file\" accept=\"image/*\" onchange=\"uploadPicture(this)\">\n",
    );
    page.push_str("<form method=\"post\" action=\"/reset\" style=\"display:inline\">\
                   <button type=\"submit\">Clear photo</button></form>\n");
    page.push_str("<div id=\"spinner\">Detecting objects...</div>\n");
}

fn render_results(page: &mut String, session: &Session) {
    if session.capture().is_none() {
        return;
    }

    page.push_str("<div class=\"success\">Image captured successfully!</div>\n");
    let _ = writeln!(
        page,
        "<img src=\"/captured?v={}\" alt=\"Captured image\" width=\"240\">",
        session.evaluations()
    );

    if let Some(err) = session.error() {
        let _ = writeln!(page, "<div class=\"error\">{}</div>", escape(&err.to_string()));
    }

    let report = match (session.phase(), session.report()) {
        (Phase::Displaying, Some(report)) => report,
        _ => return,
    };

    page.push_str("<h2>Detection Results</h2>\n<div class=\"columns\">\n<div class=\"wide\">\n");
    let _ = writeln!(
        page,
        "<figure><img src=\"/annotated.jpg?v={}\" alt=\"Image with detections\">\
         <figcaption>Image with detections</figcaption></figure>",
        session.evaluations()
    );
    page.push_str("</div>\n<div class=\"narrow\">\n<h3>Detection Summary</h3>\n");
    render_table(page, &report.tally);
    let _ = writeln!(page, "<h3>Total objects detected: {}</h3>", report.tally.total());
    page.push_str("</div>\n</div>\n");
    page.push_str("<div class=\"success\">Detection completed.</div>\n");
}

/// Render the category table, cells shaded by count.
fn render_table(page: &mut String, tally: &CategoryTally) {
    let rows = tally.rows();
    let min = rows.iter().map(|row| row.count).min().unwrap_or(0);
    let max = tally.max_count();

    page.push_str("<table>\n<thead><tr><th>Category</th><th>Count</th></tr></thead>\n<tbody>\n");
    for TallyRow { category, count } in rows.iter() {
        let (background, foreground) = cell_colors(*count, min, max);
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td style=\"background-color: {background}; color: {foreground}\">{count}</td></tr>",
            escape(category)
        );
    }
    page.push_str("</tbody>\n</table>\n");
}

/// Background and text color of a count cell, normalized over `[min, max]`.
fn cell_colors(count: usize, min: usize, max: usize) -> (String, &'static str) {
    let position = match max > min {
        true => (count - min) as f32 / (max - min) as f32,
        false => 0.0,
    };
    let [r, g, b] = gradient(position);

    let luminance = (0.2126 * r + 0.7152 * g + 0.0722 * b) / 255.0;
    let foreground = match luminance < TEXT_LUMINANCE_THRESHOLD {
        true => "#f1f1f1",
        false => "#000000",
    };

    (
        format!("#{:02x}{:02x}{:02x}", r as u8, g as u8, b as u8),
        foreground,
    )
}

fn gradient(position: f32) -> [f32; 3] {
    let position = position.clamp(0.0, 1.0) * (GRADIENT_STOPS.len() - 1) as f32;
    let index = (position.floor() as usize).min(GRADIENT_STOPS.len() - 2);
    let fraction = position - index as f32;
    let (low, high) = (GRADIENT_STOPS[index], GRADIENT_STOPS[index + 1]);

    [0usize, 1, 2].map(|c| (low[c] + (high[c] - low[c]) * fraction).round())
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }

    escaped
}
