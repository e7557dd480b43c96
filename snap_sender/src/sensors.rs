//! Sensors module.
//!
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Something that produces one encoded still per call.
pub trait StillSource {
    /// Name used to identify the source in logs.
    fn name(&self) -> String;

    /// Capture one encoded still image.
    fn capture(&mut self) -> Result<Vec<u8>>;
}

/// Reads a still from an image file.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
        }
    }
}

impl StillSource for FileSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn capture(&mut self) -> Result<Vec<u8>> {
        let data = std::fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if data.is_empty() {
            bail!("{} is empty, no image captured", self.path.display());
        }

        Ok(data)
    }
}

/// Parse a resolution like `1280x720`.
pub fn parse_resolution(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let width = width.trim().parse::<u32>().map_err(|err| format!("bad width: {err}"))?;
    let height = height.trim().parse::<u32>().map_err(|err| format!("bad height: {err}"))?;
    match (width, height) {
        (0, _) | (_, 0) => Err(format!("resolution {value:?} has a zero side")),
        resolution => Ok(resolution),
    }
}

#[cfg(feature = "v4l")]
pub use camera::V4lCamera;

#[cfg(feature = "v4l")]
mod camera {
    use anyhow::{anyhow, bail, Context, Result};
    use rscam::{Camera, Config};

    use super::StillSource;

    /// V4L2 camera delivering MJPG frames, which are complete JPEG stills.
    pub struct V4lCamera {
        device_name: String,
        camera: Camera,
        warmup_frames: usize,
    }

    impl V4lCamera {
        /// Open and start a video device on a Linux machine.
        ///
        /// Without an explicit resolution, the largest one supported for `format` is used.
        pub fn open(
            device_name: &str,
            format: &str,
            resolution: Option<(u32, u32)>,
            warmup_frames: usize,
        ) -> Result<Self> {
            if format != "MJPG" {
                bail!("format {format} does not deliver encoded stills, use MJPG");
            }

            let mut camera = Camera::new(device_name)
                .with_context(|| format!("failed to open camera {device_name}"))?;
            log_supported_formats(&camera, format);
            let format = format.as_bytes();

            log::info!("Using camera {}", device_name);

            let resolution = resolution
                .map(Ok)
                .unwrap_or_else(|| get_max_resolution(&camera, format))?;
            let interval = get_max_frame_rate(&camera, format, resolution)?;
            log::info!(
                "Capturing at {}x{}, frame interval {}/{}",
                resolution.0,
                resolution.1,
                interval.0,
                interval.1
            );

            camera
                .start(&Config {
                    interval,
                    resolution,
                    format,
                    ..Default::default()
                })
                .with_context(|| format!("failed to start camera {device_name}"))?;

            Ok(Self {
                device_name: device_name.to_owned(),
                camera,
                warmup_frames,
            })
        }
    }

    impl StillSource for V4lCamera {
        fn name(&self) -> String {
            self.device_name.clone()
        }

        fn capture(&mut self) -> Result<Vec<u8>> {
            // First frames after starting are often under-exposed
            for _ in 0..self.warmup_frames {
                self.camera.capture().context("failed to capture warm-up frame")?;
            }

            let frame = self.camera.capture().context("failed to capture frame")?;
            log::debug!("Captured frame of {} bytes", frame.len());

            Ok(frame[..].to_vec())
        }
    }

    /// Get the maximum supported resolution for the given format.
    fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32)> {
        let resolution_info = cam.resolutions(format)?;
        log::debug!("Found resolutions: {:?}", &resolution_info);
        match resolution_info {
            rscam::ResolutionInfo::Discretes(resolutions) => resolutions
                .iter()
                // Get the highest resolution in terms of number of pixels
                .max_by_key(|res| res.0 * res.1)
                .copied(),
            rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
        }
        .ok_or_else(|| anyhow!("No resolution found"))
    }

    /// Get the maximum supported frame rate for the given format and resolution.
    fn get_max_frame_rate(
        cam: &Camera,
        format: &[u8],
        resolution: (u32, u32),
    ) -> Result<(u32, u32)> {
        let interval_info = cam.intervals(format, resolution)?;
        log::debug!("Found frame rates: {:?}", &interval_info);
        match interval_info {
            rscam::IntervalInfo::Discretes(intervals) => intervals
                .iter()
                // Intervals are (numerator, denominator) seconds per frame, smallest is fastest
                .min_by(|a, b| (a.0 as u64 * b.1 as u64).cmp(&(b.0 as u64 * a.1 as u64)))
                .copied(),
            rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
        }
        .ok_or_else(|| anyhow!("No frame rate found"))
    }

    fn log_supported_formats(cam: &Camera, format: &str) {
        let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
        log::debug!(
            "Supported formats: {:?}, using format {:?}",
            formats,
            format
        );
    }
}
