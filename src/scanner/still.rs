use super::provider::{CameraProvider, VideoStream};
use super::types::StreamConstraints;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Serves a single image file as if it were a camera.
///
/// Facing and resolution constraints are ignored: the image is what it is.
pub struct StillImageProvider {
    path: PathBuf,
}

impl StillImageProvider {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<FrameData, CameraError> {
        let device = path.display().to_string();

        std::fs::metadata(path).map_err(|e| CameraError::from_io(device.clone(), &e))?;

        let image = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => CameraError::from_io(device.clone(), &io),
            other => CameraError::DeviceOpen {
                device: device.clone(),
                details: other.to_string(),
            },
        })?;

        let luma = image.to_luma8();
        let (width, height) = luma.dimensions();

        Ok(FrameData::new(
            0,
            SystemTime::now(),
            luma.into_raw(),
            width,
            height,
            FrameFormat::Gray8,
        ))
    }
}

#[async_trait]
impl CameraProvider for StillImageProvider {
    async fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        debug!(
            "Opening still image {} in place of {} camera",
            self.path.display(),
            constraints.facing
        );

        let path = self.path.clone();
        let frame = tokio::task::spawn_blocking(move || Self::load(&path))
            .await
            .map_err(|e| CameraError::CaptureStream {
                details: format!("image loader task failed: {}", e),
            })??;

        info!(
            "Loaded still image {} ({}x{})",
            self.path.display(),
            frame.width,
            frame.height
        );

        Ok(Box::new(StillStream {
            frame: Arc::new(frame),
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "still-image"
    }
}

struct StillStream {
    frame: Arc<FrameData>,
    closed: bool,
}

#[async_trait]
impl VideoStream for StillStream {
    async fn wait_ready(&mut self) -> Result<(u32, u32), CameraError> {
        Ok(self.dimensions())
    }

    fn current_frame(&mut self) -> Option<FrameData> {
        if self.closed {
            None
        } else {
            Some(FrameData::clone(&self.frame))
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
