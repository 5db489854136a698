use super::provider::{CameraProvider, VideoStream};
use super::types::StreamConstraints;
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// V4L2 camera provider built on a GStreamer capture pipeline
pub struct GstCameraProvider {
    camera: CameraConfig,
}

impl GstCameraProvider {
    pub fn new(camera: CameraConfig) -> Self {
        Self { camera }
    }

    /// Build GStreamer pipeline string for luma capture within the constraints
    fn build_pipeline_string(device: &str, constraints: &StreamConstraints) -> String {
        format!(
            "v4l2src device={} do-timestamp=true ! \
             videoconvert ! \
             video/x-raw,format=GRAY8,width=[{},{}],height=[{},{}] ! \
             appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false",
            device,
            constraints.min_width,
            constraints.ideal_width,
            constraints.min_height,
            constraints.ideal_height
        )
    }

    /// Pull the first error off the pipeline bus and classify it
    fn classify_pipeline_failure(pipeline: &Pipeline, device: &str) -> CameraError {
        let message = pipeline.bus().and_then(|bus| {
            bus.timed_pop_filtered(
                gstreamer::ClockTime::from_mseconds(200),
                &[gstreamer::MessageType::Error],
            )
        });

        let Some(message) = message else {
            return CameraError::DeviceOpen {
                device: device.to_string(),
                details: "pipeline refused to start".to_string(),
            };
        };

        let gstreamer::MessageView::Error(err) = message.view() else {
            return CameraError::DeviceOpen {
                device: device.to_string(),
                details: "pipeline refused to start".to_string(),
            };
        };

        let error = err.error();
        let details = error.to_string();
        let device = device.to_string();

        if let Some(kind) = error.kind::<gstreamer::ResourceError>() {
            return match kind {
                gstreamer::ResourceError::NotFound => CameraError::DeviceNotFound { device },
                gstreamer::ResourceError::Busy => CameraError::DeviceBusy { device },
                gstreamer::ResourceError::NotAuthorized
                | gstreamer::ResourceError::OpenRead
                | gstreamer::ResourceError::OpenReadWrite => {
                    CameraError::PermissionDenied { device }
                }
                gstreamer::ResourceError::Settings => CameraError::Overconstrained {
                    constraint: "resolution".to_string(),
                    details,
                },
                _ => CameraError::DeviceOpen { device, details },
            };
        }

        if matches!(
            error.kind::<gstreamer::CoreError>(),
            Some(gstreamer::CoreError::Negotiation)
        ) || matches!(
            error.kind::<gstreamer::StreamError>(),
            Some(gstreamer::StreamError::Format)
        ) {
            return CameraError::Overconstrained {
                constraint: "resolution".to_string(),
                details,
            };
        }

        CameraError::DeviceOpen { device, details }
    }
}

#[async_trait]
impl CameraProvider for GstCameraProvider {
    async fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        let device = format!("/dev/video{}", self.camera.device_for(constraints.facing));

        // Surface permission and busy errors before GStreamer hides them
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&device)
            .map_err(|e| CameraError::from_io(device.clone(), &e))?;

        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = Self::build_pipeline_string(&device, constraints);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            warn!("Failed to start GStreamer pipeline for {}: {}", device, e);
            let failure = Self::classify_pipeline_failure(&pipeline, &device);
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(failure);
        }

        debug!("GStreamer pipeline for {} is playing", device);

        Ok(Box::new(GstStream {
            pipeline,
            appsink,
            device,
            ready_timeout: self.camera.frame_timeout(),
            latest: None,
            frame_counter: 0,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "gstreamer"
    }
}

struct GstStream {
    pipeline: Pipeline,
    appsink: AppSink,
    device: String,
    ready_timeout: std::time::Duration,
    latest: Option<FrameData>,
    frame_counter: u64,
    closed: bool,
}

impl GstStream {
    /// Convert a GRAY8 sample into a tightly packed frame
    fn sample_to_frame(sample: &gstreamer::Sample, id: u64) -> Result<FrameData, CameraError> {
        let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureStream {
            details: "No buffer in sample".to_string(),
        })?;

        let caps = sample.caps().ok_or_else(|| CameraError::CaptureStream {
            details: "No caps in sample".to_string(),
        })?;

        let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::CaptureStream {
            details: format!("Failed to get video info: {}", e),
        })?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::CaptureStream {
                details: format!("Failed to map buffer: {}", e),
            })?;
        let bytes = map.as_slice();

        // Rows may be padded; copy only the visible pixels
        let row = width as usize;
        let mut data = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let end = start + row;
            if end > bytes.len() {
                return Err(CameraError::CaptureStream {
                    details: format!("Truncated frame: row {} past {} bytes", y, bytes.len()),
                });
            }
            data.extend_from_slice(&bytes[start..end]);
        }

        Ok(FrameData::new(
            id,
            SystemTime::now(),
            data,
            width,
            height,
            FrameFormat::Gray8,
        ))
    }

    fn accept(&mut self, sample: gstreamer::Sample) -> Result<(), CameraError> {
        let frame = Self::sample_to_frame(&sample, self.frame_counter)?;
        self.frame_counter += 1;
        trace!(
            "Captured frame {} ({}x{}) from {}",
            frame.id,
            frame.width,
            frame.height,
            self.device
        );
        self.latest = Some(frame);
        Ok(())
    }
}

#[async_trait]
impl VideoStream for GstStream {
    async fn wait_ready(&mut self) -> Result<(u32, u32), CameraError> {
        let appsink = self.appsink.clone();
        let timeout = gstreamer::ClockTime::from_mseconds(self.ready_timeout.as_millis() as u64);

        let sample = tokio::task::spawn_blocking(move || appsink.try_pull_sample(timeout))
            .await
            .map_err(|e| CameraError::CaptureStream {
                details: format!("Frame wait task failed: {}", e),
            })?
            .ok_or_else(|| CameraError::CaptureStream {
                details: format!("No frame from {} within {:?}", self.device, self.ready_timeout),
            })?;

        self.accept(sample)?;
        Ok(self.dimensions())
    }

    fn current_frame(&mut self) -> Option<FrameData> {
        if self.closed {
            return None;
        }

        if let Some(sample) = self.appsink.try_pull_sample(gstreamer::ClockTime::ZERO) {
            if let Err(e) = self.accept(sample) {
                debug!("Dropping unreadable sample from {}: {}", self.device, e);
            }
        }

        self.latest.clone()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.latest
            .as_ref()
            .map(|f| (f.width, f.height))
            .unwrap_or((0, 0))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.latest = None;

        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline for {}: {}", self.device, e);
        } else {
            info!("Released camera {}", self.device);
        }
    }
}

impl Drop for GstStream {
    fn drop(&mut self) {
        self.close();
    }
}
