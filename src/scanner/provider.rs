use super::types::StreamConstraints;
use crate::error::CameraError;
use crate::frame::FrameData;
use async_trait::async_trait;

/// Source of camera streams
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Open a stream matching `constraints`.
    ///
    /// Suspends until the platform grants or refuses the camera.
    async fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// A live camera stream, exclusively owned by one scanner session
#[async_trait]
pub trait VideoStream: Send {
    /// Resolve once the first frame is available, returning the native
    /// dimensions the stream settled on.
    async fn wait_ready(&mut self) -> Result<(u32, u32), CameraError>;

    /// Most recent frame, or `None` when no frame is available yet
    fn current_frame(&mut self) -> Option<FrameData>;

    /// Current native dimensions
    fn dimensions(&self) -> (u32, u32);

    /// Stop every track of the stream. Must be idempotent.
    fn close(&mut self);
}
