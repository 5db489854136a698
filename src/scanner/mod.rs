mod decoder;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod mock;
mod provider;
mod session;
#[cfg(feature = "still-image")]
mod still;
mod types;
#[cfg(test)]
mod tests;

pub use decoder::{FrameDecoder, QrDecoder};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstCameraProvider;
pub use mock::{MockCameraProvider, ScriptStep, ScriptedDecoder};
pub use provider::{CameraProvider, VideoStream};
pub use session::{ScanCallback, ScannerSession, ScannerSessionBuilder, MIN_SCAN_INTERVAL};
#[cfg(feature = "still-image")]
pub use still::StillImageProvider;
pub use types::{
    DecodeOptions, DecodeResult, Facing, InversionMode, ScanRequest, ScanState, SessionSnapshot,
    StreamConstraints,
};
