pub mod api;
pub mod app;
pub mod attribution;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod roster;
pub mod scanner;

pub use api::{ApiClient, Attribution, LastActivity, Reason, Student};
pub use app::{Kiosk, KioskBuilder, KioskOptions, KioskSummary, ShutdownReason};
pub use attribution::AttributionDesk;
pub use config::PointscanConfig;
pub use error::{
    ApiError, AttributionError, CameraError, ErrorKind, PointscanError, Result, ScannerError,
};
pub use events::{EventBus, KioskEvent};
pub use frame::{FrameData, FrameFormat, PixelBuffer};
pub use roster::{RosterQuery, RosterStats, SortKey, Standing};
pub use scanner::{
    CameraProvider, DecodeOptions, DecodeResult, Facing, FrameDecoder, InversionMode,
    QrDecoder, ScanState, ScannerSession, VideoStream,
};
