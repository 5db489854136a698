use crate::config::CameraConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Camera orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front-facing ("user") camera
    #[serde(alias = "user")]
    Front,
    /// Rear-facing ("environment") camera
    #[serde(alias = "environment")]
    Back,
}

impl Facing {
    pub fn opposite(self) -> Self {
        match self {
            Facing::Front => Facing::Back,
            Facing::Back => Facing::Front,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Front => "front",
            Facing::Back => "back",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scanner session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Starting,
    Running,
    Stopped,
}

impl ScanState {
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Starting | ScanState::Running)
    }
}

/// What the caller picks before a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub facing: Facing,
}

impl ScanRequest {
    pub fn new(facing: Facing) -> Self {
        Self { facing }
    }

    /// Stream constraints for this request under the configured resolutions
    pub fn constraints(&self, camera: &CameraConfig) -> StreamConstraints {
        StreamConstraints {
            facing: self.facing,
            ideal_width: camera.ideal_resolution.0,
            ideal_height: camera.ideal_resolution.1,
            min_width: camera.min_resolution.0,
            min_height: camera.min_resolution.1,
        }
    }
}

/// Constraints passed to a camera provider when opening a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConstraints {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl StreamConstraints {
    /// Whether a negotiated resolution meets the minimum
    pub fn accepts(&self, width: u32, height: u32) -> bool {
        width >= self.min_width && height >= self.min_height
    }
}

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    Found(String),
    NotFound,
}

impl DecodeResult {
    pub fn payload(&self) -> Option<&str> {
        match self {
            DecodeResult::Found(payload) => Some(payload),
            DecodeResult::NotFound => None,
        }
    }
}

/// Contrast polarities the decoder attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionMode {
    /// Dark modules on a light background only
    DontInvert,
    /// Light modules on a dark background only
    OnlyInvert,
    /// Normal first, then inverted
    AttemptBoth,
    /// Inverted first, then normal
    InvertFirst,
}

impl InversionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InversionMode::DontInvert => "dont_invert",
            InversionMode::OnlyInvert => "only_invert",
            InversionMode::AttemptBoth => "attempt_both",
            InversionMode::InvertFirst => "invert_first",
        }
    }

    /// Polarities to try, in order; `true` means inverted
    pub fn passes(&self) -> &'static [bool] {
        match self {
            InversionMode::DontInvert => &[false],
            InversionMode::OnlyInvert => &[true],
            InversionMode::AttemptBoth => &[false, true],
            InversionMode::InvertFirst => &[true, false],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub inversion: InversionMode,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            inversion: InversionMode::DontInvert,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub state: ScanState,
    pub facing: Facing,
    pub last_payload: Option<String>,
    pub attempt_count: u64,
    pub last_error: Option<crate::error::ErrorKind>,
}
