use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PointscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Scanner error: {0}")]
    Scanner(#[from] ScannerError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Attribution error: {0}")]
    Attribution(#[from] AttributionError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PointscanError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PointscanError>;

/// Classified camera acquisition failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    DeviceNotFound,
    Unsupported,
    DeviceBusy,
    ConstraintUnsatisfiable,
    Unknown,
}

impl ErrorKind {
    /// Text shown to the operator when acquisition fails with this kind.
    /// `raw` is only used for [`ErrorKind::Unknown`].
    pub fn user_message(&self, raw: &str) -> String {
        match self {
            ErrorKind::PermissionDenied => {
                "Camera access denied. Grant camera permission to this application and try again."
                    .to_string()
            }
            ErrorKind::DeviceNotFound => "No camera found on this device.".to_string(),
            ErrorKind::Unsupported => {
                "Camera capture is not supported on this platform. Try another client.".to_string()
            }
            ErrorKind::DeviceBusy => "The camera is already in use by another application.".to_string(),
            ErrorKind::ConstraintUnsatisfiable => {
                "The camera cannot satisfy the requested resolution or facing.".to_string()
            }
            ErrorKind::Unknown => format!("Error: {}", raw),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::DeviceNotFound => "device not found",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::DeviceBusy => "device busy",
            ErrorKind::ConstraintUnsatisfiable => "constraint unsatisfiable",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Failures reported by camera providers
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Permission denied for camera {device}")]
    PermissionDenied { device: String },

    #[error("Camera {device} not found")]
    DeviceNotFound { device: String },

    #[error("Camera capture not available on this platform")]
    NotAvailable,

    #[error("Camera {device} is busy")]
    DeviceBusy { device: String },

    #[error("Camera cannot satisfy constraint {constraint}: {details}")]
    Overconstrained { constraint: String, details: String },

    #[error("Failed to open camera {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Camera configuration failed: {details}")]
    Configuration { details: String },

    #[error("Camera stream error: {details}")]
    CaptureStream { details: String },
}

impl CameraError {
    /// Classify an OS error raised while opening `device`
    pub fn from_io(device: impl Into<String>, err: &std::io::Error) -> Self {
        let device = device.into();

        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => {
                return CameraError::PermissionDenied { device };
            }
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                return CameraError::DeviceNotFound { device };
            }
            Some(libc::EBUSY) => return CameraError::DeviceBusy { device },
            _ => {}
        }

        match err.kind() {
            std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied { device },
            std::io::ErrorKind::NotFound => CameraError::DeviceNotFound { device },
            std::io::ErrorKind::Unsupported => CameraError::NotAvailable,
            _ => CameraError::DeviceOpen {
                device,
                details: err.to_string(),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            CameraError::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            CameraError::NotAvailable => ErrorKind::Unsupported,
            CameraError::DeviceBusy { .. } => ErrorKind::DeviceBusy,
            CameraError::Overconstrained { .. } => ErrorKind::ConstraintUnsatisfiable,
            CameraError::DeviceOpen { .. }
            | CameraError::Configuration { .. }
            | CameraError::CaptureStream { .. } => ErrorKind::Unknown,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Camera acquisition failed ({kind}): {message}")]
    Acquisition { kind: ErrorKind, message: String },

    #[error("Scanner session is already active")]
    AlreadyActive,

    #[error("Frame decode failed: {details}")]
    Decode { details: String },

    #[error("Scanner stream error: {details}")]
    Stream { details: String },
}

impl ScannerError {
    /// Acquisition failure kind, if this error came from opening the camera
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ScannerError::Acquisition { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Operator-facing message for acquisition failures
    pub fn user_message(&self) -> String {
        match self {
            ScannerError::Acquisition { kind, message } => kind.user_message(message),
            other => other.to_string(),
        }
    }
}

impl From<CameraError> for ScannerError {
    fn from(err: CameraError) -> Self {
        ScannerError::Acquisition {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server error on {endpoint}: HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {details}")]
    InvalidResponse { endpoint: String, details: String },

    #[error("HTTP client setup failed: {details}")]
    Client { details: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributionError {
    #[error("No reason selected")]
    NoReasonSelected,

    #[error("Unknown reason id {0}")]
    UnknownReason(i64),

    #[error("Student not found for id: {0}")]
    StudentNotFound(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event receiver lagged by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_classified() {
        let denied = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(
            CameraError::from_io("/dev/video0", &denied).kind(),
            ErrorKind::PermissionDenied
        );

        let missing = std::io::Error::from_raw_os_error(libc::ENOENT);
        assert_eq!(
            CameraError::from_io("/dev/video0", &missing).kind(),
            ErrorKind::DeviceNotFound
        );

        let busy = std::io::Error::from_raw_os_error(libc::EBUSY);
        assert_eq!(
            CameraError::from_io("/dev/video0", &busy).kind(),
            ErrorKind::DeviceBusy
        );

        let unsupported = std::io::Error::new(std::io::ErrorKind::Unsupported, "no v4l2");
        assert_eq!(
            CameraError::from_io("/dev/video0", &unsupported).kind(),
            ErrorKind::Unsupported
        );

        let other = std::io::Error::new(std::io::ErrorKind::Other, "weird");
        assert_eq!(
            CameraError::from_io("/dev/video0", &other).kind(),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_overconstrained_maps_to_constraint_kind() {
        let err = CameraError::Overconstrained {
            constraint: "resolution".to_string(),
            details: "320x240 max".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ConstraintUnsatisfiable);

        let scanner_err: ScannerError = err.into();
        assert_eq!(scanner_err.kind(), Some(ErrorKind::ConstraintUnsatisfiable));
    }

    #[test]
    fn test_unknown_user_message_shows_raw_text() {
        let message = ErrorKind::Unknown.user_message("pipeline exploded");
        assert!(message.contains("pipeline exploded"));

        let message = ErrorKind::PermissionDenied.user_message("ignored");
        assert!(!message.contains("ignored"));
    }
}
