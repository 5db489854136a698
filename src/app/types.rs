use crate::api::Attribution;
use crate::error::AttributionError;
use crate::scanner::Facing;

/// Why the kiosk stopped scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
    /// The requested number of scans was reached
    Completed,
}

/// Kiosk behaviour for one `scan` run
#[derive(Debug, Clone)]
pub struct KioskOptions {
    /// Reason attributed to every scanned student
    pub reason: Option<i64>,
    pub facing: Facing,
    /// Restart the scanner after each scan
    pub continuous: bool,
    /// Stop after this many scans, attributed or rejected
    pub max_scans: Option<usize>,
    pub keyboard: bool,
    /// Print operator messages to stdout
    pub announce: bool,
}

impl Default for KioskOptions {
    fn default() -> Self {
        Self {
            reason: None,
            facing: Facing::Back,
            continuous: false,
            max_scans: None,
            keyboard: false,
            announce: true,
        }
    }
}

/// What happened during a kiosk run
#[derive(Debug, Clone)]
pub struct KioskSummary {
    pub attributions: Vec<Attribution>,
    pub rejected: Vec<AttributionError>,
    pub reason: ShutdownReason,
}

impl KioskSummary {
    pub fn scans(&self) -> usize {
        self.attributions.len() + self.rejected.len()
    }
}
