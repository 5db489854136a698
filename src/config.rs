use crate::scanner::{Facing, InversionMode};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PointscanConfig {
    pub scanner: ScannerConfig,
    pub camera: CameraConfig,
    pub api: ApiConfig,
    pub attribution: AttributionConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScannerConfig {
    /// Camera facing used when a scan starts
    #[serde(default = "default_facing")]
    pub facing: Facing,

    /// Interval between decode attempts in milliseconds
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Delay between the first frame and the first decode attempt
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,

    /// Gap between releasing a camera and requesting the other one
    #[serde(default = "default_switch_delay_ms")]
    pub switch_delay_ms: u64,

    /// Which contrast polarities the decoder tries
    #[serde(default = "default_inversion")]
    pub inversion: InversionMode,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Preferred capture resolution (width, height)
    #[serde(default = "default_ideal_resolution")]
    pub ideal_resolution: (u32, u32),

    /// Smallest acceptable capture resolution (width, height)
    #[serde(default = "default_min_resolution")]
    pub min_resolution: (u32, u32),

    /// Device index of the rear-facing camera (e.g., 0 for /dev/video0)
    #[serde(default = "default_back_device")]
    pub back_device: u32,

    /// Device index of the front-facing camera
    #[serde(default = "default_front_device")]
    pub front_device: u32,

    /// How long a freshly opened stream may take to deliver its first frame
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ApiConfig {
    /// Base URL of the attendance API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AttributionConfig {
    /// Teaching unit id sent with every attribution
    #[serde(default = "default_teaching_id")]
    pub teaching_id: i64,

    /// IANA timezone for attribution timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ScannerConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn switch_delay(&self) -> Duration {
        Duration::from_millis(self.switch_delay_ms)
    }
}

impl CameraConfig {
    pub fn device_for(&self, facing: Facing) -> u32 {
        match facing {
            Facing::Back => self.back_device,
            Facing::Front => self.front_device,
        }
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

impl PointscanConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("pointscan.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("scanner.facing", default_facing().as_str())?
            .set_default("scanner.scan_interval_ms", default_scan_interval_ms())?
            .set_default("scanner.start_delay_ms", default_start_delay_ms())?
            .set_default("scanner.switch_delay_ms", default_switch_delay_ms())?
            .set_default("scanner.inversion", default_inversion().as_str())?
            .set_default(
                "camera.ideal_resolution",
                vec![default_ideal_resolution().0, default_ideal_resolution().1],
            )?
            .set_default(
                "camera.min_resolution",
                vec![default_min_resolution().0, default_min_resolution().1],
            )?
            .set_default("camera.back_device", default_back_device())?
            .set_default("camera.front_device", default_front_device())?
            .set_default("camera.frame_timeout_ms", default_frame_timeout_ms())?
            .set_default("api.base_url", default_base_url())?
            .set_default("api.timeout_secs", default_timeout_secs())?
            .set_default("api.connect_timeout_secs", default_connect_timeout_secs())?
            .set_default("attribution.teaching_id", default_teaching_id())?
            .set_default("attribution.timezone", default_timezone())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // POINTSCAN_API__BASE_URL=... overrides api.base_url
            .add_source(Environment::with_prefix("POINTSCAN").separator("__"))
            .build()?;

        let config: PointscanConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.scan_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Scanner scan_interval_ms must be greater than 0".to_string(),
            ));
        }

        let (ideal_w, ideal_h) = self.camera.ideal_resolution;
        let (min_w, min_h) = self.camera.min_resolution;

        if ideal_w == 0 || ideal_h == 0 || min_w == 0 || min_h == 0 {
            return Err(ConfigError::Message(
                "Camera resolutions must be greater than 0".to_string(),
            ));
        }

        if ideal_w < min_w || ideal_h < min_h {
            return Err(ConfigError::Message(format!(
                "Camera ideal resolution {}x{} is below the minimum {}x{}",
                ideal_w, ideal_h, min_w, min_h
            )));
        }

        if self.camera.frame_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera frame_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "API base_url must not be empty".to_string(),
            ));
        }

        if self.api.timeout_secs == 0 || self.api.connect_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "API timeouts must be greater than 0".to_string(),
            ));
        }

        if self.attribution.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Message(format!(
                "Unknown attribution timezone: {}",
                self.attribution.timezone
            )));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as a TOML document accepted by [`PointscanConfig::load_from_file`]
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for PointscanConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig::default(),
            camera: CameraConfig::default(),
            api: ApiConfig::default(),
            attribution: AttributionConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            facing: default_facing(),
            scan_interval_ms: default_scan_interval_ms(),
            start_delay_ms: default_start_delay_ms(),
            switch_delay_ms: default_switch_delay_ms(),
            inversion: default_inversion(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            ideal_resolution: default_ideal_resolution(),
            min_resolution: default_min_resolution(),
            back_device: default_back_device(),
            front_device: default_front_device(),
            frame_timeout_ms: default_frame_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            teaching_id: default_teaching_id(),
            timezone: default_timezone(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

// Default value functions
fn default_facing() -> Facing {
    Facing::Back
}
fn default_scan_interval_ms() -> u64 {
    100
}
fn default_start_delay_ms() -> u64 {
    500
}
fn default_switch_delay_ms() -> u64 {
    500
}
fn default_inversion() -> InversionMode {
    InversionMode::DontInvert
}

fn default_ideal_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_min_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_back_device() -> u32 {
    0
}
fn default_front_device() -> u32 {
    1
}
fn default_frame_timeout_ms() -> u64 {
    5000
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_teaching_id() -> i64 {
    5
}
fn default_timezone() -> String {
    "Europe/Paris".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
