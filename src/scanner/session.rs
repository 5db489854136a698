use super::decoder::{FrameDecoder, QrDecoder};
use super::provider::{CameraProvider, VideoStream};
use super::types::{
    DecodeOptions, DecodeResult, Facing, ScanRequest, ScanState, SessionSnapshot,
};
use crate::config::{CameraConfig, ScannerConfig};
use crate::error::{CameraError, ErrorKind, PointscanError, Result, ScannerError};
use crate::events::{EventBus, KioskEvent};
use crate::frame::PixelBuffer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Lower bound on the decode interval
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(10);

/// Receives the decoded payload of a successful session
pub type ScanCallback = Arc<dyn Fn(String) + Send + Sync>;

struct DecodeTimer {
    token: CancellationToken,
    _task: JoinHandle<()>,
}

struct SessionInner {
    state: ScanState,
    facing: Facing,
    last_payload: Option<String>,
    attempt_count: u64,
    last_error: Option<ErrorKind>,
    stream: Option<Box<dyn VideoStream>>,
    timer: Option<DecodeTimer>,
    decoder: Box<dyn FrameDecoder>,
    buffer: PixelBuffer,
    // bumped on every start so stale loops and acquisitions can tell they lost
    generation: u64,
    // bumped on every release so a pending facing switch can tell it was stopped
    releases: u64,
}

enum TickOutcome {
    Continue,
    Found { payload: String, attempts: u64 },
    Halt,
}

impl SessionInner {
    /// Cancel the timer, close the stream, and mark the session stopped
    fn release(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.token.cancel();
        }
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        self.state = ScanState::Stopped;
        self.releases += 1;
    }

    fn decode_tick(&mut self, generation: u64, options: &DecodeOptions) -> TickOutcome {
        if self.generation != generation || self.state != ScanState::Running {
            return TickOutcome::Halt;
        }

        self.attempt_count += 1;
        let attempt = self.attempt_count;

        let frame = match self.stream.as_mut().and_then(|s| s.current_frame()) {
            Some(frame) => frame,
            None => {
                trace!("Decode attempt {}: no frame available", attempt);
                return TickOutcome::Continue;
            }
        };

        if let Err(e) = self.buffer.load(&frame) {
            debug!("Decode attempt {} skipped: {}", attempt, e);
            return TickOutcome::Continue;
        }

        match self.decoder.decode(&self.buffer, options) {
            Ok(DecodeResult::Found(payload)) => {
                info!("QR code found on attempt {}", attempt);
                self.last_payload = Some(payload.clone());
                self.release();
                TickOutcome::Found {
                    payload,
                    attempts: attempt,
                }
            }
            Ok(DecodeResult::NotFound) => {
                trace!(
                    "Decode attempt {}: nothing in {}x{} frame",
                    attempt,
                    frame.width,
                    frame.height
                );
                TickOutcome::Continue
            }
            Err(e) => {
                debug!("Decode attempt {} failed: {}", attempt, e);
                TickOutcome::Continue
            }
        }
    }
}

struct DecodeLoop {
    inner: Arc<Mutex<SessionInner>>,
    token: CancellationToken,
    generation: u64,
    interval: Duration,
    start_delay: Duration,
    options: DecodeOptions,
    on_scan: ScanCallback,
    events: Option<Arc<EventBus>>,
}

impl DecodeLoop {
    async fn run(self) {
        if !self.start_delay.is_zero() {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(self.start_delay) => {}
            }
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = self.inner.lock().decode_tick(self.generation, &self.options);

            match outcome {
                TickOutcome::Continue => {}
                TickOutcome::Halt => break,
                TickOutcome::Found { payload, attempts } => {
                    if let Some(bus) = &self.events {
                        let _ = bus.publish(KioskEvent::PayloadDecoded {
                            payload: payload.clone(),
                            attempts,
                        });
                        let _ = bus.publish(KioskEvent::SessionStopped { attempts });
                    }
                    (self.on_scan)(payload);
                    break;
                }
            }
        }

        trace!("Decode loop for generation {} exited", self.generation);
    }
}

/// One camera-based QR scan: acquire a stream, decode frames on a fixed
/// tick, hand exactly one payload to the callback, release the camera.
///
/// The session can be restarted after it stops. Dropping it releases the
/// camera.
pub struct ScannerSession {
    id: Uuid,
    provider: Arc<dyn CameraProvider>,
    scanner: ScannerConfig,
    camera: CameraConfig,
    inner: Arc<Mutex<SessionInner>>,
    on_scan: ScanCallback,
    events: Option<Arc<EventBus>>,
}

impl ScannerSession {
    pub fn builder() -> ScannerSessionBuilder {
        ScannerSessionBuilder::new()
    }

    /// Request a camera stream and begin decoding once it delivers a frame.
    ///
    /// Returns after the stream is running (or acquisition failed). Fails
    /// with [`ScannerError::AlreadyActive`] while starting or running.
    pub async fn start(&self, facing: Facing) -> std::result::Result<(), ScannerError> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.state.is_active() {
                warn!("Scanner session {} is already active", self.id);
                return Err(ScannerError::AlreadyActive);
            }

            inner.state = ScanState::Starting;
            inner.facing = facing;
            inner.last_payload = None;
            inner.attempt_count = 0;
            inner.last_error = None;
            inner.generation += 1;
            inner.generation
        };

        self.publish(KioskEvent::SessionStarting {
            facing,
            timestamp: SystemTime::now(),
        });

        let constraints = ScanRequest::new(facing).constraints(&self.camera);
        info!(
            "Requesting {} camera from {} provider (ideal {}x{}, min {}x{})",
            facing,
            self.provider.name(),
            constraints.ideal_width,
            constraints.ideal_height,
            constraints.min_width,
            constraints.min_height
        );

        let mut stream = match self.provider.open_stream(&constraints).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail_acquisition(generation, e)),
        };

        let frame_timeout = self.camera.frame_timeout();
        let ready = tokio::time::timeout(frame_timeout, stream.wait_ready()).await;
        let (width, height) = match ready {
            Ok(Ok(dimensions)) => dimensions,
            Ok(Err(e)) => {
                stream.close();
                return Err(self.fail_acquisition(generation, e));
            }
            Err(_) => {
                stream.close();
                return Err(self.fail_acquisition(
                    generation,
                    CameraError::CaptureStream {
                        details: format!("no frame within {:?}", frame_timeout),
                    },
                ));
            }
        };

        if !constraints.accepts(width, height) {
            stream.close();
            return Err(self.fail_acquisition(
                generation,
                CameraError::Overconstrained {
                    constraint: "resolution".to_string(),
                    details: format!(
                        "stream settled at {}x{}, minimum is {}x{}",
                        width, height, constraints.min_width, constraints.min_height
                    ),
                },
            ));
        }

        {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != ScanState::Starting {
                debug!("Scanner session {} stopped during acquisition", self.id);
                stream.close();
                return Ok(());
            }

            let token = CancellationToken::new();
            let decode_loop = DecodeLoop {
                inner: Arc::clone(&self.inner),
                token: token.clone(),
                generation,
                interval: self.scanner.scan_interval().max(MIN_SCAN_INTERVAL),
                start_delay: self.scanner.start_delay(),
                options: DecodeOptions {
                    inversion: self.scanner.inversion,
                },
                on_scan: Arc::clone(&self.on_scan),
                events: self.events.clone(),
            };

            inner.stream = Some(stream);
            inner.state = ScanState::Running;
            inner.timer = Some(DecodeTimer {
                token,
                _task: tokio::spawn(decode_loop.run()),
            });
        }

        info!("Scanner session {} running at {}x{}", self.id, width, height);
        self.publish(KioskEvent::SessionRunning {
            width,
            height,
            timestamp: SystemTime::now(),
        });

        Ok(())
    }

    /// Release the camera and cancel decoding. Idempotent.
    pub fn stop(&self) {
        let (was_active, attempts) = {
            let mut inner = self.inner.lock();
            let was_active = inner.state.is_active();
            inner.release();
            (was_active, inner.attempt_count)
        };

        if was_active {
            info!(
                "Scanner session {} stopped after {} attempts",
                self.id, attempts
            );
            self.publish(KioskEvent::SessionStopped { attempts });
        }
    }

    /// Stop, wait out the hardware release gap, then start the other camera.
    ///
    /// A `stop` or `start` during the gap wins and the switch does not reopen
    /// the camera.
    pub async fn switch_facing(&self) -> std::result::Result<(), ScannerError> {
        let next = self.facing().opposite();
        self.stop();
        let mark = {
            let mut inner = self.inner.lock();
            inner.facing = next;
            (inner.generation, inner.releases)
        };

        let delay = self.scanner.switch_delay();
        debug!("Switching to {} camera in {:?}", next, delay);
        tokio::time::sleep(delay).await;

        {
            let inner = self.inner.lock();
            if (inner.generation, inner.releases) != mark {
                debug!(
                    "Scanner session {} was stopped or restarted during the switch",
                    self.id
                );
                return Ok(());
            }
        }

        self.start(next).await
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ScanState {
        self.inner.lock().state
    }

    pub fn facing(&self) -> Facing {
        self.inner.lock().facing
    }

    pub fn last_payload(&self) -> Option<String> {
        self.inner.lock().last_payload.clone()
    }

    pub fn attempt_count(&self) -> u64 {
        self.inner.lock().attempt_count
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.inner.lock().last_error
    }

    /// Whether a decode timer is currently scheduled
    pub fn is_decode_loop_active(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            id: self.id.to_string(),
            state: inner.state,
            facing: inner.facing,
            last_payload: inner.last_payload.clone(),
            attempt_count: inner.attempt_count,
            last_error: inner.last_error,
        }
    }

    fn fail_acquisition(&self, generation: u64, err: CameraError) -> ScannerError {
        let kind = err.kind();
        error!("Camera acquisition failed ({}): {}", kind, err);

        {
            let mut inner = self.inner.lock();
            if inner.generation == generation {
                inner.state = ScanState::Stopped;
                inner.last_error = Some(kind);
            }
        }

        self.publish(KioskEvent::CameraFailed {
            kind,
            message: err.to_string(),
        });

        err.into()
    }

    fn publish(&self, event: KioskEvent) {
        if let Some(bus) = &self.events {
            let _ = bus.publish(event);
        }
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for scanner sessions
pub struct ScannerSessionBuilder {
    provider: Option<Arc<dyn CameraProvider>>,
    decoder: Option<Box<dyn FrameDecoder>>,
    scanner: ScannerConfig,
    camera: CameraConfig,
    on_scan: Option<ScanCallback>,
    events: Option<Arc<EventBus>>,
}

impl ScannerSessionBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            decoder: None,
            scanner: ScannerConfig::default(),
            camera: CameraConfig::default(),
            on_scan: None,
            events: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Defaults to [`QrDecoder`]
    pub fn decoder(mut self, decoder: Box<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn scanner_config(mut self, config: ScannerConfig) -> Self {
        self.scanner = config;
        self
    }

    pub fn camera_config(mut self, config: CameraConfig) -> Self {
        self.camera = config;
        self
    }

    pub fn on_scan<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_scan = Some(Arc::new(callback));
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn build(self) -> Result<ScannerSession> {
        let provider = self
            .provider
            .ok_or_else(|| PointscanError::system("Camera provider must be specified"))?;
        let on_scan = self
            .on_scan
            .ok_or_else(|| PointscanError::system("Scan callback must be specified"))?;
        let decoder = self
            .decoder
            .unwrap_or_else(|| Box::new(QrDecoder::new()));

        let inner = SessionInner {
            state: ScanState::Idle,
            facing: self.scanner.facing,
            last_payload: None,
            attempt_count: 0,
            last_error: None,
            stream: None,
            timer: None,
            decoder,
            buffer: PixelBuffer::new(),
            generation: 0,
            releases: 0,
        };

        Ok(ScannerSession {
            id: Uuid::new_v4(),
            provider,
            scanner: self.scanner,
            camera: self.camera,
            inner: Arc::new(Mutex::new(inner)),
            on_scan,
            events: self.events,
        })
    }
}

impl Default for ScannerSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
