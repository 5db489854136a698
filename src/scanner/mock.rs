use super::decoder::FrameDecoder;
use super::provider::{CameraProvider, VideoStream};
use super::types::{DecodeOptions, DecodeResult, Facing, StreamConstraints};
use crate::error::{CameraError, ScannerError};
use crate::frame::{FrameData, FrameFormat, PixelBuffer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

#[derive(Default)]
struct MockCameraState {
    failures: Mutex<VecDeque<CameraError>>,
    opened: Mutex<Vec<StreamConstraints>>,
    closes: AtomicUsize,
}

/// Camera provider for tests and simulated scans.
///
/// Every stream it hands out serves blank frames; the scripted decoder on the
/// other side decides what is "seen".
#[derive(Clone)]
pub struct MockCameraProvider {
    state: Arc<MockCameraState>,
    resolutions: Vec<(u32, u32)>,
    ready_delay: Duration,
}

impl MockCameraProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockCameraState::default()),
            resolutions: vec![(64, 48)],
            ready_delay: Duration::ZERO,
        }
    }

    /// Serve frames at `resolutions[n]` for the n-th frame, repeating the
    /// last entry once exhausted
    pub fn with_resolutions(mut self, resolutions: Vec<(u32, u32)>) -> Self {
        if !resolutions.is_empty() {
            self.resolutions = resolutions;
        }
        self
    }

    /// Delay before a new stream reports its first frame
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Make the next `open_stream` call fail with `error`
    pub fn fail_next_open(&self, error: CameraError) {
        self.state.failures.lock().push_back(error);
    }

    pub fn open_count(&self) -> usize {
        self.state.opened.lock().len()
    }

    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Facings requested so far, in order, including failed requests
    pub fn requested_facings(&self) -> Vec<Facing> {
        self.state.opened.lock().iter().map(|c| c.facing).collect()
    }

    pub fn last_constraints(&self) -> Option<StreamConstraints> {
        self.state.opened.lock().last().copied()
    }
}

impl Default for MockCameraProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraProvider for MockCameraProvider {
    async fn open_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn VideoStream>, CameraError> {
        self.state.opened.lock().push(*constraints);

        if let Some(error) = self.state.failures.lock().pop_front() {
            debug!("Mock camera refusing {} stream: {}", constraints.facing, error);
            return Err(error);
        }

        debug!("Mock camera opened {} stream", constraints.facing);
        Ok(Box::new(MockStream {
            state: Arc::clone(&self.state),
            resolutions: self.resolutions.clone(),
            ready_delay: self.ready_delay,
            frames_served: 0,
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockStream {
    state: Arc<MockCameraState>,
    resolutions: Vec<(u32, u32)>,
    ready_delay: Duration,
    frames_served: usize,
    closed: bool,
}

impl MockStream {
    fn resolution_at(&self, index: usize) -> (u32, u32) {
        let last = self.resolutions.len() - 1;
        self.resolutions[index.min(last)]
    }
}

#[async_trait]
impl VideoStream for MockStream {
    async fn wait_ready(&mut self) -> Result<(u32, u32), CameraError> {
        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay).await;
        }
        if self.closed {
            return Err(CameraError::CaptureStream {
                details: "stream closed before first frame".to_string(),
            });
        }
        Ok(self.dimensions())
    }

    fn current_frame(&mut self) -> Option<FrameData> {
        if self.closed {
            return None;
        }

        let (width, height) = self.resolution_at(self.frames_served);
        let id = self.frames_served as u64;
        self.frames_served += 1;

        Some(FrameData::new(
            id,
            SystemTime::now(),
            vec![u8::MAX; (width * height) as usize],
            width,
            height,
            FrameFormat::Gray8,
        ))
    }

    fn dimensions(&self) -> (u32, u32) {
        self.resolution_at(self.frames_served)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// One scripted decoder outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    NotFound,
    Found(String),
    Fail(String),
}

/// Decoder that replays a script of outcomes, then repeats a fallback
pub struct ScriptedDecoder {
    steps: VecDeque<ScriptStep>,
    fallback: ScriptStep,
    calls: Arc<AtomicU64>,
    seen: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl ScriptedDecoder {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: steps.into(),
            fallback: ScriptStep::NotFound,
            calls: Arc::new(AtomicU64::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Never finds anything
    pub fn never() -> Self {
        Self::new(Vec::new())
    }

    /// `NotFound` until the `attempt`-th call (1-based), which finds `payload`
    pub fn found_on(attempt: usize, payload: impl Into<String>) -> Self {
        let mut steps = vec![ScriptStep::NotFound; attempt.saturating_sub(1)];
        steps.push(ScriptStep::Found(payload.into()));
        Self::new(steps)
    }

    /// Outcome used once the script runs out
    pub fn with_fallback(mut self, fallback: ScriptStep) -> Self {
        self.fallback = fallback;
        self
    }

    /// Shared counter of decode calls
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.calls)
    }

    /// Shared log of buffer dimensions seen on each call
    pub fn seen_dimensions(&self) -> Arc<Mutex<Vec<(u32, u32)>>> {
        Arc::clone(&self.seen)
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode(
        &mut self,
        buffer: &PixelBuffer,
        _options: &DecodeOptions,
    ) -> Result<DecodeResult, ScannerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(buffer.dimensions());

        let step = self.steps.pop_front().unwrap_or_else(|| self.fallback.clone());
        match step {
            ScriptStep::NotFound => Ok(DecodeResult::NotFound),
            ScriptStep::Found(payload) => Ok(DecodeResult::Found(payload)),
            ScriptStep::Fail(details) => Err(ScannerError::Decode { details }),
        }
    }
}
