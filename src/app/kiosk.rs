use super::keyboard::KeyboardInputHandler;
use super::runtime::shutdown_signal;
use super::types::{KioskOptions, KioskSummary, ShutdownReason};
use crate::attribution::AttributionDesk;
use crate::config::PointscanConfig;
use crate::error::{AttributionError, EventBusError, PointscanError, Result, ScannerError};
use crate::events::{recv_event, EventBus, KioskEvent};
use crate::scanner::{CameraProvider, Facing, FrameDecoder, ScannerSession};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Scan-and-attribute front desk: one scanner session feeding the
/// attribution desk until the operator quits or the scan quota is reached.
pub struct Kiosk {
    event_bus: Arc<EventBus>,
    desk: AttributionDesk,
    session: ScannerSession,
    payloads: mpsc::UnboundedReceiver<String>,
    options: KioskOptions,
    keyboard: Option<KeyboardInputHandler>,
}

impl Kiosk {
    pub fn builder() -> KioskBuilder {
        KioskBuilder::new()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn session(&self) -> &ScannerSession {
        &self.session
    }

    pub fn desk(&self) -> &AttributionDesk {
        &self.desk
    }

    /// Run until quit, signal, or the scan quota. The camera is released on
    /// every exit path.
    pub async fn run(&mut self) -> Result<KioskSummary> {
        let reason_id = self
            .options
            .reason
            .ok_or(AttributionError::NoReasonSelected)?;
        let reason = self.desk.reason(reason_id)?.clone();
        self.announce(&format!(
            "Motif: {} ({}). Scannez le badge de l'étudiant.",
            reason.label,
            reason.points_label()
        ));

        let mut events = self.event_bus.subscribe();

        if self.options.keyboard {
            let handler = KeyboardInputHandler::new(Arc::clone(&self.event_bus));
            handler.start().await?;
            self.keyboard = Some(handler);
        }

        let mut summary = KioskSummary {
            attributions: Vec::new(),
            rejected: Vec::new(),
            reason: ShutdownReason::Completed,
        };

        let outcome = self.scan_loop(reason_id, &mut events, &mut summary).await;

        self.session.stop();
        if let Some(handler) = self.keyboard.take() {
            handler.stop().await?;
        }

        summary.reason = outcome?;
        info!(
            "Kiosk stopped ({:?}) after {} scans",
            summary.reason,
            summary.scans()
        );
        Ok(summary)
    }

    async fn scan_loop(
        &mut self,
        reason: i64,
        events: &mut broadcast::Receiver<KioskEvent>,
        summary: &mut KioskSummary,
    ) -> Result<ShutdownReason> {
        self.start_session(self.options.facing).await?;

        let signal = shutdown_signal();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                shutdown = &mut signal => return Ok(shutdown),

                Some(payload) = self.payloads.recv() => {
                    self.attribute(&payload, reason, summary).await;

                    let quota_reached = self
                        .options
                        .max_scans
                        .is_some_and(|max| summary.scans() >= max);
                    if quota_reached || !self.options.continuous {
                        return Ok(ShutdownReason::Completed);
                    }

                    self.start_session(self.session.facing()).await?;
                }

                event = recv_event(events) => match event {
                    Ok(KioskEvent::SwitchCameraRequested { .. }) => {
                        if !self.session.state().is_active() {
                            debug!("Ignoring camera switch while scanner is idle");
                            continue;
                        }
                        if let Err(e) = self.session.switch_facing().await {
                            self.announce(&e.user_message());
                            return Err(e.into());
                        }
                        self.announce(&format!("Caméra: {}", self.session.facing()));
                    }
                    Ok(KioskEvent::ShutdownRequested { reason, .. }) => {
                        debug!("Shutdown requested on event bus: {}", reason);
                        return Ok(ShutdownReason::UserRequest);
                    }
                    Ok(_) => {}
                    Err(EventBusError::Lagged { .. }) => {}
                    Err(e) => return Err(e.into()),
                },
            }
        }
    }

    async fn start_session(&self, facing: Facing) -> Result<()> {
        match self.session.start(facing).await {
            Ok(()) => Ok(()),
            Err(e @ ScannerError::Acquisition { .. }) => {
                self.announce(&e.user_message());
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn attribute(&mut self, payload: &str, reason: i64, summary: &mut KioskSummary) {
        match self.desk.handle_scan(payload, Some(reason)).await {
            Ok(attribution) => {
                self.announce(&format!(
                    "{} ({}) : {} {} pts, {}",
                    attribution.student_name,
                    attribution.student_level,
                    attribution.reason,
                    attribution.points,
                    attribution.timestamp
                ));
                summary.attributions.push(attribution);
            }
            Err(e) => {
                warn!("Scan of '{}' rejected: {}", payload, e);
                self.announce(&e.to_string());
                summary.rejected.push(e);
            }
        }
    }

    fn announce(&self, message: &str) {
        if !self.options.announce {
            return;
        }
        // Raw mode needs an explicit carriage return
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}\r\n", message);
        let _ = stdout.flush();
    }
}

/// Builder for the kiosk
pub struct KioskBuilder {
    config: PointscanConfig,
    desk: Option<AttributionDesk>,
    provider: Option<Arc<dyn CameraProvider>>,
    decoder: Option<Box<dyn FrameDecoder>>,
    event_bus: Option<Arc<EventBus>>,
    options: KioskOptions,
}

impl KioskBuilder {
    pub fn new() -> Self {
        Self {
            config: PointscanConfig::default(),
            desk: None,
            provider: None,
            decoder: None,
            event_bus: None,
            options: KioskOptions::default(),
        }
    }

    pub fn config(mut self, config: PointscanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn desk(mut self, desk: AttributionDesk) -> Self {
        self.desk = Some(desk);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CameraProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn decoder(mut self, decoder: Box<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn options(mut self, options: KioskOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Kiosk> {
        let desk = self
            .desk
            .ok_or_else(|| PointscanError::system("Attribution desk must be specified"))?;
        let provider = self
            .provider
            .ok_or_else(|| PointscanError::system("Camera provider must be specified"))?;
        let event_bus = self.event_bus.unwrap_or_else(|| {
            Arc::new(EventBus::new(self.config.system.event_bus_capacity))
        });

        let (sender, payloads) = mpsc::unbounded_channel();

        let mut session = ScannerSession::builder()
            .provider(provider)
            .scanner_config(self.config.scanner.clone())
            .camera_config(self.config.camera.clone())
            .event_bus(Arc::clone(&event_bus))
            .on_scan(move |payload| {
                if sender.send(payload).is_err() {
                    warn!("Kiosk gone, dropping scanned payload");
                }
            });
        if let Some(decoder) = self.decoder {
            session = session.decoder(decoder);
        }

        Ok(Kiosk {
            event_bus,
            desk,
            session: session.build()?,
            payloads,
            options: self.options,
            keyboard: None,
        })
    }
}

impl Default for KioskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
