use crate::error::{ErrorKind, EventBusError};
use crate::scanner::Facing;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events raised by the scanner session and the kiosk front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KioskEvent {
    /// A camera stream was requested
    SessionStarting { facing: Facing, timestamp: SystemTime },
    /// The stream delivered its first frame and decoding began
    SessionRunning {
        width: u32,
        height: u32,
        timestamp: SystemTime,
    },
    /// A QR payload was decoded
    PayloadDecoded { payload: String, attempts: u64 },
    /// The session released its camera
    SessionStopped { attempts: u64 },
    /// Camera acquisition failed
    CameraFailed { kind: ErrorKind, message: String },
    /// Operator asked for the other camera
    SwitchCameraRequested { timestamp: SystemTime },
    /// Operator or signal asked the kiosk to exit
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl KioskEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            KioskEvent::SessionStarting { facing, .. } => {
                format!("Requesting {} camera", facing)
            }
            KioskEvent::SessionRunning { width, height, .. } => {
                format!("Camera running at {}x{}", width, height)
            }
            KioskEvent::PayloadDecoded { payload, attempts } => {
                format!("QR code decoded after {} attempts: {}", attempts, payload)
            }
            KioskEvent::SessionStopped { attempts } => {
                format!("Scanner stopped after {} attempts", attempts)
            }
            KioskEvent::CameraFailed { kind, message } => {
                format!("Camera failed ({}): {}", kind, message)
            }
            KioskEvent::SwitchCameraRequested { .. } => "Camera switch requested".to_string(),
            KioskEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            KioskEvent::SessionStarting { .. } => "session_starting",
            KioskEvent::SessionRunning { .. } => "session_running",
            KioskEvent::PayloadDecoded { .. } => "payload_decoded",
            KioskEvent::SessionStopped { .. } => "session_stopped",
            KioskEvent::CameraFailed { .. } => "camera_failed",
            KioskEvent::SwitchCameraRequested { .. } => "switch_camera_requested",
            KioskEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<KioskEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<KioskEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Never blocks, so it is safe to call while holding the session lock.
    pub fn publish(&self, event: KioskEvent) -> Result<usize, EventBusError> {
        match &event {
            KioskEvent::PayloadDecoded { payload, .. } => {
                info!("QR code decoded: {}", payload);
            }
            KioskEvent::CameraFailed { kind, message } => {
                warn!("Camera failed ({}): {}", kind, message);
            }
            KioskEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Receive the next event, mapping broadcast failures onto [`EventBusError`]
pub async fn recv_event(
    receiver: &mut broadcast::Receiver<KioskEvent>,
) -> Result<KioskEvent, EventBusError> {
    match receiver.recv().await {
        Ok(event) => Ok(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!("Event receiver lagged, skipped {} events", skipped);
            Err(EventBusError::Lagged { skipped })
        }
        Err(broadcast::error::RecvError::Closed) => Err(EventBusError::Closed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(8);
        let mut receiver = bus.subscribe();

        let delivered = bus
            .publish(KioskEvent::SessionStopped { attempts: 3 })
            .unwrap();
        assert_eq!(delivered, 1);

        let event = recv_event(&mut receiver).await.unwrap();
        assert_eq!(event, KioskEvent::SessionStopped { attempts: 3 });
        assert_eq!(event.event_type(), "session_stopped");
    }

    #[test]
    fn test_publish_without_subscribers_fails() {
        let bus = EventBus::new(8);

        assert!(!bus.has_subscribers());
        assert!(bus
            .publish(KioskEvent::SwitchCameraRequested {
                timestamp: SystemTime::now()
            })
            .is_err());
    }

    #[tokio::test]
    async fn test_lagged_receiver_reports_skipped() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();

        for attempts in 0..5 {
            let _ = bus.publish(KioskEvent::SessionStopped { attempts });
        }

        match recv_event(&mut receiver).await {
            Err(EventBusError::Lagged { skipped }) => assert_eq!(skipped, 3),
            other => panic!("Expected lag, got {:?}", other),
        }
    }
}
