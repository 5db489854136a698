use crate::error::Result;
use crate::events::{EventBus, KioskEvent};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Operator command bound to a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    SwitchCamera,
    Quit,
}

impl KeyCommand {
    /// `s` switches camera; `q`, Esc and Ctrl-C quit
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(KeyCommand::Quit)
            }
            KeyCode::Char('s') | KeyCode::Char('S') => Some(KeyCommand::SwitchCamera),
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyCommand::Quit),
            _ => None,
        }
    }

    pub fn to_event(self) -> KioskEvent {
        match self {
            KeyCommand::SwitchCamera => KioskEvent::SwitchCameraRequested {
                timestamp: SystemTime::now(),
            },
            KeyCommand::Quit => KioskEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "User requested via keyboard".to_string(),
            },
        }
    }
}

/// Turns key presses into kiosk events while a scan is running
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard active: 's' switches camera, 'q' or Esc quits");

        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            // Raw mode delivers single key presses, Ctrl-C included
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key)) = event::read() else {
                            continue;
                        };

                        let Some(command) = KeyCommand::from_key(&key) else {
                            debug!("Key pressed: {:?}", key.code);
                            continue;
                        };

                        debug!("Keyboard command: {:?}", command);
                        if let Err(e) = event_bus.publish(command.to_event()) {
                            warn!("Failed to publish keyboard command: {}", e);
                        }

                        if command == KeyCommand::Quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the handler and restore the terminal
    pub async fn stop(&self) -> Result<()> {
        debug!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Let the polling task notice the cancellation and leave raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
