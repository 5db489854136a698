pub mod keyboard;

mod kiosk;
mod runtime;
mod types;


pub use keyboard::{KeyCommand, KeyboardInputHandler};
pub use kiosk::{Kiosk, KioskBuilder};
pub use types::{KioskOptions, KioskSummary, ShutdownReason};
