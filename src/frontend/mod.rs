//! Frontend abstraction layer
//!
//! The engine runs headless; a frontend only polls input and draws a
//! `PreviewView` captured from the engine after each batch of events.

pub mod events;
pub mod tui;

use anyhow::Result;
pub use events::{FrontendEvent, KeyAction};
pub use tui::{PreviewView, SimulatedPopupLookup, TuiFrontend};

pub trait Frontend {
    /// Pending input events (empty if none arrived within the poll timeout)
    fn poll_events(&mut self) -> Result<Vec<FrontendEvent>>;

    /// Draw one frame
    fn render(&mut self, view: &PreviewView) -> Result<()>;

    /// Restore the terminal
    fn cleanup(&mut self) -> Result<()>;

    /// Current terminal size in cells
    fn size(&self) -> (u16, u16);
}
