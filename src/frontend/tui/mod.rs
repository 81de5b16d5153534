//! TUI preview (ratatui-based)
//!
//! Draws the snapshot surface, the engine's overlay and a status line, and
//! stands in for a dictionary popup so the lookup and mine flow can be tried
//! with nothing but a gamepad and a terminal.

pub mod app;
pub mod simulated_popup;
pub mod surface_view;

pub use app::TuiFrontend;
pub use simulated_popup::SimulatedPopupLookup;
pub use surface_view::PreviewView;
