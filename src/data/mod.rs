//! Data layer - Pure state without I/O coupling
//!
//! Geometry, text-surface records and the synthetic event vocabulary shared by
//! the engine, the collaborators and the preview frontend.
//! NO imports from frontend/ or network code.

pub mod events;
pub mod geometry;
pub mod text;

pub use events::*;
pub use geometry::*;
pub use text::*;
