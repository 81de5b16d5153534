//! Core navigation logic
//!
//! Everything that decides what the cursor does lives here. NO imports from
//! frontend/ or terminal code. The engine updates its own state and the
//! overlay; frontends read and render.

pub mod confirm;
pub mod engine;
pub mod feedback;
pub mod furigana;
pub mod input_router;
pub mod local_engine;
pub mod navigation;
pub mod pointer;
pub mod protocol;
pub mod state;
pub mod text_index;
pub mod timers;
pub mod tokenizer;

pub use engine::Engine;
pub use protocol::{InboundMessage, OutboundMessage};
pub use state::GamepadRegistry;
