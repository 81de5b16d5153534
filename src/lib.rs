//! padscan - gamepad navigation over on-screen text
//!
//! Drives a character or token cursor through the text blocks a host renders,
//! and turns confirm presses into lookup and mine events for a dictionary
//! popup. The host binary in `main.rs` wires the engine to the Input Server,
//! a snapshot surface and either a JSON-lines sink or the terminal preview.

pub mod config;
pub mod core;
pub mod data;
pub mod frontend;
pub mod lookup;
pub mod network;
pub mod surface;
