//! Client engine for the Zenbox digital detox box.
//! Polls the session log of the box, derives today's progress, points and the weekly overview,
//! runs a live timer for the open session and toggles zen mode on request.
//!

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod remote;
pub mod utils;
