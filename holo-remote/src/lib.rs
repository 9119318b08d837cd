//! # holo-remote: headless holographic remoting host
//!
//! Renders simulated cameras through the `holo-core` frame pipeline,
//! keeps a remote session alive across network drops and graphics
//! device loss, and reports frame statistics.

pub mod app;
pub mod config;
pub mod stats;
