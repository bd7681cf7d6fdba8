//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod app_settings;
pub mod clock;
pub mod command_channel;
pub mod persistence;
pub mod ports;
pub mod queues;
pub mod rcon;
