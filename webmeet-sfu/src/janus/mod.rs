//! Janus gateway control client

mod client;
pub mod types;

pub use client::{JanusClient, PluginHandle};
