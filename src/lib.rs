pub mod api;
pub mod channel;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod locator;
pub mod logging;
pub mod registry;
pub mod telemetry;
