//! Plumbing shared by the sheetcol crates: layered JSON configuration with
//! environment overrides, its validation, the HTTP-facing error type, logging
//! setup, and text helpers for logs and replies.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    ChannelsConfig, CliChannelConfig, Config, ExtractionConfig, NetworkConfig,
    ObservabilityConfig, TelegramConfig, WebhookConfig,
};
pub use error::{Error, Result, ResultExt};
pub use logging::{init_logging, LogFormat};
pub use validation::{Validate, ValidationError, ValidationResult};
