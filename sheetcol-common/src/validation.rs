//! Configuration validation.
//!
//! Catches configurations that would only fail later at runtime: a Telegram
//! channel without a token, a webhook Telegram would refuse, zero limits.

use thiserror::Error;

use crate::config::{ChannelsConfig, Config, ExtractionConfig, ObservabilityConfig, TelegramConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.channels.validate() {
            errors.push(e);
        }
        if let Err(e) = self.extraction.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ChannelsConfig {
    fn validate(&self) -> ValidationResult<()> {
        let telegram_enabled = self.telegram.as_ref().is_some_and(|t| t.enabled);
        let cli_enabled = self.cli.as_ref().is_some_and(|c| c.enabled);

        if !telegram_enabled && !cli_enabled {
            return Err(ValidationError::MissingField {
                field: "channels.telegram.bot_token (or BOT_TOKEN)".into(),
            });
        }

        match &self.telegram {
            Some(telegram) if telegram.enabled => telegram.validate(),
            _ => Ok(()),
        }
    }
}

impl Validate for TelegramConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.bot_token.as_deref().map_or(true, str::is_empty) {
            return Err(ValidationError::MissingField {
                field: "channels.telegram.bot_token (or BOT_TOKEN)".into(),
            });
        }

        if self.poll_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "channels.telegram.poll_timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.webhook.enabled {
            if self.webhook.port == 0 {
                return Err(ValidationError::InvalidValue {
                    field: "channels.telegram.webhook.port".into(),
                    reason: "must be between 1 and 65535".into(),
                });
            }
            // A missing URL is allowed: the service falls back to polling.
            if let Some(url) = &self.webhook.url {
                if !url.starts_with("https://") {
                    return Err(ValidationError::InvalidValue {
                        field: "channels.telegram.webhook.url".into(),
                        reason: "Telegram only delivers webhooks over https".into(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Validate for ExtractionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.accepted_extensions.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "extraction.accepted_extensions".into(),
                reason: "at least one extension is required".into(),
            });
        }
        if self.max_file_bytes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "extraction.max_file_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.output_filename.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "extraction.output_filename".into(),
            });
        }
        if self.accepted_extensions.iter().any(|ext| {
            self.output_filename
                .to_lowercase()
                .ends_with(&ext.to_lowercase())
        }) {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "output file '{}' would be treated as a spreadsheet upload",
                    self.output_filename
                ),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        const FORMATS: &[&str] = &["pretty", "json"];

        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("expected one of {LEVELS:?}"),
            });
        }
        if !FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected one of {FORMATS:?}"),
            });
        }
        Ok(())
    }
}
