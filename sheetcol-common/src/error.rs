//! Errors of the configuration and HTTP plumbing.
//!
//! Extraction and session failures have their own types in `sheetcol-core`;
//! transport failures live with the channels.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Config files that exist but cannot be used.
    #[error("bad configuration: {0}")]
    Config(String),

    /// Caller failed the webhook secret check.
    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The message queue is gone (shutting down).
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap the error with a description of what was being attempted.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// HTTP status reported by the webhook routes.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) => 401,
            Self::NotFound(_) => 404,
            Self::Json(_) => 400,
            Self::Unavailable(_) => 503,
            Self::WithContext { source, .. } => source.status_code(),
            Self::Config(_) | Self::Io(_) => 500,
        }
    }
}

/// `.context(...)` for any result whose error converts into [`Error`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_status_codes() {
        assert_eq!(Error::Auth("token mismatch".into()).status_code(), 401);
        assert_eq!(Error::NotFound("telegram channel".into()).status_code(), 404);
        assert_eq!(Error::Unavailable("queue closed".into()).status_code(), 503);
        assert_eq!(Error::Config("x".into()).status_code(), 500);

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(Error::from(json).status_code(), 400);
    }

    #[test]
    fn test_context_keeps_status() {
        let err = Error::Unavailable("queue closed".into()).with_context("forwarding update");
        assert!(matches!(err, Error::WithContext { .. }));
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.to_string(), "forwarding update: unavailable: queue closed");
    }

    #[test]
    fn test_result_ext_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = res.context("reading config.json").unwrap_err();
        assert_eq!(err.to_string(), "reading config.json: missing");
    }
}
