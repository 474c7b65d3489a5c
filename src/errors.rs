use serde::Serialize;
use thiserror::Error;

/// How a remote provider refused a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteFailure {
    Auth,
    RateLimited,
    Other,
}

impl RemoteFailure {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimited,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("REMOTE_FAILURE: {service}: {message}")]
    Remote {
        service: &'static str,
        kind: RemoteFailure,
        message: String,
    },
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFIGURATION: {0}")]
    Configuration(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn remote(service: &'static str, kind: RemoteFailure, message: impl Into<String>) -> Self {
        Self::Remote {
            service,
            kind,
            message: message.into(),
        }
    }

    /// Transport-level failure (connect, timeout, body decode). URLs are stripped since
    /// some providers carry keys in the query string.
    pub fn transport(service: &'static str, error: reqwest::Error) -> Self {
        let kind = error
            .status()
            .map(|status| RemoteFailure::from_status(status.as_u16()))
            .unwrap_or(RemoteFailure::Other);
        Self::remote(service, kind, error.without_url().to_string())
    }

    /// Names a missing setting and where it can be supplied. Never carries a value.
    pub fn missing_setting(key: &str, env_var: &str) -> Self {
        Self::Configuration(format!("{} is not configured (set {} or save it in config)", key, env_var))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Remote { kind, .. } => match kind {
                RemoteFailure::Auth => 401,
                RemoteFailure::RateLimited => 429,
                RemoteFailure::Other => 500,
            },
            Self::NotFound(_) => 404,
            Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::{AppError, RemoteFailure};

    #[test]
    fn remote_failures_map_to_provider_status() {
        assert_eq!(AppError::remote("sheets", RemoteFailure::from_status(403), "denied").status_code(), 401);
        assert_eq!(AppError::remote("gemini", RemoteFailure::from_status(429), "slow down").status_code(), 429);
        assert_eq!(AppError::remote("drive", RemoteFailure::from_status(502), "bad gateway").status_code(), 500);
    }

    #[test]
    fn missing_setting_names_key_only() {
        let error = AppError::missing_setting("geminiApiKey", "GEMINI_API_KEY");
        let message = error.to_string();
        assert!(message.contains("geminiApiKey"));
        assert!(message.contains("GEMINI_API_KEY"));
        assert_eq!(error.status_code(), 500);
    }
}
