use serde::ser::Serializer;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("json decode error: {0}")]
    SimdJson(#[from] simd_json::Error),
    #[error("realtime driver is no longer running")]
    DriverGone,
}

impl serde::Serialize for RealtimeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Reasons a chart configuration does not yield a live session.
///
/// None of these are failures from the host's point of view: the session
/// simply stays inert.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("realtime updates are disabled")]
    Disabled,
    #[error("dataStreamURL is missing")]
    MissingUrl,
    #[error("dataStreamURL is not a valid absolute url: {0}")]
    InvalidUrl(String),
    #[error("refresh interval must be positive")]
    NonPositiveInterval,
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    Transport,
    Status,
    Aborted,
    Timeout,
}

impl NetworkErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport error",
            Self::Status => "unexpected http status",
            Self::Aborted => "request aborted",
            Self::Timeout => "request timed out",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("fetch of {url} failed: {}", .kind.as_str())]
pub struct NetworkError {
    pub url: String,
    pub status: Option<u16>,
    pub kind: NetworkErrorKind,
    #[source]
    pub transport_error: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl NetworkError {
    pub fn aborted(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            kind: NetworkErrorKind::Aborted,
            transport_error: None,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            kind: NetworkErrorKind::Timeout,
            transport_error: None,
        }
    }

    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            kind: NetworkErrorKind::Status,
            transport_error: None,
        }
    }

    pub fn transport<E>(url: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            url: url.into(),
            status: None,
            kind: NetworkErrorKind::Transport,
            transport_error: Some(Arc::new(error)),
        }
    }

    pub fn from_reqwest(url: impl Into<String>, error: reqwest::Error) -> Self {
        let status = error.status().map(|code| code.as_u16());
        let kind = if error.is_timeout() {
            NetworkErrorKind::Timeout
        } else if status.is_some() {
            NetworkErrorKind::Status
        } else {
            NetworkErrorKind::Transport
        };
        Self {
            url: url.into(),
            status,
            kind,
            transport_error: Some(Arc::new(error)),
        }
    }

    /// Human readable description of the underlying transport failure, if any.
    pub fn transport_message(&self) -> Option<String> {
        self.transport_error.as_ref().map(|error| error.to_string())
    }

    pub fn is_aborted(&self) -> bool {
        self.kind == NetworkErrorKind::Aborted
    }
}
