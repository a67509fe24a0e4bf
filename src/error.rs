use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BorghiError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    /// The temporary photo handed to the queue is gone; the user has to retake it.
    #[error("Source asset missing: {}", path.display())]
    SourceMissing { path: PathBuf },

    /// Capture could not start: no fix, or nothing to photograph nearby
    #[error("Capture rejected: {reason}")]
    CaptureRejected { reason: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Probe {probe} failed: {message}")]
    Probe { probe: String, message: String },

    #[error("Registry error: {message}")]
    Registry { message: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl BorghiError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, S: Into<String>>(component: C, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn capture_rejected<S: Into<String>>(reason: S) -> Self {
        Self::CaptureRejected {
            reason: reason.into(),
        }
    }

    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn probe<P: Into<String>, S: Into<String>>(probe: P, message: S) -> Self {
        Self::Probe {
            probe: probe.into(),
            message: message.into(),
        }
    }

    pub fn registry<S: Into<String>>(message: S) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// True when the caller should prompt for a retake rather than report a storage fault
    pub fn is_source_missing(&self) -> bool {
        matches!(self, Self::SourceMissing { .. })
    }
}

/// Failure reported by an injected uploader. Its message is what ends up in
/// a record's `last_error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("{0}")]
    Rejected(String),

    #[error("network unavailable: {0}")]
    Network(String),

    #[error("asset unreadable: {0}")]
    Asset(String),
}

impl UploadError {
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected(message.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {0} events")]
    Lagged(u64),
}

pub type Result<T> = std::result::Result<T, BorghiError>;
