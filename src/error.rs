use thiserror::Error;

use crate::template::TemplateError;

/// A failure reported by one of the browser host APIs.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PopupError {
    #[error("could not query the active tab: {0}")]
    TabQuery(HostError),
    #[error("no active tab with an id")]
    NoActiveTab,
    #[error("could not read settings: {0}")]
    Settings(String),
    #[error("no output presets are configured")]
    NoPresets,
    #[error("preset {index} does not exist ({len} configured)")]
    PresetOutOfRange { index: usize, len: usize },
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("invalid request url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Transport(HostError),
}
