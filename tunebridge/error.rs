use flexi_logger::FlexiLoggerError;
use serde::{Deserialize, Serialize};
use std::io::Error as IoError;
use thiserror::Error;
use zbus::Error as ZbusError;

#[derive(Error, Debug)]
pub enum App {
    #[error("Channel not registered: {0}")]
    ChannelNotRegistered(String),

    #[error("Channel already has a handler: {0}")]
    HandlerAlreadyRegistered(String),

    #[error("Request on {channel} rejected: {message}")]
    Rejected { channel: String, message: String },

    #[error("Transport closed")]
    TransportClosed,

    #[error("No plugin for media {0}")]
    NoPluginForMedia(String),

    #[error("No source available for media {0}")]
    NoSourceAvailable(String),

    #[error("Invalid window: {0}")]
    WindowMissing(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O operation failed: {0}")]
    Io(#[from] IoError),

    #[error("Data parsing error: {0}")]
    DataParsing(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Logger initialization error: {0}")]
    Logger(#[from] FlexiLoggerError),

    #[error("ZBus error: {0}")]
    Zbus(#[from] ZbusError),
}

/// Failure category carried by a rejected reply.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteErrorKind {
    ChannelNotRegistered,
    InvalidPayload,
    Handler,
}

/// Plain-data rejection reason. Only the kind and the rendered message cross
/// the process boundary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_app(self, channel: &str) -> App {
        match self.kind {
            RemoteErrorKind::ChannelNotRegistered => App::ChannelNotRegistered(channel.to_string()),
            RemoteErrorKind::InvalidPayload | RemoteErrorKind::Handler => App::Rejected {
                channel: channel.to_string(),
                message: self.message,
            },
        }
    }
}

impl From<&App> for RemoteError {
    fn from(error: &App) -> Self {
        let kind = match error {
            App::ChannelNotRegistered(_) => RemoteErrorKind::ChannelNotRegistered,
            App::DataParsing(_) => RemoteErrorKind::InvalidPayload,
            _ => RemoteErrorKind::Handler,
        };
        RemoteError::new(kind, error.to_string())
    }
}
