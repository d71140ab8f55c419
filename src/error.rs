use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request to photo server failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("photo server returned {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to read settings file {path}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("mqtt client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("settings watch failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("slideshow controller is not running")]
    ControllerGone,

    #[error("display failed: {0}")]
    Presentation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
