use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("SLACK_TOKEN environment variable not set and no --token given")]
    MissingToken,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("malformed message timestamp: {0:?}")]
    MalformedTimestamp(String),

    #[error("unexpected start of thread {expected}: first reply has ts {found:?}")]
    ThreadRootMismatch {
        expected: String,
        found: Option<String>,
    },

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to move {from} to {to}: {source}")]
    MoveFile {
        from: String,
        to: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialize(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("zip archive error: {0}")]
    Zip(String),

    #[error("interactive selection failed: {0}")]
    Prompt(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
