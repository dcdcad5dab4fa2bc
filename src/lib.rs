use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

pub mod api;
pub mod archive;
pub mod attachments;
pub mod cli;
pub mod commands;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod history;
pub mod model;
pub mod partition;
#[cfg(feature = "tui")]
pub mod picker;
pub mod settings;
pub mod slack;

pub use cli::{Cli, Commands, ExportArgs};
pub use error::{AppError, Result};
pub use model::{Conversation, ConversationKind, Message, Timestamp};

pub fn load_token() -> Result<String> {
    std::env::var("SLACK_TOKEN").map_err(|_| AppError::MissingToken)
}

/// Write `data` as JSON indented with four spaces, replacing any existing file.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    data.serialize(&mut serializer)
        .map_err(|e| AppError::JsonSerialize(e.to_string()))?;
    writer.flush().map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}
