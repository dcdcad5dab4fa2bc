//! Splits an ordered message stream into one JSON file per UTC day and
//! follows rename events by relocating the conversation's directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::model::{ConversationKind, Message};
use crate::write_json;

/// Prefix for directory names some filesystems refuse.
const RESERVED_NAME_PREFIX: &str = "c-";

const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

fn is_reserved_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).to_ascii_lowercase();
    RESERVED_NAMES.contains(&stem.as_str())
}

/// On-disk directory name for a conversation name.
pub fn conversation_dir_name(name: &str) -> String {
    if is_reserved_name(name) {
        format!("{}{}", RESERVED_NAME_PREFIX, name)
    } else {
        name.to_string()
    }
}

/// Create (if needed) the directory for `name` under `root`.
pub fn ensure_conversation_dir(root: &Path, name: &str) -> Result<PathBuf> {
    let dir = root.join(conversation_dir_name(name));
    fs::create_dir_all(&dir).map_err(|e| AppError::WriteFile {
        path: dir.display().to_string(),
        source: e,
    })?;
    Ok(dir)
}

/// Write one day's messages. Nothing is written for an empty batch.
pub fn write_message_file(path: &Path, messages: &[Message]) -> Result<()> {
    if messages.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AppError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    write_json(path, &messages)
}

fn day_file(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.json", date.format("%Y-%m-%d")))
}

/// Move every entry of `from` into `to`, then remove `from`.
///
/// After a successful call `from` no longer exists and `to` holds everything
/// it used to contain. A missing `from` means nothing was written yet and is
/// left alone.
fn relocate_dir(from: &Path, to: &Path) -> Result<usize> {
    if from == to || !from.is_dir() {
        return Ok(0);
    }

    fs::create_dir_all(to).map_err(|e| AppError::WriteFile {
        path: to.display().to_string(),
        source: e,
    })?;

    let mut moved = 0;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        fs::rename(entry.path(), &target).map_err(|e| AppError::MoveFile {
            from: entry.path().display().to_string(),
            to: target.display().to_string(),
            source: e,
        })?;
        moved += 1;
    }

    fs::remove_dir(from)?;
    Ok(moved)
}

/// Whether `dir` is the directory `old_name` would have been written to.
fn old_name_matches(dir: &Path, old_name: &str) -> bool {
    dir.file_name()
        .is_some_and(|name| name.to_string_lossy() == conversation_dir_name(old_name))
}

pub struct DatePartitioner {
    root: PathBuf,
    kind: ConversationKind,
    current_dir: PathBuf,
    current_date: Option<NaiveDate>,
    buffer: Vec<Message>,
}

impl DatePartitioner {
    /// `conversation_dir` is where files go until a rename event says otherwise;
    /// renamed directories are created under `root`.
    pub fn new(root: &Path, conversation_dir: PathBuf, kind: ConversationKind) -> Self {
        Self {
            root: root.to_path_buf(),
            kind,
            current_dir: conversation_dir,
            current_date: None,
            buffer: Vec::new(),
        }
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn push(&mut self, message: Message) -> Result<()> {
        let date = message.timestamp()?.date()?;

        if self.current_date != Some(date) {
            self.flush()?;
            self.current_date = Some(date);
        }

        if let Some(marker) = self.kind.rename_subtype()
            && message.subtype() == Some(marker)
        {
            self.rename(&message)?;
        }

        self.buffer.push(message);
        Ok(())
    }

    /// Flush the last day and return the directory the conversation ended up in.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.flush()?;
        Ok(self.current_dir)
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(date) = self.current_date {
            write_message_file(&day_file(&self.current_dir, date), &self.buffer)?;
        }
        self.buffer.clear();
        Ok(())
    }

    fn rename(&mut self, event: &Message) -> Result<()> {
        let Some(new_name) = event.name() else {
            tracing::warn!(ts = ?event.ts(), "rename event without a new name, ignoring");
            return Ok(());
        };

        if let Some(old_name) = event.old_name()
            && !old_name_matches(&self.current_dir, old_name)
        {
            tracing::debug!(
                old_name,
                current_dir = %self.current_dir.display(),
                "rename event names a different directory, moving the current one"
            );
        }

        let new_dir = self.root.join(conversation_dir_name(new_name));
        let moved = relocate_dir(&self.current_dir, &new_dir)?;
        tracing::info!(
            old_name = ?event.old_name(),
            new_name,
            moved,
            "conversation renamed"
        );
        self.current_dir = new_dir;
        Ok(())
    }
}

/// Write `messages` (already in chronological order) as day files under
/// `conversation_dir`, following any rename events along the way.
pub fn partition(
    root: &Path,
    conversation_dir: &Path,
    messages: Vec<Message>,
    kind: ConversationKind,
) -> Result<PathBuf> {
    let mut partitioner = DatePartitioner::new(root, conversation_dir.to_path_buf(), kind);
    for message in messages {
        partitioner.push(message)?;
    }
    partitioner.finish()
}
