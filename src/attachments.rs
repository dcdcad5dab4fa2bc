//! Optional pass over a finished export: download every files.slack.com
//! attachment next to the export and point the messages at the local copy.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use url::Url;
use walkdir::WalkDir;

use crate::error::{AppError, Result};
use crate::model::Message;
use crate::slack::SlackWebClient;
use crate::write_json;

const SLACK_FILES_URL_PREFIX: &str = "https://files.slack.com/";
/// Where slack-export-viewer serves a linked `files.slack.com` folder from.
const VIEWER_FILES_PREFIX: &str = "/static/files.slack.com";

/// An attachment to fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FileDownload {
    pub url: String,
    pub local_path: PathBuf,
}

/// Result of downloading attachments
#[derive(Debug, Default, PartialEq)]
pub struct DownloadResult {
    pub downloaded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Directory the attachments of `export_root` are stored in.
pub fn files_dir(export_root: &Path) -> PathBuf {
    export_root.join("..").join("files.slack.com")
}

/// Rewrite every files.slack.com link in the messages' `files` entries to
/// its viewer path and return what has to be downloaded for them.
/// Deleted (`tombstone`) files are left untouched.
pub fn localize_file_links(messages: &mut [Message], files_dir: &Path) -> Vec<FileDownload> {
    let mut downloads = Vec::new();

    for message in messages.iter_mut() {
        let Some(Value::Array(files)) = message.as_value_mut().get_mut("files") else {
            continue;
        };

        for file in files.iter_mut() {
            if file.get("mode").and_then(|m| m.as_str()) == Some("tombstone") {
                continue;
            }
            let Value::Object(fields) = file else {
                continue;
            };

            for value in fields.values_mut() {
                let Some(link) = value.as_str() else {
                    continue;
                };
                if !link.starts_with(SLACK_FILES_URL_PREFIX) {
                    continue;
                }
                let Ok(url) = Url::parse(link) else {
                    continue;
                };

                let path = url.path().to_string();
                downloads.push(FileDownload {
                    url: link.to_string(),
                    local_path: files_dir.join(path.trim_start_matches('/')),
                });
                *value = Value::String(format!("{}{}", VIEWER_FILES_PREFIX, path));
            }
        }
    }

    downloads
}

/// A file is fetched unless a non-empty copy is already on disk; thumbnails
/// carry no size to compare against.
pub fn needs_download(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true)
}

fn message_files(export_root: &Path) -> Vec<PathBuf> {
    WalkDir::new(export_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}

async fn fetch(client: &SlackWebClient, download: &FileDownload, result: &mut DownloadResult) {
    if !needs_download(&download.local_path) {
        println!(
            "Skipping already downloaded file: {}",
            download.local_path.display()
        );
        result.skipped += 1;
        return;
    }

    println!(
        "Downloading {}, saving to {}",
        download.url,
        download.local_path.display()
    );

    if let Some(parent) = download.local_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        result.failed += 1;
        return;
    }

    match client.download(&download.url).await {
        Ok(bytes) => {
            if let Err(e) = fs::write(&download.local_path, &bytes) {
                eprintln!("Failed to write {}: {}", download.local_path.display(), e);
                result.failed += 1;
            } else {
                result.downloaded += 1;
            }
        }
        Err(e) => {
            tracing::warn!(url = %download.url, error = %e, "attachment download failed");
            eprintln!("Failed to download {}: {}", download.url, e);
            result.failed += 1;
        }
    }
}

/// Download the attachments of every message file under `export_root`.
pub async fn download_files(client: &SlackWebClient, export_root: &Path) -> Result<DownloadResult> {
    println!("Starting to download files");

    let target = files_dir(export_root);
    let mut result = DownloadResult::default();

    for path in message_files(export_root) {
        let content = fs::read_to_string(&path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        // manifests that are not message arrays have nothing to rewrite
        let Ok(mut messages) = serde_json::from_str::<Vec<Message>>(&content) else {
            continue;
        };

        let downloads = localize_file_links(&mut messages, &target);
        if downloads.is_empty() {
            continue;
        }
        for download in &downloads {
            fetch(client, download, &mut result).await;
        }

        write_json(&path, &messages)?;
        println!("Replaced all files in {}", path.display());
    }

    Ok(result)
}
