//! Packs a finished export directory into a zip file.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AppError, Result};

fn zip_err(e: impl std::fmt::Display) -> AppError {
    AppError::Zip(e.to_string())
}

/// Write every file and directory below `src_dir` into `zip_path`, with
/// entry names relative to `src_dir`. Returns the number of files stored.
pub fn zip_directory(src_dir: &Path, zip_path: &Path) -> Result<usize> {
    let file = File::create(zip_path).map_err(|e| AppError::WriteFile {
        path: zip_path.display().to_string(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut files = 0;

    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(zip_err)?;
        let relative = entry.path().strip_prefix(src_dir).map_err(zip_err)?;
        let name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options).map_err(zip_err)?;
        } else {
            zip.start_file(name, options).map_err(zip_err)?;
            let mut source = File::open(entry.path()).map_err(|e| AppError::ReadFile {
                path: entry.path().display().to_string(),
                source: e,
            })?;
            io::copy(&mut source, &mut zip)?;
            files += 1;
        }
    }

    zip.finish().map_err(zip_err)?;
    Ok(files)
}

/// Zip `export_root` into `<parent>/<name>.zip` and remove the directory.
pub fn package_export(export_root: &Path, name: &str) -> Result<PathBuf> {
    let parent = export_root.parent().unwrap_or_else(|| Path::new("."));
    let zip_path = parent.join(format!("{}.zip", name));

    let files = zip_directory(export_root, &zip_path)?;
    fs::remove_dir_all(export_root)?;

    tracing::info!(zip = %zip_path.display(), files, "export packaged");
    Ok(zip_path)
}
