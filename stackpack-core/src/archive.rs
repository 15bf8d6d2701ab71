//! Turns a local artifact path into the bytes that get uploaded.
//!
//! Directories are zipped with a stable layout: entries sorted by relative
//! path, `/` separators, a fixed modification time and the file mode as the
//! only per-entry attribute. The same directory contents therefore always
//! produce the same archive, and the same fingerprint.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{PackageError, PackageResult};

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// SHA-256 of `payload`, lower-case hex.
pub fn fingerprint(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

/// Zips every file below `dir`. Symlinks are followed.
pub fn zip_directory(dir: &Path) -> PackageResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut entries = 0usize;

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            PackageError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or_else(|_| entry.path());
        let name = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        add_file(&mut writer, &name, entry.path())?;
        entries += 1;
    }

    let bytes = finish(writer, dir)?;
    debug!(dir = %dir.display(), entries, size = bytes.len(), "Zipped directory");
    Ok(bytes)
}

/// Zips a single file, stored under its own file name.
pub fn zip_file(file: &Path) -> PackageResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    add_file(&mut writer, &name, file)?;
    finish(writer, file)
}

/// Whether the file at `path` starts with the zip local-file-header magic.
/// Jar files and other zip-based formats count.
pub fn is_zip_file(path: &Path) -> PackageResult<bool> {
    let mut header = Vec::with_capacity(ZIP_MAGIC.len());
    fs::File::open(path)
        .and_then(|f| f.take(ZIP_MAGIC.len() as u64).read_to_end(&mut header))
        .map_err(|e| PackageError::io(path, e))?;
    Ok(header == ZIP_MAGIC)
}

fn add_file(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    path: &Path,
) -> PackageResult<()> {
    let content = fs::read(path).map_err(|e| PackageError::io(path, e))?;
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(file_mode(path));
    writer
        .start_file(name, options)
        .map_err(|e| PackageError::io(path, e.into()))?;
    writer
        .write_all(&content)
        .map_err(|e| PackageError::io(path, e))?;
    Ok(())
}

fn finish(writer: ZipWriter<Cursor<Vec<u8>>>, path: &Path) -> PackageResult<Vec<u8>> {
    writer
        .finish()
        .map(Cursor::into_inner)
        .map_err(|e| PackageError::io(path, e.into()))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}
