//! Archive bundling for handoff to remote storage.
//!
//! Files are packed into `<name>.tar.gz` in the order given, with zeroed
//! timestamps and fixed permissions so identical inputs give identical bytes.
//! A sibling `<name>.manifest.json` lists the SHA-256 of every entry and of
//! the archive itself.

use crate::error::{ExportError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub archive: String,
    pub sha256: String,
    pub entries: Vec<ManifestEntry>,
}

impl ArchiveManifest {
    pub fn entry(&self, file_name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.file_name == file_name)
    }
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex(&hasher.finalize())
}

/// Lowercase hex SHA-256 of a file, streamed.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(ExportError::io(path))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(ExportError::io(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub fn archive_file_name(name: &str) -> String {
    format!("{}.tar.gz", name)
}

pub fn manifest_file_name(name: &str) -> String {
    format!("{}.manifest.json", name)
}

/// Pack `files` (relative to `dir`) into `dir/<name>.tar.gz` and write the
/// manifest next to it.
pub fn bundle(dir: &Path, files: &[String], name: &str) -> Result<ArchiveManifest> {
    let archive_name = archive_file_name(name);
    let archive_path = dir.join(&archive_name);
    let out = File::create(&archive_path).map_err(ExportError::io(&archive_path))?;
    let encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut entries = Vec::with_capacity(files.len());
    for file_name in files {
        let path = dir.join(file_name);
        let bytes = std::fs::read(&path).map_err(ExportError::io(&path))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        builder
            .append_data(&mut header, file_name, bytes.as_slice())
            .map_err(ExportError::io(&path))?;
        entries.push(ManifestEntry {
            file_name: file_name.clone(),
            bytes: bytes.len() as u64,
            sha256: sha256_hex(&bytes),
        });
    }

    let encoder = builder
        .into_inner()
        .map_err(ExportError::io(&archive_path))?;
    let mut writer = encoder.finish().map_err(ExportError::io(&archive_path))?;
    {
        use std::io::Write as _;
        writer.flush().map_err(ExportError::io(&archive_path))?;
    }
    drop(writer);

    let manifest = ArchiveManifest {
        archive: archive_name,
        sha256: sha256_file(&archive_path)?,
        entries,
    };
    let manifest_path = dir.join(manifest_file_name(name));
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(&manifest_path, json).map_err(ExportError::io(&manifest_path))?;
    info!(
        archive = %manifest.archive,
        entries = manifest.entries.len(),
        sha256 = %manifest.sha256,
        "bundled"
    );
    Ok(manifest)
}

/// Check every entry of an unpacked archive directory against its manifest.
/// Returns the names whose content no longer matches.
pub fn verify(dir: &Path, manifest: &ArchiveManifest) -> Result<Vec<String>> {
    let mut mismatched = Vec::new();
    for entry in &manifest.entries {
        let path: PathBuf = dir.join(&entry.file_name);
        if sha256_file(&path)? != entry.sha256 {
            mismatched.push(entry.file_name.clone());
        }
    }
    Ok(mismatched)
}

pub fn read_manifest(path: &Path) -> Result<ArchiveManifest> {
    let text = std::fs::read_to_string(path).map_err(ExportError::io(path))?;
    Ok(serde_json::from_str(&text)?)
}
