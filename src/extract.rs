use std::fs;
use std::io::{self, Read};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::domain::PmcId;
use crate::error::StagerError;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Sniffs the container from its leading bytes rather than the file name.
    pub fn detect(path: &Path) -> Result<Self, StagerError> {
        let mut file = fs::File::open(path)
            .map_err(|err| StagerError::Extract(format!("open {}: {err}", path.display())))?;
        let mut magic = [0u8; 4];
        let read = read_prefix(&mut file, &mut magic)
            .map_err(|err| StagerError::Extract(err.to_string()))?;
        match &magic[..read] {
            [0x1f, 0x8b, ..] => Ok(ArchiveFormat::TarGz),
            [b'P', b'K', 0x03, 0x04] | [b'P', b'K', 0x05, 0x06] => Ok(ArchiveFormat::Zip),
            _ => Err(StagerError::Extract(format!(
                "unrecognized archive format: {}",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDir {
    pub path: Utf8PathBuf,
    pub extracted: bool,
}

/// Makes sure the extraction directory for `id` exists and holds the
/// archive's contents. An existing directory counts as done. A failed
/// extraction leaves the partial directory behind.
pub fn ensure_extracted(
    store: &Store,
    id: &PmcId,
    archive: &Utf8Path,
    overwrite: bool,
) -> Result<ExtractedDir, StagerError> {
    let path = store.extract_dir(id);
    if store.exists(&path) {
        if !overwrite {
            tracing::debug!(%id, %path, "extraction directory already present");
            return Ok(ExtractedDir {
                path,
                extracted: false,
            });
        }
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| StagerError::Filesystem(err.to_string()))?;
    }

    fs::create_dir_all(path.as_std_path())
        .map_err(|err| StagerError::Filesystem(err.to_string()))?;
    tracing::debug!(%id, %archive, "extracting archive");
    extract_archive(archive.as_std_path(), path.as_std_path())?;
    Ok(ExtractedDir {
        path,
        extracted: true,
    })
}

pub fn extract_archive(archive_path: &Path, target_dir: &Path) -> Result<(), StagerError> {
    match ArchiveFormat::detect(archive_path)? {
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, target_dir),
        ArchiveFormat::Zip => extract_zip(archive_path, target_dir),
    }
}

pub fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<(), StagerError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        StagerError::Extract(format!("open archive {}: {err}", archive_path.display()))
    })?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    for entry in archive.entries().map_err(extract_error)? {
        let mut entry = entry.map_err(extract_error)?;
        if !entry.unpack_in(target_dir).map_err(extract_error)? {
            let name = entry.path().map_err(extract_error)?.display().to_string();
            return Err(StagerError::Extract(format!(
                "tar entry escapes extraction directory: {name}"
            )));
        }
    }
    Ok(())
}

/// Unpacks a zip package. Entries whose names would resolve outside
/// `target_dir` abort the extraction.
pub fn extract_zip(archive_path: &Path, target_dir: &Path) -> Result<(), StagerError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        StagerError::Extract(format!("open archive {}: {err}", archive_path.display()))
    })?;
    let mut archive = ZipArchive::new(file).map_err(extract_error)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(extract_error)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            StagerError::Extract(format!(
                "zip entry escapes extraction directory: {}",
                entry.name()
            ))
        })?;
        let destination = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination).map_err(extract_error)?;
            continue;
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(extract_error)?;
        }
        let mut out = fs::File::create(&destination).map_err(extract_error)?;
        io::copy(&mut entry, &mut out).map_err(extract_error)?;
    }
    Ok(())
}

fn extract_error(err: impl std::fmt::Display) -> StagerError {
    StagerError::Extract(err.to_string())
}

fn read_prefix(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
