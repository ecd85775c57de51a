use std::fs;

use camino::Utf8PathBuf;

use crate::domain::PmcId;
use crate::error::StagerError;
use crate::oa::OaClient;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
    pub path: Utf8PathBuf,
    pub downloaded: bool,
}

/// Makes sure the OA package for `id` sits at its store path.
///
/// An existing file counts as done. A failed transfer leaves whatever was
/// written in place.
pub fn ensure_archive<C: OaClient + ?Sized>(
    client: &C,
    store: &Store,
    id: &PmcId,
    url: &str,
    overwrite: bool,
) -> Result<FetchedArchive, StagerError> {
    let path = store.archive_path(id);
    if !overwrite && store.exists(&path) {
        tracing::debug!(%id, %path, "archive already present");
        return Ok(FetchedArchive {
            path,
            downloaded: false,
        });
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| StagerError::Filesystem(err.to_string()))?;
    }
    tracing::debug!(%id, url, "downloading archive");
    client.download_archive(url, path.as_std_path())?;

    if !store.exists(&path) {
        return Err(StagerError::ArchiveMissing(path.to_string()));
    }
    Ok(FetchedArchive {
        path,
        downloaded: true,
    })
}
