use std::fs;

use camino::Utf8PathBuf;

use crate::domain::PmcId;
use crate::error::StagerError;
use crate::oa::{OaClient, normalize_archive_url, parse_oa_response};
use crate::store::Store;

/// Status reported for a metadata response. Only 200 answers are ever
/// persisted, so a cache hit reports the same code the original fetch saw.
pub const CACHED_STATUS: u16 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub path: Utf8PathBuf,
    pub archive_url: Option<String>,
    pub status_code: Option<u16>,
    pub cached: bool,
    pub service_error: Option<String>,
}

/// Reads the cached OA response for `id`, or fetches and persists it.
///
/// A cache file is trusted on existence alone; its content is not
/// re-validated unless `overwrite` forces a fresh query.
pub fn resolve_metadata<C: OaClient + ?Sized>(
    client: &C,
    store: &Store,
    id: &PmcId,
    overwrite: bool,
) -> Result<MetadataRecord, StagerError> {
    let path = store.metadata_path(id);
    let cached = !overwrite && store.exists(&path);

    let raw = if cached {
        tracing::debug!(%id, %path, "metadata cache hit");
        fs::read(path.as_std_path())
            .map_err(|err| StagerError::Filesystem(format!("read {path}: {err}")))?
    } else {
        tracing::debug!(%id, "querying OA service");
        let raw = client.fetch_metadata(id)?;
        Store::write_bytes_atomic(&path, &raw)?;
        raw
    };

    let parsed = parse_oa_response(&String::from_utf8_lossy(&raw));
    Ok(MetadataRecord {
        path,
        archive_url: parsed.archive_href.as_deref().map(normalize_archive_url),
        status_code: Some(CACHED_STATUS),
        cached,
        service_error: parsed.error,
    })
}
