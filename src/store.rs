use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::domain::PmcId;
use crate::error::StagerError;

pub const LEDGER_FILE: &str = "ledger.csv";

/// Output tree for one staging run. Every artifact path is a pure function of
/// the canonical identifier, so a later run finds prior work by looking.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn metadata_path(&self, id: &PmcId) -> Utf8PathBuf {
        self.root.join("metadata").join(format!("{id}.xml"))
    }

    pub fn archive_path(&self, id: &PmcId) -> Utf8PathBuf {
        self.root.join("archives").join(format!("{id}.tar.gz"))
    }

    pub fn extract_dir(&self, id: &PmcId) -> Utf8PathBuf {
        self.root.join("extracted").join(id.as_str())
    }

    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn partial_ledger_path(&self) -> Utf8PathBuf {
        self.root.join(format!("{LEDGER_FILE}.partial"))
    }

    pub fn ensure_root(&self) -> Result<(), StagerError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| StagerError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    /// Writes the whole file through a sibling temp file so readers never see
    /// a half-written cache entry.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), StagerError> {
        let parent = path
            .parent()
            .ok_or_else(|| StagerError::Filesystem(format!("no parent for {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| StagerError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".guideline-stager")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| StagerError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| StagerError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| StagerError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("out"));
        let id: PmcId = "12345".parse().unwrap();

        assert!(store.metadata_path(&id).ends_with("metadata/PMC12345.xml"));
        assert!(store.archive_path(&id).ends_with("archives/PMC12345.tar.gz"));
        assert!(store.extract_dir(&id).ends_with("extracted/PMC12345"));
        assert_eq!(store.ledger_path(), Utf8PathBuf::from("out/ledger.csv"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("nested").join("file.xml");

        Store::write_bytes_atomic(&path, b"first").unwrap();
        Store::write_bytes_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(path.as_std_path()).unwrap(), b"second");
    }
}
