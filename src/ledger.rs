use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::RunStatus;
use crate::error::StagerError;
use crate::store::Store;

/// One ledger line per input identifier, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub raw_id: String,
    pub pmcid: Option<String>,
    pub metadata_path: Option<String>,
    pub archive_url: Option<String>,
    pub archive_path: Option<String>,
    pub extract_dir: Option<String>,
    pub status: RunStatus,
    pub status_code: Option<u16>,
    pub detail: Option<String>,
}

/// Appends rows to `ledger.csv.partial`, flushing after each one, and moves
/// the file over `ledger.csv` once the batch is done. An interrupted run
/// leaves the partial file and the previous ledger untouched.
pub struct LedgerWriter {
    writer: csv::Writer<fs::File>,
    partial_path: Utf8PathBuf,
    final_path: Utf8PathBuf,
    rows: usize,
}

impl LedgerWriter {
    pub fn create(store: &Store) -> Result<Self, StagerError> {
        let partial_path = store.partial_ledger_path();
        let writer = csv::Writer::from_path(partial_path.as_std_path())
            .map_err(|err| StagerError::LedgerWrite(format!("{partial_path}: {err}")))?;
        Ok(Self {
            writer,
            partial_path,
            final_path: store.ledger_path(),
            rows: 0,
        })
    }

    pub fn append(&mut self, row: &LedgerRow) -> Result<(), StagerError> {
        self.writer
            .serialize(row)
            .map_err(|err| StagerError::LedgerWrite(err.to_string()))?;
        self.writer
            .flush()
            .map_err(|err| StagerError::LedgerWrite(err.to_string()))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<Utf8PathBuf, StagerError> {
        self.writer
            .flush()
            .map_err(|err| StagerError::LedgerWrite(err.to_string()))?;
        drop(self.writer);
        fs::rename(self.partial_path.as_std_path(), self.final_path.as_std_path())
            .map_err(|err| StagerError::LedgerWrite(format!("{}: {err}", self.final_path)))?;
        Ok(self.final_path)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerReport {
    pub ledger_path: String,
    pub total: usize,
    pub counts: BTreeMap<RunStatus, usize>,
    pub failed: Vec<LedgerRow>,
}

pub struct Ledger;

impl Ledger {
    /// Counts plus the rows an operator would retry.
    pub fn report(path: &Utf8Path) -> Result<LedgerReport, StagerError> {
        let rows = Self::load(path)?;
        Ok(LedgerReport {
            ledger_path: path.to_string(),
            total: rows.len(),
            counts: Self::summarize(&rows),
            failed: rows
                .into_iter()
                .filter(|row| row.status.is_failure())
                .collect(),
        })
    }

    pub fn load(path: &Utf8Path) -> Result<Vec<LedgerRow>, StagerError> {
        if !path.as_std_path().exists() {
            return Err(StagerError::LedgerNotFound(path.as_std_path().to_path_buf()));
        }
        let mut reader = csv::Reader::from_path(path.as_std_path())
            .map_err(|err| StagerError::LedgerRead(format!("{path}: {err}")))?;
        reader
            .deserialize()
            .map(|row| row.map_err(|err| StagerError::LedgerRead(err.to_string())))
            .collect()
    }

    /// Row count per status. Every status appears, with zero when absent.
    pub fn summarize(rows: &[LedgerRow]) -> BTreeMap<RunStatus, usize> {
        let mut counts = RunStatus::ALL
            .into_iter()
            .map(|status| (status, 0))
            .collect::<BTreeMap<_, _>>();
        for row in rows {
            *counts.entry(row.status).or_default() += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(raw: &str, status: RunStatus) -> LedgerRow {
        LedgerRow {
            raw_id: raw.to_string(),
            pmcid: crate::domain::normalize_identifier(raw),
            metadata_path: None,
            archive_url: None,
            archive_path: None,
            extract_dir: None,
            status,
            status_code: None,
            detail: None,
        }
    }

    #[test]
    fn writer_renames_partial_on_finish() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = Store::new(root);

        let mut writer = LedgerWriter::create(&store).unwrap();
        writer.append(&row("", RunStatus::MissingIdentifier)).unwrap();
        let mut ok = row("PMCID: 12", RunStatus::Ok);
        ok.archive_url = Some("https://ftp.ncbi.nlm.nih.gov/pub/pmc/a, b.tar.gz".to_string());
        ok.status_code = Some(200);
        writer.append(&ok).unwrap();
        assert!(store.partial_ledger_path().as_std_path().exists());
        assert_eq!(writer.rows(), 2);

        let path = writer.finish().unwrap();
        assert_eq!(path, store.ledger_path());
        assert!(!store.partial_ledger_path().as_std_path().exists());

        let rows = Ledger::load(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pmcid, None);
        assert_eq!(rows[1], ok);
    }

    #[test]
    fn summary_counts_every_status() {
        let rows = vec![
            row("1", RunStatus::Ok),
            row("2", RunStatus::Ok),
            row("3", RunStatus::NoArchiveAvailable),
        ];
        let counts = Ledger::summarize(&rows);
        assert_eq!(counts.len(), RunStatus::ALL.len());
        assert_eq!(counts[&RunStatus::Ok], 2);
        assert_eq!(counts[&RunStatus::NoArchiveAvailable], 1);
        assert_eq!(counts[&RunStatus::ArchiveExtractFailed], 0);
    }

    #[test]
    fn missing_ledger_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("ledger.csv")).unwrap();
        let err = Ledger::load(&path).unwrap_err();
        assert!(matches!(err, StagerError::LedgerNotFound(_)));
    }
}
