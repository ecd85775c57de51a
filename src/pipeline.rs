use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Identifier, PmcId, RunStatus};
use crate::error::StagerError;
use crate::extract::ensure_extracted;
use crate::fetcher::ensure_archive;
use crate::ledger::{Ledger, LedgerRow, LedgerWriter};
use crate::oa::OaClient;
use crate::resolver::{MetadataRecord, resolve_metadata};
use crate::store::Store;

/// Which identifiers ignore their cached artifacts on this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Overwrite {
    #[default]
    None,
    All,
    Only(BTreeSet<PmcId>),
}

impl Overwrite {
    pub fn applies(&self, id: &PmcId) -> bool {
        match self {
            Overwrite::None => false,
            Overwrite::All => true,
            Overwrite::Only(ids) => ids.contains(id),
        }
    }

    /// Overwrite scoped to identifiers whose previous row is a failure.
    pub fn failed_in(rows: &[LedgerRow]) -> Self {
        let ids = rows
            .iter()
            .filter(|row| row.status.is_failure())
            .filter_map(|row| row.pmcid.as_deref())
            .filter_map(|id| id.parse::<PmcId>().ok())
            .collect();
        Overwrite::Only(ids)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub overwrite: Overwrite,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Rate limiting between identifiers.
pub trait Pacer {
    fn pause(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Terminal result of one identifier, carrying whatever artifacts the
/// stages produced before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    MissingIdentifier,
    MetadataQueryFailed {
        status_code: Option<u16>,
        error: String,
    },
    NoArchiveAvailable {
        metadata: MetadataRecord,
    },
    ArchiveDownloadFailed {
        metadata: MetadataRecord,
        archive_url: String,
        archive_path: Utf8PathBuf,
        error: String,
    },
    ArchiveExtractFailed {
        metadata: MetadataRecord,
        archive_url: String,
        archive_path: Utf8PathBuf,
        extract_dir: Utf8PathBuf,
        error: String,
    },
    Ok {
        metadata: MetadataRecord,
        archive_url: String,
        archive_path: Utf8PathBuf,
        extract_dir: Utf8PathBuf,
    },
}

impl Outcome {
    pub fn status(&self) -> RunStatus {
        match self {
            Outcome::MissingIdentifier => RunStatus::MissingIdentifier,
            Outcome::MetadataQueryFailed { .. } => RunStatus::MetadataQueryFailed,
            Outcome::NoArchiveAvailable { .. } => RunStatus::NoArchiveAvailable,
            Outcome::ArchiveDownloadFailed { .. } => RunStatus::ArchiveDownloadFailed,
            Outcome::ArchiveExtractFailed { .. } => RunStatus::ArchiveExtractFailed,
            Outcome::Ok { .. } => RunStatus::Ok,
        }
    }

    /// Every outcome past normalization may have touched the network.
    pub fn needs_pacing(&self) -> bool {
        !matches!(self, Outcome::MissingIdentifier)
    }

    pub fn to_row(&self, identifier: &Identifier) -> LedgerRow {
        let mut row = LedgerRow {
            raw_id: identifier.raw.clone(),
            pmcid: identifier.canonical.as_ref().map(|id| id.to_string()),
            metadata_path: None,
            archive_url: None,
            archive_path: None,
            extract_dir: None,
            status: self.status(),
            status_code: None,
            detail: None,
        };
        match self {
            Outcome::MissingIdentifier => {
                row.detail = Some(StagerError::MissingIdentifier.to_string());
            }
            Outcome::MetadataQueryFailed { status_code, error } => {
                row.status_code = *status_code;
                row.detail = Some(error.clone());
            }
            Outcome::NoArchiveAvailable { metadata } => {
                fill_metadata(&mut row, metadata);
                row.detail = metadata.service_error.clone();
            }
            Outcome::ArchiveDownloadFailed {
                metadata,
                archive_url,
                archive_path,
                error,
            } => {
                fill_metadata(&mut row, metadata);
                row.archive_url = Some(archive_url.clone());
                row.archive_path = Some(archive_path.to_string());
                row.detail = Some(error.clone());
            }
            Outcome::ArchiveExtractFailed {
                metadata,
                archive_url,
                archive_path,
                extract_dir,
                error,
            } => {
                fill_metadata(&mut row, metadata);
                row.archive_url = Some(archive_url.clone());
                row.archive_path = Some(archive_path.to_string());
                row.extract_dir = Some(extract_dir.to_string());
                row.detail = Some(error.clone());
            }
            Outcome::Ok {
                metadata,
                archive_url,
                archive_path,
                extract_dir,
            } => {
                fill_metadata(&mut row, metadata);
                row.archive_url = Some(archive_url.clone());
                row.archive_path = Some(archive_path.to_string());
                row.extract_dir = Some(extract_dir.to_string());
            }
        }
        row
    }
}

fn fill_metadata(row: &mut LedgerRow, metadata: &MetadataRecord) {
    row.metadata_path = Some(metadata.path.to_string());
    row.status_code = metadata.status_code;
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output_dir: String,
    pub ledger_path: String,
    pub total: usize,
    pub counts: BTreeMap<RunStatus, usize>,
    pub rows: Vec<LedgerRow>,
}

pub struct App<C: OaClient, P: Pacer = ThreadPacer> {
    store: Store,
    client: C,
    pacer: P,
}

impl<C: OaClient> App<C, ThreadPacer> {
    pub fn new(store: Store, client: C) -> Self {
        Self::with_pacer(store, client, ThreadPacer)
    }
}

impl<C: OaClient, P: Pacer> App<C, P> {
    pub fn with_pacer(store: Store, client: C, pacer: P) -> Self {
        Self {
            store,
            client,
            pacer,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Runs one identifier through every stage, stopping at the first one
    /// that does not succeed.
    pub fn process(&self, identifier: &Identifier, overwrite: &Overwrite) -> Outcome {
        let Some(id) = identifier.canonical.as_ref() else {
            return Outcome::MissingIdentifier;
        };
        let overwrite = overwrite.applies(id);

        let metadata = match resolve_metadata(&self.client, &self.store, id, overwrite) {
            Ok(metadata) => metadata,
            Err(err) => {
                return Outcome::MetadataQueryFailed {
                    status_code: err.status_code(),
                    error: err.to_string(),
                };
            }
        };

        let Some(archive_url) = metadata.archive_url.clone() else {
            return Outcome::NoArchiveAvailable { metadata };
        };

        let archive = match ensure_archive(&self.client, &self.store, id, &archive_url, overwrite)
        {
            Ok(archive) => archive,
            Err(err) => {
                return Outcome::ArchiveDownloadFailed {
                    metadata,
                    archive_url,
                    archive_path: self.store.archive_path(id),
                    error: err.to_string(),
                };
            }
        };

        match ensure_extracted(&self.store, id, &archive.path, overwrite) {
            Ok(extracted) => Outcome::Ok {
                metadata,
                archive_url,
                archive_path: archive.path,
                extract_dir: extracted.path,
            },
            Err(err) => Outcome::ArchiveExtractFailed {
                metadata,
                archive_url,
                archive_path: archive.path,
                extract_dir: self.store.extract_dir(id),
                error: err.to_string(),
            },
        }
    }

    /// Processes every raw identifier in order and writes the ledger.
    ///
    /// Only setup problems (output root, ledger file) fail the run; every
    /// per-identifier failure becomes a ledger row.
    pub fn run(
        &self,
        raw_ids: &[String],
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, StagerError> {
        let started_at = Utc::now();
        self.store.ensure_root()?;
        let mut ledger = LedgerWriter::create(&self.store)?;

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} identifiers", raw_ids.len()),
            elapsed: None,
        });

        let mut rows = Vec::with_capacity(raw_ids.len());
        for (index, raw) in raw_ids.iter().enumerate() {
            let identifier = Identifier::normalize(raw);
            let start = Instant::now();
            let outcome = self.process(&identifier, &options.overwrite);
            let row = outcome.to_row(&identifier);
            ledger.append(&row)?;

            let label = row.pmcid.as_deref().unwrap_or("<missing>");
            match &row.detail {
                Some(detail) if row.status != RunStatus::Ok => {
                    tracing::warn!(raw = %raw, id = label, status = %row.status, detail = %detail, "identifier not staged");
                }
                _ => tracing::info!(id = label, status = %row.status, "identifier processed"),
            }
            sink.event(ProgressEvent {
                message: format!(
                    "[{}/{}] {label} status={}",
                    index + 1,
                    raw_ids.len(),
                    row.status
                ),
                elapsed: Some(start.elapsed()),
            });
            rows.push(row);

            let is_last = index + 1 == raw_ids.len();
            if outcome.needs_pacing() && !is_last {
                self.pacer.pause(options.delay);
            }
        }

        let ledger_path = ledger.finish()?;
        sink.event(ProgressEvent {
            message: format!("phase=Store; ledger written to {ledger_path}"),
            elapsed: None,
        });

        Ok(RunSummary {
            started_at,
            finished_at: Utc::now(),
            output_dir: self.store.root().to_string(),
            ledger_path: ledger_path.to_string(),
            total: rows.len(),
            counts: Ledger::summarize(&rows),
            rows,
        })
    }
}
