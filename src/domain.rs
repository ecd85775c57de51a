use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StagerError;

/// Literal prepended to purely numeric identifiers.
pub const PMC_PREFIX: &str = "PMC";

static PMCID_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^pmcid:").expect("static regex"));

static CANONICAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PMC[0-9]+$").expect("static regex"));

/// Canonicalizes a raw identifier into the `PMC<digits>` cache key form.
///
/// Returns `None` (the missing sentinel) for blank input, for input that is
/// nothing but a `PMCID:` label, and for anything that does not end up as
/// `PMC` followed by digits. The canonical form names files under the output
/// root, so nothing else may pass.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let rest = PMCID_LABEL.replace(trimmed, "");
    let rest = rest.trim();
    if rest.is_empty() {
        return None;
    }
    let canonical = if rest.bytes().all(|byte| byte.is_ascii_digit()) {
        format!("{PMC_PREFIX}{rest}")
    } else {
        rest.to_ascii_uppercase()
    };
    CANONICAL_ID.is_match(&canonical).then_some(canonical)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PmcId(String);

impl PmcId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PmcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PmcId {
    type Err = StagerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        normalize_identifier(value)
            .map(Self)
            .ok_or(StagerError::MissingIdentifier)
    }
}

/// One row of input: the raw string as read and its canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub raw: String,
    pub canonical: Option<PmcId>,
}

impl Identifier {
    pub fn normalize(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            canonical: raw.parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    MissingIdentifier,
    MetadataQueryFailed,
    NoArchiveAvailable,
    ArchiveDownloadFailed,
    ArchiveExtractFailed,
    Ok,
}

impl RunStatus {
    pub const ALL: [RunStatus; 6] = [
        RunStatus::MissingIdentifier,
        RunStatus::MetadataQueryFailed,
        RunStatus::NoArchiveAvailable,
        RunStatus::ArchiveDownloadFailed,
        RunStatus::ArchiveExtractFailed,
        RunStatus::Ok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::MissingIdentifier => "missing_identifier",
            RunStatus::MetadataQueryFailed => "metadata_query_failed",
            RunStatus::NoArchiveAvailable => "no_archive_available",
            RunStatus::ArchiveDownloadFailed => "archive_download_failed",
            RunStatus::ArchiveExtractFailed => "archive_extract_failed",
            RunStatus::Ok => "ok",
        }
    }

    /// Statuses an operator retries with `--retry-failed`.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::MetadataQueryFailed
                | RunStatus::ArchiveDownloadFailed
                | RunStatus::ArchiveExtractFailed
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn numeric_gets_prefix() {
        assert_eq!(normalize_identifier("12345").as_deref(), Some("PMC12345"));
    }

    #[test]
    fn label_is_stripped_case_insensitively() {
        assert_eq!(
            normalize_identifier("  pmcid: pmc777 ").as_deref(),
            Some("PMC777")
        );
        assert_eq!(normalize_identifier("PmCiD:42").as_deref(), Some("PMC42"));
    }

    #[test]
    fn bare_label_is_missing() {
        assert_eq!(normalize_identifier("PMCID:"), None);
        assert_eq!(normalize_identifier(" \t "), None);
    }

    #[test]
    fn path_like_input_is_missing() {
        for raw in ["..", "/", "a/b", "PMC1/../x", "PMC-odd-7", "nih ms 5", "PMC"] {
            assert_eq!(normalize_identifier(raw), None, "{raw}");
        }
    }

    #[test]
    fn blank_id_parse_fails() {
        let err = "   ".parse::<PmcId>().unwrap_err();
        assert_matches!(err, StagerError::MissingIdentifier);
    }

    #[test]
    fn status_strings_match_serde() {
        for status in RunStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
