use assert_matches::assert_matches;

use guideline_stager::domain::{Identifier, PmcId, RunStatus, normalize_identifier};
use guideline_stager::error::StagerError;

#[test]
fn spellings_converge() {
    let forms = ["PMCID:12345", "PMC12345", "12345", " pmcid: pmc12345\t", "pmc12345"];
    for form in forms {
        assert_eq!(normalize_identifier(form).as_deref(), Some("PMC12345"), "{form}");
    }
}

#[test]
fn normalization_is_idempotent() {
    for raw in ["PMCID:1", "42", "pmc9", " PMC0007 "] {
        let once = normalize_identifier(raw).unwrap();
        let twice = normalize_identifier(&once).unwrap();
        assert_eq!(once, twice);
    }
}

#[test]
fn blank_input_is_missing() {
    for raw in ["", " ", "\t\n", "PMCID:", " pmcid:  "] {
        assert_eq!(normalize_identifier(raw), None);
        let identifier = Identifier::normalize(raw);
        assert_eq!(identifier.canonical, None);
        assert_eq!(identifier.raw, raw);
    }
}

#[test]
fn malformed_input_is_missing() {
    for raw in ["..", "/", "a/b", "/etc", "PMC-odd-7", "nih ms 5", "PMC12a", "12 34"] {
        assert_eq!(normalize_identifier(raw), None, "{raw:?}");
        assert_eq!(Identifier::normalize(raw).canonical, None, "{raw:?}");
        let err = raw.parse::<PmcId>().unwrap_err();
        assert_matches!(err, StagerError::MissingIdentifier);
    }
}

#[test]
fn parse_pmc_id() {
    let id: PmcId = "pmcid:555".parse().unwrap();
    assert_eq!(id.as_str(), "PMC555");
    let err = "".parse::<PmcId>().unwrap_err();
    assert_matches!(err, StagerError::MissingIdentifier);
}

#[test]
fn only_transport_and_stage_errors_are_retryable() {
    let retryable = RunStatus::ALL
        .into_iter()
        .filter(RunStatus::is_failure)
        .collect::<Vec<_>>();
    assert_eq!(
        retryable,
        vec![
            RunStatus::MetadataQueryFailed,
            RunStatus::ArchiveDownloadFailed,
            RunStatus::ArchiveExtractFailed,
        ]
    );
}
