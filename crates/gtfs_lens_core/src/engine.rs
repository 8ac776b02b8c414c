use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::{
    default_runner, AnomalyReport, DerivationError, GtfsInput, GtfsInputError, LoadedArchive,
    ServiceCalendar, TripSelector, ValidatorRunner,
};

pub struct ValidationOutcome {
    pub archive: LoadedArchive,
    /// Load issues first, then validator findings in registration order.
    pub anomalies: AnomalyReport,
}

impl ValidationOutcome {
    pub fn missing_required(&self) -> &std::collections::BTreeSet<String> {
        &self.archive.missing_required
    }
}

/// Loads, normalizes and validates. Only a container that cannot be opened
/// fails; everything else is reported as anomalies.
pub fn validate_input(
    input: &GtfsInput,
    runner: &ValidatorRunner,
) -> Result<ValidationOutcome, GtfsInputError> {
    let archive = LoadedArchive::load(input)?.normalized();
    let mut anomalies = archive.report.clone();
    runner.run_with(&archive.feed, &mut anomalies);
    info!(
        "validation finished: {} anomaly(ies), blocking: {}",
        anomalies.len(),
        anomalies.has_blocking()
    );
    Ok(ValidationOutcome { archive, anomalies })
}

pub fn validate_bytes(bytes: &[u8]) -> Result<ValidationOutcome, GtfsInputError> {
    validate_input(&GtfsInput::from_bytes(bytes), &default_runner())
}

pub fn validate_path(path: impl AsRef<Path>) -> Result<ValidationOutcome, GtfsInputError> {
    validate_input(&GtfsInput::from_path(path)?, &default_runner())
}

/// The archive currently being explored.
///
/// A reload parses and normalizes the new archive completely before it
/// replaces the old one, and readers hold an `Arc` snapshot, so no caller ever
/// sees tables from two different archives. A failed reload keeps the
/// previous archive.
#[derive(Debug, Default)]
pub struct ArchiveSession {
    current: Option<Arc<LoadedArchive>>,
}

impl ArchiveSession {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn open(input: &GtfsInput) -> Result<Self, GtfsInputError> {
        let mut session = Self::new();
        session.reload(input)?;
        Ok(session)
    }

    pub fn reload(&mut self, input: &GtfsInput) -> Result<Arc<LoadedArchive>, GtfsInputError> {
        let archive = Arc::new(LoadedArchive::load(input)?.normalized());
        self.current = Some(Arc::clone(&archive));
        Ok(archive)
    }

    pub fn snapshot(&self) -> Option<Arc<LoadedArchive>> {
        self.current.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn validate(&self, runner: &ValidatorRunner) -> Option<AnomalyReport> {
        let archive = self.current.as_ref()?;
        let mut report = archive.report.clone();
        runner.run_with(&archive.feed, &mut report);
        Some(report)
    }
}

impl LoadedArchive {
    pub fn selector(&self) -> Result<TripSelector<'_>, DerivationError> {
        TripSelector::new(&self.feed)
    }

    pub fn service_calendar(&self) -> Result<ServiceCalendar<'_>, DerivationError> {
        ServiceCalendar::with_capabilities(&self.feed, &self.capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;

    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in files {
            writer
                .start_file(*name, FileOptions::default())
                .expect("start file");
            writer.write_all(contents.as_bytes()).expect("write file");
        }
        writer.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn corrupt_bytes_yield_no_partial_result() {
        let result = validate_bytes(b"PK-not-really");
        assert!(matches!(result, Err(GtfsInputError::CorruptArchive { .. })));
    }

    #[test]
    fn reload_replaces_whole_archive_and_keeps_snapshots() {
        let first = zip_bytes(&[("stops.txt", "stop_id\nOLD\n")]);
        let second = zip_bytes(&[
            ("stops.txt", "stop_id\nNEW\n"),
            ("routes.txt", "route_id\nR1\n"),
        ]);

        let mut session = ArchiveSession::open(&GtfsInput::from_bytes(first)).unwrap();
        let before = session.snapshot().unwrap();

        session.reload(&GtfsInput::from_bytes(second)).unwrap();
        let after = session.snapshot().unwrap();

        assert_eq!(before.feed.stop_rows()[0].stop_id, "OLD");
        assert!(before.feed.routes.is_none());
        assert_eq!(after.feed.stop_rows()[0].stop_id, "NEW");
        assert!(after.feed.routes.is_some());
    }

    #[test]
    fn failed_reload_keeps_previous_archive() {
        let good = zip_bytes(&[("stops.txt", "stop_id\nS1\n")]);
        let mut session = ArchiveSession::open(&GtfsInput::from_bytes(good)).unwrap();

        let result = session.reload(&GtfsInput::from_bytes(b"garbage".to_vec()));
        assert!(result.is_err());
        assert_eq!(session.snapshot().unwrap().feed.stop_rows()[0].stop_id, "S1");
        assert!(session.validate(&default_runner()).is_some());
    }
}
