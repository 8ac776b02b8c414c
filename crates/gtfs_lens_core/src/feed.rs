use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use gtfs_lens_model::{Agency, Calendar, CalendarDate, Route, Shape, Stop, StopTime, Trip};

use crate::csv_reader::read_csv_table;
use crate::input::{FileContent, GtfsInput, GtfsInputError, GtfsInputReader};
use crate::{
    normalize, Anomaly, AnomalyReport, CsvParseError, CsvTable, DerivationError, TableStatus,
};

pub const AGENCY_FILE: &str = "agency.txt";
pub const STOPS_FILE: &str = "stops.txt";
pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const SHAPES_FILE: &str = "shapes.txt";
pub const CALENDAR_FILE: &str = "calendar.txt";
pub const CALENDAR_DATES_FILE: &str = "calendar_dates.txt";

pub const REQUIRED_FILES: &[&str] = &[
    AGENCY_FILE,
    STOPS_FILE,
    ROUTES_FILE,
    TRIPS_FILE,
    STOP_TIMES_FILE,
];

/// `stop_times.txt` -> `stop_times`.
pub fn relation_name(file: &str) -> &str {
    file.strip_suffix(".txt").unwrap_or(file)
}

/// The loaded relations of one archive. A table is `None` when its file was
/// absent or could not be parsed at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GtfsFeed {
    pub agency: Option<CsvTable<Agency>>,
    pub stops: Option<CsvTable<Stop>>,
    pub routes: Option<CsvTable<Route>>,
    pub trips: Option<CsvTable<Trip>>,
    pub stop_times: Option<CsvTable<StopTime>>,
    pub shapes: Option<CsvTable<Shape>>,
    pub calendar: Option<CsvTable<Calendar>>,
    pub calendar_dates: Option<CsvTable<CalendarDate>>,
}

impl GtfsFeed {
    pub fn has_table(&self, file: &str) -> bool {
        match file {
            AGENCY_FILE => self.agency.is_some(),
            STOPS_FILE => self.stops.is_some(),
            ROUTES_FILE => self.routes.is_some(),
            TRIPS_FILE => self.trips.is_some(),
            STOP_TIMES_FILE => self.stop_times.is_some(),
            SHAPES_FILE => self.shapes.is_some(),
            CALENDAR_FILE => self.calendar.is_some(),
            CALENDAR_DATES_FILE => self.calendar_dates.is_some(),
            _ => false,
        }
    }

    /// Required relations that are not usable, by relation name.
    pub fn unavailable_required(&self) -> BTreeSet<String> {
        REQUIRED_FILES
            .iter()
            .filter(|file| !self.has_table(file))
            .map(|file| relation_name(file).to_string())
            .collect()
    }

    pub fn ensure_required_tables(&self) -> Result<(), DerivationError> {
        let missing = self.unavailable_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DerivationError::MissingRequiredTable(
                missing.into_iter().collect(),
            ))
        }
    }

    pub fn capabilities(&self) -> FeedCapabilities {
        FeedCapabilities::detect(self)
    }

    pub fn agency_rows(&self) -> &[Agency] {
        rows(&self.agency)
    }

    pub fn stop_rows(&self) -> &[Stop] {
        rows(&self.stops)
    }

    pub fn route_rows(&self) -> &[Route] {
        rows(&self.routes)
    }

    pub fn trip_rows(&self) -> &[Trip] {
        rows(&self.trips)
    }

    pub fn stop_time_rows(&self) -> &[StopTime] {
        rows(&self.stop_times)
    }

    pub fn shape_rows(&self) -> &[Shape] {
        rows(&self.shapes)
    }
}

fn has_column<T>(table: &Option<CsvTable<T>>, name: &str) -> bool {
    table.as_ref().is_some_and(|table| table.has_column(name))
}

fn rows<T>(table: &Option<CsvTable<T>>) -> &[T] {
    table.as_ref().map(|table| table.rows.as_slice()).unwrap_or(&[])
}

/// Optional tables and columns present in a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedCapabilities {
    pub has_shapes: bool,
    pub has_calendar: bool,
    pub has_calendar_dates: bool,
    pub route_agency_id: bool,
    pub trip_shape_id: bool,
}

impl FeedCapabilities {
    pub fn detect(feed: &GtfsFeed) -> Self {
        Self {
            has_shapes: feed.shapes.is_some(),
            has_calendar: feed.calendar.is_some(),
            has_calendar_dates: feed.calendar_dates.is_some(),
            route_agency_id: has_column(&feed.routes, "agency_id"),
            trip_shape_id: has_column(&feed.trips, "shape_id"),
        }
    }

    pub fn has_service_calendar(&self) -> bool {
        self.has_calendar || self.has_calendar_dates
    }
}

/// Everything the loader produced for one archive.
#[derive(Debug, Clone, Default)]
pub struct LoadedArchive {
    pub feed: GtfsFeed,
    pub table_statuses: BTreeMap<String, TableStatus>,
    /// Required relations whose file is absent from the bundle.
    pub missing_required: BTreeSet<String>,
    pub capabilities: FeedCapabilities,
    /// File-level and row-level load problems.
    pub report: AnomalyReport,
}

impl LoadedArchive {
    /// Opens the input and loads every known table. Only a container that
    /// cannot be opened is an error; table problems land in `report`.
    pub fn load(input: &GtfsInput) -> Result<Self, GtfsInputError> {
        let reader = input.reader()?;
        let archive = Self::from_reader(&reader);
        info!(
            "loaded {} ({} table(s) missing, {} load issue(s))",
            input.source(),
            archive
                .table_statuses
                .values()
                .filter(|status| **status == TableStatus::MissingFile)
                .count(),
            archive.report.len()
        );
        Ok(archive)
    }

    pub fn from_reader(reader: &GtfsInputReader) -> Self {
        let mut loader = TableLoader {
            reader,
            statuses: BTreeMap::new(),
            report: AnomalyReport::new(),
        };
        let feed = GtfsFeed {
            agency: loader.load(AGENCY_FILE),
            stops: loader.load(STOPS_FILE),
            routes: loader.load(ROUTES_FILE),
            trips: loader.load(TRIPS_FILE),
            stop_times: loader.load(STOP_TIMES_FILE),
            shapes: loader.load(SHAPES_FILE),
            calendar: loader.load(CALENDAR_FILE),
            calendar_dates: loader.load(CALENDAR_DATES_FILE),
        };
        let missing_required = REQUIRED_FILES
            .iter()
            .map(|file| relation_name(file))
            .filter(|relation| {
                loader.statuses.get(*relation) == Some(&TableStatus::MissingFile)
            })
            .map(str::to_string)
            .collect();
        let capabilities = feed.capabilities();
        Self {
            feed,
            table_statuses: loader.statuses,
            missing_required,
            capabilities,
            report: loader.report,
        }
    }

    /// Returns the archive with its feed passed through [`normalize`].
    pub fn normalized(self) -> Self {
        let feed = normalize(&self.feed);
        let capabilities = feed.capabilities();
        Self {
            feed,
            capabilities,
            ..self
        }
    }

    pub fn status(&self, relation: &str) -> Option<TableStatus> {
        self.table_statuses.get(relation).copied()
    }
}

struct TableLoader<'a> {
    reader: &'a GtfsInputReader,
    statuses: BTreeMap<String, TableStatus>,
    report: AnomalyReport,
}

impl TableLoader<'_> {
    fn load<T: DeserializeOwned>(&mut self, file: &str) -> Option<CsvTable<T>> {
        let relation = relation_name(file);
        let (status, table) = match self.reader.read_file(file) {
            FileContent::Missing => {
                debug!("{} not present", file);
                (TableStatus::MissingFile, None)
            }
            FileContent::Unreadable(message) => {
                warn!("{} could not be read: {}", file, message);
                let error = CsvParseError {
                    file: file.to_string(),
                    message,
                    line_index: None,
                };
                self.report.push(Anomaly::from_csv_error(relation, &error));
                (TableStatus::ParseError, None)
            }
            FileContent::Data(data) => match read_csv_table::<T>(file, &data) {
                Ok(parsed) => {
                    debug!(
                        "{} loaded: {} row(s), {} skipped",
                        file,
                        parsed.table.rows.len(),
                        parsed.row_issues.len()
                    );
                    if !parsed.row_issues.is_empty() {
                        self.report.push(Anomaly::from_row_issues(
                            relation,
                            file,
                            &parsed.row_issues,
                        ));
                    }
                    (TableStatus::Ok, Some(parsed.table))
                }
                Err(error) => {
                    warn!("{} could not be parsed: {}", file, error.message);
                    self.report.push(Anomaly::from_csv_error(relation, &error));
                    (TableStatus::ParseError, None)
                }
            },
        };
        self.statuses.insert(relation.to_string(), status);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), nanos))
    }

    fn write_file(dir: &std::path::Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write file");
    }

    #[test]
    fn loads_tables_from_directory() {
        let dir = temp_dir("gtfs_lens_feed");
        fs::create_dir_all(&dir).expect("create dir");

        write_file(
            &dir,
            AGENCY_FILE,
            "agency_id,agency_name,agency_url,agency_timezone\nA1,Test Agency,https://example.com,UTC\n",
        );
        write_file(&dir, STOPS_FILE, "stop_id,stop_lat,stop_lon\nSTOP1,45.5,-73.6\n");
        write_file(&dir, ROUTES_FILE, "route_id,route_short_name\nR1,10\n");
        write_file(
            &dir,
            TRIPS_FILE,
            "route_id,service_id,trip_id\nR1,SVC1,T1\n",
        );
        write_file(
            &dir,
            STOP_TIMES_FILE,
            "trip_id,stop_id,stop_sequence,arrival_time,departure_time\nT1,STOP1,1,08:00:00,08:00:00\n",
        );

        let input = GtfsInput::from_path(&dir).expect("input");
        let archive = LoadedArchive::load(&input).expect("load archive");

        assert_eq!(archive.feed.stop_rows().len(), 1);
        assert_eq!(archive.feed.trip_rows().len(), 1);
        assert!(archive.missing_required.is_empty());
        assert!(archive.feed.calendar.is_none());
        assert_eq!(archive.status("calendar"), Some(TableStatus::MissingFile));
        assert_eq!(archive.status("stops"), Some(TableStatus::Ok));
        assert!(!archive.capabilities.route_agency_id);
        assert!(!archive.capabilities.trip_shape_id);
        assert!(!archive.capabilities.has_service_calendar());
        assert!(archive.report.is_empty());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn records_unparseable_file_without_aborting_others() {
        let dir = temp_dir("gtfs_lens_bad_file");
        fs::create_dir_all(&dir).expect("create dir");

        fs::write(dir.join(STOPS_FILE), b"stop_id,\xff\xfe\nS1,x\n").expect("write file");
        write_file(&dir, ROUTES_FILE, "route_id\nR1\n");

        let input = GtfsInput::from_path(&dir).expect("input");
        let archive = LoadedArchive::load(&input).expect("load archive");

        assert_eq!(archive.status("stops"), Some(TableStatus::ParseError));
        assert_eq!(archive.status("routes"), Some(TableStatus::Ok));
        assert!(!archive.missing_required.contains("stops"));
        assert!(archive.missing_required.contains("trips"));
        assert!(archive.feed.unavailable_required().contains("stops"));
        assert_eq!(archive.report.len(), 1);
        assert_eq!(
            archive.report.iter().next().map(|anomaly| anomaly.code.as_str()),
            Some("csv_parsing_failed")
        );

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn required_table_check_lists_every_gap() {
        let feed = GtfsFeed {
            stops: Some(CsvTable::default()),
            routes: Some(CsvTable::default()),
            ..GtfsFeed::default()
        };

        assert_eq!(
            feed.ensure_required_tables(),
            Err(DerivationError::MissingRequiredTable(vec![
                "agency".to_string(),
                "stop_times".to_string(),
                "trips".to_string(),
            ]))
        );
    }
}
