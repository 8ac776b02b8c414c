mod anomaly;
mod calendar;
mod csv_reader;
mod engine;
mod error;
mod export;
pub mod feed;
pub mod input;
mod normalize;
pub mod rules;
mod selection;
mod table_status;
mod validator;

pub use anomaly::{
    Anomaly, AnomalyReport, AnomalySeverity, ANOMALY_CODE_CSV_PARSE_ERROR,
    ANOMALY_CODE_INVALID_ROW, ANOMALY_CODE_MISSING_FILE, ANOMALY_CODE_MISSING_RECOMMENDED_FILE,
    MAX_SAMPLE_VALUES,
};
pub use calendar::{active_services, parse_service_date, rule_covers, ServiceCalendar};
pub use csv_reader::{read_csv_table, CsvParseError, CsvTable, ParsedCsv, RowIssue};
pub use engine::{
    validate_bytes, validate_input, validate_path, ArchiveSession, ValidationOutcome,
};
pub use error::DerivationError;
pub use export::{stop_visits_csv_file_name, write_stop_visits_csv};
pub use feed::{FeedCapabilities, GtfsFeed, LoadedArchive};
pub use input::{GtfsInput, GtfsInputError};
pub use normalize::{canonical_id, normalize};
pub use rules::default_runner;
pub use selection::{
    partition_by_direction, route_label, route_options, trip_label, visits_centroid,
    DirectionKey, RouteOption, StopVisit, TripEndpoints, TripSelector,
};
pub use table_status::TableStatus;
pub use validator::{Validator, ValidatorRunner};

pub use gtfs_lens_model as model;
