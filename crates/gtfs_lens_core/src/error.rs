use thiserror::Error;

/// Conditions that stop a derivation flow. Integrity anomalies are never
/// reported through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    #[error("required GTFS tables are missing: {}", .0.join(", "))]
    MissingRequiredTable(Vec<String>),
    #[error("feed has neither calendar.txt nor calendar_dates.txt; active service cannot be determined")]
    NoServiceCalendar,
    #[error("unknown route_id {0:?}")]
    UnknownRoute(String),
    #[error("unknown trip_id {0:?}")]
    UnknownTrip(String),
}
