use rustc_hash::FxHashMap;

use crate::feed::{relation_name, AGENCY_FILE, ROUTES_FILE, STOPS_FILE, TRIPS_FILE};
use crate::{Anomaly, AnomalyReport, AnomalySeverity, CsvTable, GtfsFeed, Validator};

const CODE_DUPLICATE_KEY: &str = "duplicate_key";

/// Primary keys repeated within stops, routes, trips and agency. Duplicates
/// are reported, never removed; lookups elsewhere keep the first occurrence.
#[derive(Debug, Default)]
pub struct DuplicateKeyValidator;

impl Validator for DuplicateKeyValidator {
    fn name(&self) -> &'static str {
        "duplicate_key"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        if let Some(stops) = &feed.stops {
            check_table(report, STOPS_FILE, "stop_id", stops, |row| {
                Some(row.stop_id.as_str())
            });
        }
        if let Some(routes) = &feed.routes {
            check_table(report, ROUTES_FILE, "route_id", routes, |row| {
                Some(row.route_id.as_str())
            });
        }
        if let Some(trips) = &feed.trips {
            check_table(report, TRIPS_FILE, "trip_id", trips, |row| {
                Some(row.trip_id.as_str())
            });
        }
        // A single-agency feed may leave agency_id blank.
        if let Some(agency) = &feed.agency {
            check_table(report, AGENCY_FILE, "agency_id", agency, |row| {
                row.agency_id.as_deref()
            });
        }
    }
}

fn check_table<'a, T>(
    report: &mut AnomalyReport,
    file: &'static str,
    field: &'static str,
    table: &'a CsvTable<T>,
    key: impl Fn(&'a T) -> Option<&'a str>,
) {
    let mut occurrences: FxHashMap<&str, (u64, u64)> = FxHashMap::default();
    for (index, row) in table.rows.iter().enumerate() {
        let Some(value) = key(row).filter(|value| !value.is_empty()) else {
            continue;
        };
        let entry = occurrences
            .entry(value)
            .or_insert((table.row_number(index), 0));
        entry.1 += 1;
    }

    let mut duplicated: Vec<(&str, u64, u64)> = occurrences
        .into_iter()
        .filter(|(_, (_, seen))| *seen > 1)
        .map(|(value, (first_row, seen))| (value, first_row, seen))
        .collect();
    if duplicated.is_empty() {
        return;
    }
    duplicated.sort_unstable();

    let distinct = duplicated.len() as u64;
    let extra_rows: u64 = duplicated.iter().map(|(_, _, seen)| seen - 1).sum();
    let mut anomaly = Anomaly::new(
        CODE_DUPLICATE_KEY,
        AnomalySeverity::Warning,
        relation_name(file),
        format!(
            "{} {} value(s) appear more than once in {}",
            distinct, field, file
        ),
    )
    .with_count(distinct);
    anomaly.insert_context_field("fieldName", field);
    anomaly.insert_context_field("filename", file);
    anomaly.insert_context_field("duplicateRows", extra_rows);
    report.push(anomaly.with_sample_values(duplicated.iter().map(|(value, _, _)| *value)));
}
