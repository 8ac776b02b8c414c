use rustc_hash::{FxHashMap, FxHashSet};

use crate::feed::{
    relation_name, AGENCY_FILE, ROUTES_FILE, STOPS_FILE, STOP_TIMES_FILE, TRIPS_FILE,
};
use crate::{Anomaly, AnomalyReport, AnomalySeverity, GtfsFeed, Validator};

pub(crate) const CODE_FOREIGN_KEY_VIOLATION: &str = "foreign_key_violation";

/// Child column and the parent column it must reference.
pub(crate) struct ForeignKey {
    pub child_file: &'static str,
    pub child_field: &'static str,
    pub parent_file: &'static str,
    pub parent_field: &'static str,
}

/// Checks every distinct referenced value once against `parents`.
///
/// `references` yields `(value, csv row number)` for each child row. Returns a
/// single anomaly whose count is the number of distinct missing values, or
/// `None` when every reference resolves.
pub(crate) fn check_references<'a>(
    key: &ForeignKey,
    references: impl IntoIterator<Item = (&'a str, u64)>,
    parents: &FxHashSet<&str>,
) -> Option<Anomaly> {
    let mut referenced: FxHashMap<&str, (u64, u64)> = FxHashMap::default();
    for (value, row_number) in references {
        let entry = referenced.entry(value).or_insert((row_number, 0));
        entry.1 += 1;
    }

    let mut missing: Vec<(&str, u64, u64)> = referenced
        .into_iter()
        .filter(|(value, _)| !parents.contains(value))
        .map(|(value, (first_row, rows))| (value, first_row, rows))
        .collect();
    if missing.is_empty() {
        return None;
    }
    missing.sort_unstable();

    let distinct = missing.len() as u64;
    let rows: u64 = missing.iter().map(|(_, _, rows)| rows).sum();
    let first_row = missing.iter().map(|(_, first, _)| *first).min().unwrap_or_default();
    let mut anomaly = Anomaly::new(
        CODE_FOREIGN_KEY_VIOLATION,
        AnomalySeverity::Error,
        relation_name(key.child_file),
        format!(
            "{} distinct {} value(s) in {} are not present in {}",
            distinct, key.child_field, key.child_file, key.parent_file
        ),
    )
    .with_count(distinct);
    anomaly.insert_context_field("childFieldName", key.child_field);
    anomaly.insert_context_field("childFilename", key.child_file);
    anomaly.insert_context_field("parentFieldName", key.parent_field);
    anomaly.insert_context_field("parentFilename", key.parent_file);
    anomaly.insert_context_field("offendingRows", rows);
    anomaly.insert_context_field("firstCsvRowNumber", first_row);
    Some(anomaly.with_sample_values(missing.iter().map(|(value, _, _)| *value)))
}

#[derive(Debug, Default)]
pub struct RouteAgencyForeignKeyValidator;

impl Validator for RouteAgencyForeignKeyValidator {
    fn name(&self) -> &'static str {
        "route_agency_foreign_key"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        // agency_id is optional in routes.txt; no column, nothing to check.
        if !feed.capabilities().route_agency_id {
            return;
        }
        let (Some(routes), Some(agency)) = (&feed.routes, &feed.agency) else {
            return;
        };
        let parents: FxHashSet<&str> = agency
            .rows
            .iter()
            .filter_map(|row| row.agency_id.as_deref())
            .collect();
        let references = routes.rows.iter().enumerate().filter_map(|(index, route)| {
            route
                .agency_id
                .as_deref()
                .map(|agency_id| (agency_id, routes.row_number(index)))
        });
        let key = ForeignKey {
            child_file: ROUTES_FILE,
            child_field: "agency_id",
            parent_file: AGENCY_FILE,
            parent_field: "agency_id",
        };
        if let Some(anomaly) = check_references(&key, references, &parents) {
            report.push(anomaly);
        }
    }
}

#[derive(Debug, Default)]
pub struct TripRouteForeignKeyValidator;

impl Validator for TripRouteForeignKeyValidator {
    fn name(&self) -> &'static str {
        "trip_route_foreign_key"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        let (Some(trips), Some(routes)) = (&feed.trips, &feed.routes) else {
            return;
        };
        let parents: FxHashSet<&str> =
            routes.rows.iter().map(|route| route.route_id.as_str()).collect();
        let references = trips
            .rows
            .iter()
            .enumerate()
            .map(|(index, trip)| (trip.route_id.as_str(), trips.row_number(index)));
        let key = ForeignKey {
            child_file: TRIPS_FILE,
            child_field: "route_id",
            parent_file: ROUTES_FILE,
            parent_field: "route_id",
        };
        if let Some(anomaly) = check_references(&key, references, &parents) {
            report.push(anomaly);
        }
    }
}

#[derive(Debug, Default)]
pub struct StopTimeTripForeignKeyValidator;

impl Validator for StopTimeTripForeignKeyValidator {
    fn name(&self) -> &'static str {
        "stop_time_trip_foreign_key"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        let (Some(stop_times), Some(trips)) = (&feed.stop_times, &feed.trips) else {
            return;
        };
        let parents: FxHashSet<&str> =
            trips.rows.iter().map(|trip| trip.trip_id.as_str()).collect();
        let references = stop_times
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| (row.trip_id.as_str(), stop_times.row_number(index)));
        let key = ForeignKey {
            child_file: STOP_TIMES_FILE,
            child_field: "trip_id",
            parent_file: TRIPS_FILE,
            parent_field: "trip_id",
        };
        if let Some(anomaly) = check_references(&key, references, &parents) {
            report.push(anomaly);
        }
    }
}

#[derive(Debug, Default)]
pub struct StopTimeStopForeignKeyValidator;

impl Validator for StopTimeStopForeignKeyValidator {
    fn name(&self) -> &'static str {
        "stop_time_stop_foreign_key"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        let (Some(stop_times), Some(stops)) = (&feed.stop_times, &feed.stops) else {
            return;
        };
        let parents: FxHashSet<&str> =
            stops.rows.iter().map(|stop| stop.stop_id.as_str()).collect();
        let references = stop_times
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| (row.stop_id.as_str(), stop_times.row_number(index)));
        let key = ForeignKey {
            child_file: STOP_TIMES_FILE,
            child_field: "stop_id",
            parent_file: STOPS_FILE,
            parent_field: "stop_id",
        };
        if let Some(anomaly) = check_references(&key, references, &parents) {
            report.push(anomaly);
        }
    }
}
