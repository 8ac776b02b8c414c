use rustc_hash::FxHashSet;

use crate::feed::{SHAPES_FILE, TRIPS_FILE};
use crate::rules::referential_integrity::{check_references, ForeignKey};
use crate::{AnomalyReport, GtfsFeed, Validator};

const SERVICE_PARENT_FILES: &str = "calendar.txt or calendar_dates.txt";

#[derive(Debug, Default)]
pub struct TripServiceForeignKeyValidator;

impl Validator for TripServiceForeignKeyValidator {
    fn name(&self) -> &'static str {
        "trip_service_foreign_key"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        if !feed.capabilities().has_service_calendar() {
            return;
        }
        let Some(trips) = &feed.trips else {
            return;
        };
        let mut parents: FxHashSet<&str> = FxHashSet::default();
        if let Some(calendar) = &feed.calendar {
            parents.extend(calendar.rows.iter().map(|row| row.service_id.as_str()));
        }
        if let Some(calendar_dates) = &feed.calendar_dates {
            parents.extend(calendar_dates.rows.iter().map(|row| row.service_id.as_str()));
        }
        let references = trips
            .rows
            .iter()
            .enumerate()
            .map(|(index, trip)| (trip.service_id.as_str(), trips.row_number(index)));
        let key = ForeignKey {
            child_file: TRIPS_FILE,
            child_field: "service_id",
            parent_file: SERVICE_PARENT_FILES,
            parent_field: "service_id",
        };
        if let Some(anomaly) = check_references(&key, references, &parents) {
            report.push(anomaly);
        }
    }
}

#[derive(Debug, Default)]
pub struct TripShapeForeignKeyValidator;

impl Validator for TripShapeForeignKeyValidator {
    fn name(&self) -> &'static str {
        "trip_shape_foreign_key"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        let capabilities = feed.capabilities();
        if !(capabilities.has_shapes && capabilities.trip_shape_id) {
            return;
        }
        let (Some(trips), Some(shapes)) = (&feed.trips, &feed.shapes) else {
            return;
        };
        let parents: FxHashSet<&str> = shapes
            .rows
            .iter()
            .map(|point| point.shape_id.as_str())
            .collect();
        let references = trips.rows.iter().enumerate().filter_map(|(index, trip)| {
            trip.shape_id
                .as_deref()
                .filter(|shape_id| !shape_id.is_empty())
                .map(|shape_id| (shape_id, trips.row_number(index)))
        });
        let key = ForeignKey {
            child_file: TRIPS_FILE,
            child_field: "shape_id",
            parent_file: SHAPES_FILE,
            parent_field: "shape_id",
        };
        if let Some(anomaly) = check_references(&key, references, &parents) {
            report.push(anomaly);
        }
    }
}
