pub mod duplicate_key;
pub mod referential_integrity;
pub mod required_tables;
pub mod route_names;
pub mod trip_references;

use crate::ValidatorRunner;

pub use duplicate_key::DuplicateKeyValidator;
pub use referential_integrity::{
    RouteAgencyForeignKeyValidator, StopTimeStopForeignKeyValidator,
    StopTimeTripForeignKeyValidator, TripRouteForeignKeyValidator,
};
pub use required_tables::RequiredTablesValidator;
pub use route_names::RouteNameValidator;
pub use trip_references::{TripServiceForeignKeyValidator, TripShapeForeignKeyValidator};

/// Validators in report order.
pub fn default_runner() -> ValidatorRunner {
    let mut runner = ValidatorRunner::new();
    runner.register(RequiredTablesValidator);
    runner.register(RouteAgencyForeignKeyValidator);
    runner.register(TripRouteForeignKeyValidator);
    runner.register(StopTimeTripForeignKeyValidator);
    runner.register(StopTimeStopForeignKeyValidator);
    runner.register(DuplicateKeyValidator);
    runner.register(TripServiceForeignKeyValidator);
    runner.register(TripShapeForeignKeyValidator);
    runner.register(RouteNameValidator);
    runner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_checks_in_report_order() {
        assert_eq!(
            default_runner().names(),
            vec![
                "required_tables",
                "route_agency_foreign_key",
                "trip_route_foreign_key",
                "stop_time_trip_foreign_key",
                "stop_time_stop_foreign_key",
                "duplicate_key",
                "trip_service_foreign_key",
                "trip_shape_foreign_key",
                "route_names",
            ]
        );
    }
}
