use crate::feed::{relation_name, ROUTES_FILE};
use crate::{Anomaly, AnomalyReport, AnomalySeverity, GtfsFeed, Validator};

const CODE_ROUTE_BOTH_NAMES_MISSING: &str = "route_both_short_and_long_name_missing";

#[derive(Debug, Default)]
pub struct RouteNameValidator;

impl Validator for RouteNameValidator {
    fn name(&self) -> &'static str {
        "route_names"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        let Some(routes) = &feed.routes else {
            return;
        };
        let unnamed: Vec<(&str, u64)> = routes
            .rows
            .iter()
            .enumerate()
            .filter(|(_, route)| {
                is_blank(route.route_short_name.as_deref())
                    && is_blank(route.route_long_name.as_deref())
            })
            .map(|(index, route)| (route.route_id.as_str(), routes.row_number(index)))
            .collect();
        let Some((_, first_row)) = unnamed.first() else {
            return;
        };

        let mut anomaly = Anomaly::new(
            CODE_ROUTE_BOTH_NAMES_MISSING,
            AnomalySeverity::Warning,
            relation_name(ROUTES_FILE),
            format!(
                "{} route(s) have neither route_short_name nor route_long_name",
                unnamed.len()
            ),
        )
        .with_count(unnamed.len() as u64);
        anomaly.insert_context_field("filename", ROUTES_FILE);
        anomaly.insert_context_field("firstCsvRowNumber", *first_row);
        report.push(anomaly.with_sample_values(unnamed.iter().map(|(route_id, _)| *route_id)));
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}
