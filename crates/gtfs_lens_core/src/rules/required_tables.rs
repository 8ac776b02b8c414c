use crate::feed::{relation_name, CALENDAR_DATES_FILE, CALENDAR_FILE, REQUIRED_FILES};
use crate::{Anomaly, AnomalyReport, AnomalySeverity, GtfsFeed, Validator};

const CODE_MISSING_CALENDAR: &str = "missing_calendar_and_calendar_date_files";

/// Required relations that are absent or unusable. Without any calendar table
/// no date can be resolved, which is as severe as a missing required file;
/// a feed that only uses calendar_dates.txt gets a warning.
#[derive(Debug, Default)]
pub struct RequiredTablesValidator;

impl Validator for RequiredTablesValidator {
    fn name(&self) -> &'static str {
        "required_tables"
    }

    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        for file in REQUIRED_FILES {
            if !feed.has_table(file) {
                report.push(Anomaly::missing_required_file(relation_name(file)));
            }
        }

        let capabilities = feed.capabilities();
        if !capabilities.has_service_calendar() {
            report.push(
                Anomaly::new(
                    CODE_MISSING_CALENDAR,
                    AnomalySeverity::Critical,
                    relation_name(CALENDAR_FILE),
                    format!(
                        "neither {} nor {} is present; active services cannot be determined",
                        CALENDAR_FILE, CALENDAR_DATES_FILE
                    ),
                )
                .with_context_field("filename", CALENDAR_FILE),
            );
        } else if !capabilities.has_calendar {
            report.push(Anomaly::missing_recommended_file(relation_name(
                CALENDAR_FILE,
            )));
        }
    }
}
