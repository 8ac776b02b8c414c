use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use rustc_hash::FxHashMap;

use gtfs_lens_model::{
    Calendar, CalendarDate, ExceptionType, GtfsDate, ServiceAvailability, Trip,
};

use crate::{DerivationError, FeedCapabilities, GtfsFeed};

/// Whether a calendar rule's range and weekday flags cover `date`. A rule with
/// an unreadable bound or an inverted range covers nothing.
pub fn rule_covers(rule: &Calendar, date: NaiveDate) -> bool {
    let (Some(start), Some(end)) = (rule.start_date, rule.end_date) else {
        return false;
    };
    let day = GtfsDate::from(date);
    start <= end
        && start <= day
        && day <= end
        && rule.availability_on(date.weekday()) == ServiceAvailability::Available
}

/// Service ids running on `date`.
///
/// Rules are applied first, then every exception for that date: ADDED inserts
/// and REMOVED deletes regardless of row order. Removing a service that was
/// not running is a no-op. With neither table present there is nothing to
/// resolve against and the call fails with `NoServiceCalendar`.
pub fn active_services(
    date: NaiveDate,
    calendar: Option<&[Calendar]>,
    calendar_dates: Option<&[CalendarDate]>,
) -> Result<BTreeSet<String>, DerivationError> {
    if calendar.is_none() && calendar_dates.is_none() {
        return Err(DerivationError::NoServiceCalendar);
    }
    let day = GtfsDate::from(date);
    let mut active: BTreeSet<String> = calendar
        .unwrap_or_default()
        .iter()
        .filter(|rule| rule_covers(rule, date))
        .map(|rule| rule.service_id.clone())
        .collect();
    let exceptions = calendar_dates
        .unwrap_or_default()
        .iter()
        .filter(|exception| exception.date == Some(day));
    apply_exceptions(&mut active, exceptions);
    Ok(active)
}

fn apply_exceptions<'a>(
    active: &mut BTreeSet<String>,
    exceptions: impl Iterator<Item = &'a CalendarDate>,
) {
    for exception in exceptions {
        match exception.exception_type {
            ExceptionType::Added => {
                active.insert(exception.service_id.clone());
            }
            ExceptionType::Removed => {
                active.remove(&exception.service_id);
            }
            ExceptionType::Other => {}
        }
    }
}

/// Calendar tables of one feed, indexed for repeated date queries.
#[derive(Debug, Clone)]
pub struct ServiceCalendar<'a> {
    rules: &'a [Calendar],
    exceptions_by_date: FxHashMap<GtfsDate, Vec<&'a CalendarDate>>,
    trips: &'a [Trip],
}

impl<'a> ServiceCalendar<'a> {
    pub fn from_feed(feed: &'a GtfsFeed) -> Result<Self, DerivationError> {
        Self::with_capabilities(feed, &feed.capabilities())
    }

    /// Builds the index from capabilities already detected for `feed`.
    pub fn with_capabilities(
        feed: &'a GtfsFeed,
        capabilities: &FeedCapabilities,
    ) -> Result<Self, DerivationError> {
        if !capabilities.has_service_calendar() {
            return Err(DerivationError::NoServiceCalendar);
        }
        let mut exceptions_by_date: FxHashMap<GtfsDate, Vec<&CalendarDate>> =
            FxHashMap::default();
        if let Some(table) = &feed.calendar_dates {
            for exception in &table.rows {
                if let Some(date) = exception.date {
                    exceptions_by_date.entry(date).or_default().push(exception);
                }
            }
        }
        Ok(Self {
            rules: feed
                .calendar
                .as_ref()
                .map(|table| table.rows.as_slice())
                .unwrap_or_default(),
            exceptions_by_date,
            trips: feed.trip_rows(),
        })
    }

    pub fn active_services(&self, date: NaiveDate) -> BTreeSet<String> {
        let mut active: BTreeSet<String> = self
            .rules
            .iter()
            .filter(|rule| rule_covers(rule, date))
            .map(|rule| rule.service_id.clone())
            .collect();
        if let Some(exceptions) = self.exceptions_by_date.get(&GtfsDate::from(date)) {
            apply_exceptions(&mut active, exceptions.iter().copied());
        }
        active
    }

    pub fn is_active(&self, service_id: &str, date: NaiveDate) -> bool {
        self.active_services(date).contains(service_id)
    }

    /// Trips whose service runs on `date`, in file order.
    pub fn active_trips(&self, date: NaiveDate) -> Vec<&'a Trip> {
        let active = self.active_services(date);
        self.trips
            .iter()
            .filter(|trip| active.contains(&trip.service_id))
            .collect()
    }
}

/// Accepts `2024-01-08` as well as the feed's own `20240108`.
pub fn parse_service_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| GtfsDate::parse(trimmed).ok().and_then(GtfsDate::to_naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CsvTable;

    fn date(value: &str) -> NaiveDate {
        parse_service_date(value).expect("valid date")
    }

    fn weekday_rule(service_id: &str, start: &str, end: &str) -> Calendar {
        Calendar {
            service_id: service_id.into(),
            monday: ServiceAvailability::Available,
            tuesday: ServiceAvailability::Available,
            wednesday: ServiceAvailability::Available,
            thursday: ServiceAvailability::Available,
            friday: ServiceAvailability::Available,
            start_date: GtfsDate::parse(start).ok(),
            end_date: GtfsDate::parse(end).ok(),
            ..Calendar::default()
        }
    }

    fn exception(service_id: &str, on: &str, exception_type: ExceptionType) -> CalendarDate {
        CalendarDate {
            service_id: service_id.into(),
            date: GtfsDate::parse(on).ok(),
            exception_type,
        }
    }

    #[test]
    fn includes_service_on_covered_weekday() {
        let rules = vec![weekday_rule("A", "20240101", "20240131")];

        let monday = active_services(date("2024-01-08"), Some(rules.as_slice()), None).unwrap();
        assert!(monday.contains("A"));

        let saturday = active_services(date("2024-01-06"), Some(rules.as_slice()), None).unwrap();
        assert!(saturday.is_empty());

        let after_range = active_services(date("2024-02-05"), Some(rules.as_slice()), None).unwrap();
        assert!(after_range.is_empty());
    }

    #[test]
    fn removed_exception_overrides_rule() {
        let rules = vec![weekday_rule("A", "20240101", "20240131")];
        let exceptions = vec![exception("A", "20240108", ExceptionType::Removed)];

        let active =
            active_services(date("2024-01-08"), Some(rules.as_slice()), Some(exceptions.as_slice())).unwrap();
        assert!(!active.contains("A"));

        let next_day =
            active_services(date("2024-01-09"), Some(rules.as_slice()), Some(exceptions.as_slice())).unwrap();
        assert!(next_day.contains("A"));
    }

    #[test]
    fn added_exception_without_rules() {
        let exceptions = vec![exception("HOLIDAY", "20240101", ExceptionType::Added)];

        let active = active_services(date("20240101"), None, Some(exceptions.as_slice())).unwrap();
        assert_eq!(active.into_iter().collect::<Vec<_>>(), vec!["HOLIDAY"]);
    }

    #[test]
    fn exceptions_apply_after_rules_regardless_of_order() {
        let rules = vec![weekday_rule("A", "20240101", "20240131")];
        let exceptions = vec![
            exception("B", "20240108", ExceptionType::Removed),
            exception("B", "20240108", ExceptionType::Added),
            exception("A", "20240108", ExceptionType::Removed),
        ];

        let active =
            active_services(date("2024-01-08"), Some(rules.as_slice()), Some(exceptions.as_slice())).unwrap();
        assert!(!active.contains("A"));
        assert!(active.contains("B"));
    }

    #[test]
    fn removing_inactive_service_is_a_no_op() {
        let exceptions = vec![
            exception("X", "20240108", ExceptionType::Removed),
            exception("X", "20240108", ExceptionType::Removed),
        ];

        let active = active_services(date("2024-01-08"), Some(&[][..]), Some(exceptions.as_slice())).unwrap();
        assert!(active.is_empty());
    }

    #[test]
    fn inverted_or_unreadable_ranges_cover_nothing() {
        let inverted = weekday_rule("A", "20240131", "20240101");
        let mut unreadable = weekday_rule("B", "20240101", "20240131");
        unreadable.end_date = None;

        let day = date("2024-01-15");
        assert!(!rule_covers(&inverted, day));
        assert!(!rule_covers(&unreadable, day));
    }

    #[test]
    fn signals_missing_calendar() {
        assert_eq!(
            active_services(date("2024-01-08"), None, None),
            Err(DerivationError::NoServiceCalendar)
        );
        assert!(matches!(
            ServiceCalendar::from_feed(&GtfsFeed::default()),
            Err(DerivationError::NoServiceCalendar)
        ));
    }

    #[test]
    fn service_calendar_selects_active_trips() {
        let feed = GtfsFeed {
            calendar: Some(CsvTable::from_rows(
                &["service_id"],
                vec![weekday_rule("WK", "20240101", "20240131")],
            )),
            calendar_dates: Some(CsvTable::from_rows(
                &["service_id", "date", "exception_type"],
                vec![
                    exception("WK", "20240108", ExceptionType::Removed),
                    exception("SUN", "20240107", ExceptionType::Added),
                ],
            )),
            trips: Some(CsvTable::from_rows(
                &["route_id", "service_id", "trip_id"],
                vec![
                    Trip {
                        trip_id: "T1".into(),
                        service_id: "WK".into(),
                        ..Trip::default()
                    },
                    Trip {
                        trip_id: "T2".into(),
                        service_id: "SUN".into(),
                        ..Trip::default()
                    },
                ],
            )),
            ..GtfsFeed::default()
        };

        let calendar = ServiceCalendar::from_feed(&feed).unwrap();
        let ids = |on: &str| {
            calendar
                .active_trips(date(on))
                .into_iter()
                .map(|trip| trip.trip_id.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids("2024-01-09"), vec!["T1"]);
        assert_eq!(ids("2024-01-08"), Vec::<&str>::new());
        assert_eq!(ids("2024-01-07"), vec!["T2"]);
        assert!(calendar.is_active("WK", date("2024-01-10")));
    }

    #[test]
    fn parses_both_date_spellings() {
        assert_eq!(parse_service_date("2024-01-08"), parse_service_date("20240108"));
        assert_eq!(parse_service_date("2024-13-01"), None);
    }
}
