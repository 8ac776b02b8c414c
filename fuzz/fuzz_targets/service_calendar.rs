#![no_main]
use arbitrary::Arbitrary;
use chrono::{Duration, NaiveDate};
use gtfs_lens_core::active_services;
use gtfs_lens_model::{Calendar, CalendarDate, ExceptionType, GtfsDate, ServiceAvailability};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzData {
    calendars: Vec<CalendarData>,
    calendar_dates: Vec<CalendarDateData>,
    day_offset: u16,
}

#[derive(Debug, Arbitrary)]
struct CalendarData {
    service: u8,
    weekdays: [bool; 7],
    start_offset: u16,
    end_offset: u16,
}

#[derive(Debug, Arbitrary)]
struct CalendarDateData {
    service: u8,
    day_offset: u16,
    exception_type: u8,
}

fn flag(value: bool) -> ServiceAvailability {
    if value {
        ServiceAvailability::Available
    } else {
        ServiceAvailability::Unavailable
    }
}

fuzz_target!(|data: FuzzData| {
    let Some(base) = NaiveDate::from_ymd_opt(2024, 1, 1) else {
        return;
    };
    let day = |offset: u16| base + Duration::days(i64::from(offset % 730));

    let calendars: Vec<Calendar> = data
        .calendars
        .iter()
        .map(|c| Calendar {
            service_id: format!("S{}", c.service % 8),
            monday: flag(c.weekdays[0]),
            tuesday: flag(c.weekdays[1]),
            wednesday: flag(c.weekdays[2]),
            thursday: flag(c.weekdays[3]),
            friday: flag(c.weekdays[4]),
            saturday: flag(c.weekdays[5]),
            sunday: flag(c.weekdays[6]),
            start_date: Some(GtfsDate::from(day(c.start_offset))),
            end_date: Some(GtfsDate::from(day(c.end_offset))),
        })
        .collect();
    let calendar_dates: Vec<CalendarDate> = data
        .calendar_dates
        .iter()
        .map(|d| CalendarDate {
            service_id: format!("S{}", d.service % 8),
            date: Some(GtfsDate::from(day(d.day_offset))),
            exception_type: match d.exception_type % 3 {
                0 => ExceptionType::Added,
                1 => ExceptionType::Removed,
                _ => ExceptionType::Other,
            },
        })
        .collect();

    let date = day(data.day_offset);
    let Ok(active) = active_services(date, Some(&calendars[..]), Some(&calendar_dates[..])) else {
        return;
    };

    // The last exception for a (service, date) pair decides membership.
    let target = GtfsDate::from(date);
    let mut last: std::collections::BTreeMap<&str, ExceptionType> = Default::default();
    for exception in &calendar_dates {
        if exception.date == Some(target) && exception.exception_type != ExceptionType::Other {
            last.insert(exception.service_id.as_str(), exception.exception_type);
        }
    }
    for (service_id, exception_type) in last {
        match exception_type {
            ExceptionType::Added => assert!(active.contains(service_id)),
            ExceptionType::Removed => assert!(!active.contains(service_id)),
            ExceptionType::Other => {}
        }
    }
});
