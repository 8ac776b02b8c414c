use gtfs_lens_model::{Agency, Calendar, CalendarDate, Route, Shape, Stop, StopTime, Trip};

use crate::GtfsFeed;

/// Canonical text form of an identifier.
///
/// Surrounding whitespace is dropped and an integral number written with a
/// zero fraction (`"12.0"`, `"7.00"`) collapses to its integer digits. Any
/// other text is returned as-is, leading zeros included.
pub fn canonical_id(value: &str) -> String {
    let trimmed = value.trim();
    if let Some((integer, fraction)) = trimmed.split_once('.') {
        if !integer.is_empty()
            && !fraction.is_empty()
            && integer.bytes().all(|byte| byte.is_ascii_digit())
            && fraction.bytes().all(|byte| byte == b'0')
        {
            return integer.to_string();
        }
    }
    trimmed.to_string()
}

fn canonical_ref(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(canonical_id)
        .filter(|value| !value.is_empty())
}

fn canonical_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite())
}

/// Returns a new feed with identifier, coordinate and grouping columns in
/// canonical form. Applying it twice gives the same feed as applying it once.
pub fn normalize(feed: &GtfsFeed) -> GtfsFeed {
    GtfsFeed {
        agency: feed.agency.as_ref().map(|table| table.map_rows(agency)),
        stops: feed.stops.as_ref().map(|table| table.map_rows(stop)),
        routes: feed.routes.as_ref().map(|table| table.map_rows(route)),
        trips: feed.trips.as_ref().map(|table| table.map_rows(trip)),
        stop_times: feed.stop_times.as_ref().map(|table| table.map_rows(stop_time)),
        shapes: feed.shapes.as_ref().map(|table| table.map_rows(shape)),
        calendar: feed.calendar.as_ref().map(|table| table.map_rows(calendar)),
        calendar_dates: feed
            .calendar_dates
            .as_ref()
            .map(|table| table.map_rows(calendar_date)),
    }
}

fn agency(row: &Agency) -> Agency {
    Agency {
        agency_id: canonical_ref(&row.agency_id),
        ..row.clone()
    }
}

fn stop(row: &Stop) -> Stop {
    Stop {
        stop_id: canonical_id(&row.stop_id),
        stop_name: canonical_text(&row.stop_name),
        stop_lat: finite(row.stop_lat),
        stop_lon: finite(row.stop_lon),
        parent_station: canonical_ref(&row.parent_station),
        ..row.clone()
    }
}

fn route(row: &Route) -> Route {
    Route {
        route_id: canonical_id(&row.route_id),
        agency_id: canonical_ref(&row.agency_id),
        route_short_name: canonical_text(&row.route_short_name),
        route_long_name: canonical_text(&row.route_long_name),
        ..row.clone()
    }
}

fn trip(row: &Trip) -> Trip {
    Trip {
        route_id: canonical_id(&row.route_id),
        service_id: canonical_id(&row.service_id),
        trip_id: canonical_id(&row.trip_id),
        trip_headsign: canonical_text(&row.trip_headsign),
        shape_id: canonical_ref(&row.shape_id),
        ..row.clone()
    }
}

fn stop_time(row: &StopTime) -> StopTime {
    StopTime {
        trip_id: canonical_id(&row.trip_id),
        stop_id: canonical_id(&row.stop_id),
        arrival_time: canonical_text(&row.arrival_time),
        departure_time: canonical_text(&row.departure_time),
        shape_dist_traveled: finite(row.shape_dist_traveled),
        ..row.clone()
    }
}

fn shape(row: &Shape) -> Shape {
    Shape {
        shape_id: canonical_id(&row.shape_id),
        shape_pt_lat: finite(row.shape_pt_lat),
        shape_pt_lon: finite(row.shape_pt_lon),
        shape_dist_traveled: finite(row.shape_dist_traveled),
        ..row.clone()
    }
}

fn calendar(row: &Calendar) -> Calendar {
    Calendar {
        service_id: canonical_id(&row.service_id),
        ..row.clone()
    }
}

fn calendar_date(row: &CalendarDate) -> CalendarDate {
    CalendarDate {
        service_id: canonical_id(&row.service_id),
        ..row.clone()
    }
}
