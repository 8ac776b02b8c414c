use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use gtfs_lens_model::{GtfsTime, Route, Shape, Stop, StopTime, Trip};

use crate::{DerivationError, GtfsFeed, ServiceCalendar};

/// Bucket of the route -> direction step.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DirectionKey {
    Direction(u8),
    Headsign(String),
    /// Neither direction nor headsign is usable; every trip of the route.
    All,
    /// Trips lacking the grouping value used for their siblings.
    Unassigned,
}

impl fmt::Display for DirectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectionKey::Direction(value) => write!(f, "direction_id = {}", value),
            DirectionKey::Headsign(headsign) => f.write_str(headsign),
            DirectionKey::All => f.write_str("all trips"),
            DirectionKey::Unassigned => f.write_str("unassigned"),
        }
    }
}

/// Groups trips by direction indicator when any trip has one, else by
/// headsign when any trip has one, else into a single `All` bucket.
/// Trip order inside each bucket follows the input.
pub fn partition_by_direction<'a>(trips: &[&'a Trip]) -> BTreeMap<DirectionKey, Vec<&'a Trip>> {
    let mut groups: BTreeMap<DirectionKey, Vec<&'a Trip>> = BTreeMap::new();
    if trips.is_empty() {
        return groups;
    }
    if trips.iter().any(|trip| trip.direction_id.is_some()) {
        for trip in trips {
            let key = trip
                .direction_id
                .map(|direction| DirectionKey::Direction(direction.as_u8()))
                .unwrap_or(DirectionKey::Unassigned);
            groups.entry(key).or_default().push(*trip);
        }
    } else if trips.iter().any(|trip| headsign(trip).is_some()) {
        for trip in trips {
            let key = headsign(trip)
                .map(|headsign| DirectionKey::Headsign(headsign.to_string()))
                .unwrap_or(DirectionKey::Unassigned);
            groups.entry(key).or_default().push(*trip);
        }
    } else {
        groups.insert(DirectionKey::All, trips.to_vec());
    }
    groups
}

fn headsign(trip: &Trip) -> Option<&str> {
    trip.trip_headsign
        .as_deref()
        .map(str::trim)
        .filter(|headsign| !headsign.is_empty())
}

/// One row of a trip's timed stop list, stop attributes joined in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopVisit {
    pub stop_sequence: Option<u32>,
    pub stop_id: String,
    pub stop_name: Option<String>,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
    /// False when `stop_id` is not in stops; the visit is still listed.
    pub stop_known: bool,
}

impl StopVisit {
    fn from_stop_time(stop_time: &StopTime, stop: Option<&Stop>) -> Self {
        Self {
            stop_sequence: stop_time.stop_sequence,
            stop_id: stop_time.stop_id.clone(),
            stop_name: stop.and_then(|stop| stop.stop_name.clone()),
            arrival_time: stop_time.arrival_time.clone(),
            departure_time: stop_time.departure_time.clone(),
            stop_lat: stop.and_then(|stop| stop.stop_lat),
            stop_lon: stop.and_then(|stop| stop.stop_lon),
            stop_known: stop.is_some(),
        }
    }
}

/// First and last visit of a trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripEndpoints {
    pub first: StopVisit,
    pub last: StopVisit,
}

impl TripEndpoints {
    pub fn from_visits(visits: &[StopVisit]) -> Option<Self> {
        Some(Self {
            first: visits.first()?.clone(),
            last: visits.last()?.clone(),
        })
    }
}

/// Mean position of the visits that carry both coordinates.
pub fn visits_centroid(visits: &[StopVisit]) -> Option<(f64, f64)> {
    let located: Vec<(f64, f64)> = visits
        .iter()
        .filter_map(|visit| Some((visit.stop_lat?, visit.stop_lon?)))
        .collect();
    if located.is_empty() {
        return None;
    }
    let count = located.len() as f64;
    let (lat_sum, lon_sum) = located
        .iter()
        .fold((0.0, 0.0), |(lat, lon), point| (lat + point.0, lon + point.1));
    Some((lat_sum / count, lon_sum / count))
}

pub fn route_label(route: &Route) -> String {
    let short = route.route_short_name.as_deref().map(str::trim).unwrap_or("");
    let long = route.route_long_name.as_deref().map(str::trim).unwrap_or("");
    match (short.is_empty(), long.is_empty()) {
        (false, false) => format!("{} — {} [{}]", short, long, route.route_id),
        (false, true) => format!("{} [{}]", short, route.route_id),
        (true, false) => format!("{} [{}]", long, route.route_id),
        (true, true) => route.route_id.clone(),
    }
}

pub fn trip_label(trip: &Trip) -> String {
    match headsign(trip) {
        Some(headsign) => format!(
            "{} — {} (service {})",
            trip.trip_id, headsign, trip.service_id
        ),
        None => format!("{} (service {})", trip.trip_id, trip.service_id),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOption {
    pub route_id: String,
    pub label: String,
}

/// Every route of the feed with its display label, in file order.
pub fn route_options(feed: &GtfsFeed) -> Vec<RouteOption> {
    feed.route_rows()
        .iter()
        .map(|route| RouteOption {
            route_id: route.route_id.clone(),
            label: route_label(route),
        })
        .collect()
}

/// The route -> direction -> trip -> stops chain over one loaded feed.
///
/// Lookups are indexed once at construction. Queries never modify the feed.
#[derive(Debug)]
pub struct TripSelector<'a> {
    feed: &'a GtfsFeed,
    routes_by_id: FxHashMap<&'a str, &'a Route>,
    trips_by_id: FxHashMap<&'a str, &'a Trip>,
    stops_by_id: FxHashMap<&'a str, &'a Stop>,
    stop_times_by_trip: FxHashMap<&'a str, Vec<&'a StopTime>>,
    shapes_by_id: FxHashMap<&'a str, Vec<&'a Shape>>,
}

impl<'a> TripSelector<'a> {
    pub fn new(feed: &'a GtfsFeed) -> Result<Self, DerivationError> {
        feed.ensure_required_tables()?;

        let mut routes_by_id = FxHashMap::default();
        for route in feed.route_rows() {
            routes_by_id.entry(route.route_id.as_str()).or_insert(route);
        }
        let mut trips_by_id = FxHashMap::default();
        for trip in feed.trip_rows() {
            trips_by_id.entry(trip.trip_id.as_str()).or_insert(trip);
        }
        let mut stops_by_id = FxHashMap::default();
        for stop in feed.stop_rows() {
            stops_by_id.entry(stop.stop_id.as_str()).or_insert(stop);
        }
        let mut stop_times_by_trip: FxHashMap<&str, Vec<&StopTime>> = FxHashMap::default();
        for stop_time in feed.stop_time_rows() {
            stop_times_by_trip
                .entry(stop_time.trip_id.as_str())
                .or_default()
                .push(stop_time);
        }
        let mut shapes_by_id: FxHashMap<&str, Vec<&Shape>> = FxHashMap::default();
        for point in feed.shape_rows() {
            shapes_by_id
                .entry(point.shape_id.as_str())
                .or_default()
                .push(point);
        }

        Ok(Self {
            feed,
            routes_by_id,
            trips_by_id,
            stops_by_id,
            stop_times_by_trip,
            shapes_by_id,
        })
    }

    pub fn feed(&self) -> &'a GtfsFeed {
        self.feed
    }

    pub fn route(&self, route_id: &str) -> Result<&'a Route, DerivationError> {
        self.routes_by_id
            .get(route_id)
            .copied()
            .ok_or_else(|| DerivationError::UnknownRoute(route_id.to_string()))
    }

    pub fn trip(&self, trip_id: &str) -> Result<&'a Trip, DerivationError> {
        self.trips_by_id
            .get(trip_id)
            .copied()
            .ok_or_else(|| DerivationError::UnknownTrip(trip_id.to_string()))
    }

    /// Trips whose route reference equals `route_id`, in file order.
    pub fn trips_for_route(&self, route_id: &str) -> Vec<&'a Trip> {
        self.feed
            .trip_rows()
            .iter()
            .filter(|trip| trip.route_id == route_id)
            .collect()
    }

    /// Like [`trips_for_route`](Self::trips_for_route), restricted to trips
    /// whose service runs on `date`.
    pub fn trips_for_route_on(
        &self,
        route_id: &str,
        calendar: &ServiceCalendar<'_>,
        date: chrono::NaiveDate,
    ) -> Vec<&'a Trip> {
        let active = calendar.active_services(date);
        self.trips_for_route(route_id)
            .into_iter()
            .filter(|trip| active.contains(&trip.service_id))
            .collect()
    }

    pub fn directions_for_route(&self, route_id: &str) -> BTreeMap<DirectionKey, Vec<&'a Trip>> {
        partition_by_direction(&self.trips_for_route(route_id))
    }

    /// Stop times of the trip left-joined to stops and put in visiting order.
    pub fn ordered_stops(&self, trip_id: &str) -> Result<Vec<StopVisit>, DerivationError> {
        let trip = self.trip(trip_id)?;
        let mut stop_times: Vec<&StopTime> = self
            .stop_times_by_trip
            .get(trip.trip_id.as_str())
            .cloned()
            .unwrap_or_default();
        stop_times.sort_by(|a, b| visit_order(a, b));
        Ok(stop_times
            .into_iter()
            .map(|stop_time| {
                let stop = self.stops_by_id.get(stop_time.stop_id.as_str()).copied();
                StopVisit::from_stop_time(stop_time, stop)
            })
            .collect())
    }

    /// The trip's shape as `(lat, lon)` pairs in point order. Empty when the
    /// feed has no shapes or the trip has no shape reference.
    pub fn shape_for(&self, trip_id: &str) -> Result<Vec<(f64, f64)>, DerivationError> {
        let trip = self.trip(trip_id)?;
        let Some(points) = trip
            .shape_id
            .as_deref()
            .and_then(|shape_id| self.shapes_by_id.get(shape_id))
        else {
            return Ok(Vec::new());
        };
        let mut points: Vec<&Shape> = points
            .iter()
            .copied()
            .filter(|point| point.shape_pt_lat.is_some() && point.shape_pt_lon.is_some())
            .collect();
        points.sort_by(|a, b| missing_last(a.shape_pt_sequence, b.shape_pt_sequence));
        Ok(points
            .into_iter()
            .filter_map(|point| Some((point.shape_pt_lat?, point.shape_pt_lon?)))
            .collect())
    }
}

/// Sequence first, then arrival, then departure. Missing values sort after
/// present ones; the sort is stable so full ties keep file order.
fn visit_order(a: &StopTime, b: &StopTime) -> Ordering {
    missing_last(a.stop_sequence, b.stop_sequence)
        .then_with(|| missing_last::<GtfsTime>(a.arrival(), b.arrival()))
        .then_with(|| missing_last::<GtfsTime>(a.departure(), b.departure()))
}

fn missing_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
