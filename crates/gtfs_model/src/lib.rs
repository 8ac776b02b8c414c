use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum GtfsParseError {
    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),
    #[error("invalid date value: {0}")]
    InvalidDateValue(String),
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("invalid time value: {0}")]
    InvalidTimeValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GtfsDate {
    year: i32,
    month: u8,
    day: u8,
}

impl GtfsDate {
    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        if trimmed.len() != 8 || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(GtfsParseError::InvalidDateFormat(value.to_string()));
        }

        let year: i32 = trimmed[0..4]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;
        let month: u8 = trimmed[4..6]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;
        let day: u8 = trimmed[6..8]
            .parse()
            .map_err(|_| GtfsParseError::InvalidDateFormat(value.to_string()))?;

        if NaiveDate::from_ymd_opt(year, month as u32, day as u32).is_none() {
            return Err(GtfsParseError::InvalidDateValue(value.to_string()));
        }

        Ok(Self { year, month, day })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }

    /// Always `Some` for values produced by [`GtfsDate::parse`].
    pub fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month as u32, self.day as u32)
    }
}

impl From<NaiveDate> for GtfsDate {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month() as u8,
            day: date.day() as u8,
        }
    }
}

impl fmt::Display for GtfsDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.year, self.month, self.day)
    }
}

impl Serialize for GtfsDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for GtfsDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GtfsDateVisitor;

        impl<'de> Visitor<'de> for GtfsDateVisitor {
            type Value = GtfsDate;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a GTFS date in YYYYMMDD format")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<GtfsDate, E> {
                GtfsDate::parse(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(GtfsDateVisitor)
    }
}

/// Time of the service day. Hours past 23 are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GtfsTime {
    total_seconds: i32,
}

impl GtfsTime {
    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let trimmed = value.trim();
        let parts: Vec<&str> = trimmed.split(':').collect();
        if parts.len() != 3 {
            return Err(GtfsParseError::InvalidTimeFormat(value.to_string()));
        }

        let hours: i32 = parts[0]
            .parse()
            .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?;
        let minutes: i32 = parts[1]
            .parse()
            .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?;
        let seconds: i32 = parts[2]
            .parse()
            .map_err(|_| GtfsParseError::InvalidTimeFormat(value.to_string()))?;

        if hours < 0 || !(0..=59).contains(&minutes) || !(0..=59).contains(&seconds) {
            return Err(GtfsParseError::InvalidTimeValue(value.to_string()));
        }

        let total_seconds = hours
            .checked_mul(3600)
            .and_then(|hours| hours.checked_add(minutes * 60 + seconds))
            .ok_or_else(|| GtfsParseError::InvalidTimeValue(value.to_string()))?;
        Ok(Self { total_seconds })
    }

    pub fn total_seconds(&self) -> i32 {
        self.total_seconds
    }

    pub fn hours(&self) -> i32 {
        self.total_seconds / 3600
    }

    pub fn minutes(&self) -> i32 {
        (self.total_seconds % 3600) / 60
    }

    pub fn seconds(&self) -> i32 {
        self.total_seconds % 60
    }
}

impl fmt::Display for GtfsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.seconds()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectionId {
    Direction0,
    Direction1,
}

impl DirectionId {
    pub fn from_value(value: &str) -> Option<Self> {
        match value.trim() {
            "0" => Some(DirectionId::Direction0),
            "1" => Some(DirectionId::Direction1),
            other => match other.parse::<f64>() {
                Ok(parsed) if parsed == 0.0 => Some(DirectionId::Direction0),
                Ok(parsed) if parsed == 1.0 => Some(DirectionId::Direction1),
                _ => None,
            },
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            DirectionId::Direction0 => 0,
            DirectionId::Direction1 => 1,
        }
    }
}

impl Serialize for DirectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum ServiceAvailability {
    #[default]
    Unavailable,
    Available,
}

impl<'de> Deserialize<'de> for ServiceAvailability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match lenient::unsigned(deserializer)? {
            Some(1) => ServiceAvailability::Available,
            _ => ServiceAvailability::Unavailable,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum ExceptionType {
    Added,
    Removed,
    #[default]
    Other,
}

impl<'de> Deserialize<'de> for ExceptionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match lenient::unsigned(deserializer)? {
            Some(1) => ExceptionType::Added,
            Some(2) => ExceptionType::Removed,
            _ => ExceptionType::Other,
        })
    }
}

/// Field-level deserializers that turn unparseable cells into `None`
/// instead of failing the whole row.
pub mod lenient {
    use serde::{Deserialize, Deserializer};

    use crate::{DirectionId, GtfsDate};

    fn cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()))
    }

    pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(cell(deserializer)?
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite()))
    }

    /// Accepts `"3"` as well as `"3.0"`, the way spreadsheet exports write integers.
    pub fn unsigned<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        Ok(cell(deserializer)?.and_then(|value| {
            value.parse::<u32>().ok().or_else(|| {
                value
                    .parse::<f64>()
                    .ok()
                    .filter(|parsed| parsed.fract() == 0.0 && *parsed >= 0.0)
                    .filter(|parsed| *parsed <= u32::MAX as f64)
                    .map(|parsed| parsed as u32)
            })
        }))
    }

    pub fn date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<GtfsDate>, D::Error> {
        Ok(cell(deserializer)?.and_then(|value| GtfsDate::parse(&value).ok()))
    }

    pub fn direction<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DirectionId>, D::Error> {
        Ok(cell(deserializer)?.and_then(|value| DirectionId::from_value(&value)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Agency {
    #[serde(default)]
    pub agency_id: Option<String>,
    #[serde(default)]
    pub agency_name: String,
    #[serde(default)]
    pub agency_url: String,
    #[serde(default)]
    pub agency_timezone: String,
    #[serde(default)]
    pub agency_lang: Option<String>,
    #[serde(default)]
    pub agency_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Stop {
    #[serde(default)]
    pub stop_id: String,
    #[serde(default)]
    pub stop_code: Option<String>,
    #[serde(default)]
    pub stop_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub stop_lon: Option<f64>,
    #[serde(default)]
    pub parent_station: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Route {
    #[serde(default)]
    pub route_id: String,
    #[serde(default)]
    pub agency_id: Option<String>,
    #[serde(default)]
    pub route_short_name: Option<String>,
    #[serde(default)]
    pub route_long_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub route_type: Option<u32>,
    #[serde(default)]
    pub route_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Trip {
    #[serde(default)]
    pub route_id: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub trip_id: String,
    #[serde(default)]
    pub trip_headsign: Option<String>,
    #[serde(default)]
    pub trip_short_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::direction")]
    pub direction_id: Option<DirectionId>,
    #[serde(default)]
    pub block_id: Option<String>,
    #[serde(default)]
    pub shape_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct StopTime {
    #[serde(default)]
    pub trip_id: String,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    #[serde(default)]
    pub stop_id: String,
    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub stop_sequence: Option<u32>,
    #[serde(default)]
    pub stop_headsign: Option<String>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub shape_dist_traveled: Option<f64>,
}

impl StopTime {
    pub fn arrival(&self) -> Option<GtfsTime> {
        self.arrival_time
            .as_deref()
            .and_then(|value| GtfsTime::parse(value).ok())
    }

    pub fn departure(&self) -> Option<GtfsTime> {
        self.departure_time
            .as_deref()
            .and_then(|value| GtfsTime::parse(value).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Shape {
    #[serde(default)]
    pub shape_id: String,
    #[serde(default, deserialize_with = "lenient::float")]
    pub shape_pt_lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub shape_pt_lon: Option<f64>,
    #[serde(default, deserialize_with = "lenient::unsigned")]
    pub shape_pt_sequence: Option<u32>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub shape_dist_traveled: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Calendar {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub monday: ServiceAvailability,
    #[serde(default)]
    pub tuesday: ServiceAvailability,
    #[serde(default)]
    pub wednesday: ServiceAvailability,
    #[serde(default)]
    pub thursday: ServiceAvailability,
    #[serde(default)]
    pub friday: ServiceAvailability,
    #[serde(default)]
    pub saturday: ServiceAvailability,
    #[serde(default)]
    pub sunday: ServiceAvailability,
    #[serde(default, deserialize_with = "lenient::date")]
    pub start_date: Option<GtfsDate>,
    #[serde(default, deserialize_with = "lenient::date")]
    pub end_date: Option<GtfsDate>,
}

impl Calendar {
    pub fn availability_on(&self, weekday: chrono::Weekday) -> ServiceAvailability {
        match weekday {
            chrono::Weekday::Mon => self.monday,
            chrono::Weekday::Tue => self.tuesday,
            chrono::Weekday::Wed => self.wednesday,
            chrono::Weekday::Thu => self.thursday,
            chrono::Weekday::Fri => self.friday,
            chrono::Weekday::Sat => self.saturday,
            chrono::Weekday::Sun => self.sunday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct CalendarDate {
    #[serde(default)]
    pub service_id: String,
    #[serde(default, deserialize_with = "lenient::date")]
    pub date: Option<GtfsDate>,
    #[serde(default)]
    pub exception_type: ExceptionType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gtfs_date() {
        let date = GtfsDate::parse("20240131").unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 1);
        assert_eq!(date.day(), 31);
        assert_eq!(date.to_string(), "20240131");
    }

    #[test]
    fn rejects_invalid_date() {
        assert!(GtfsDate::parse("20240230").is_err());
        assert!(GtfsDate::parse("2024-01-01").is_err());
    }

    #[test]
    fn converts_date_to_naive_and_back() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let date = GtfsDate::from(naive);
        assert_eq!(date.to_string(), "20240108");
        assert_eq!(date.to_naive(), Some(naive));
    }

    #[test]
    fn parses_gtfs_time_past_midnight() {
        let time = GtfsTime::parse("25:10:05").unwrap();
        assert_eq!(time.total_seconds(), 25 * 3600 + 10 * 60 + 5);
        assert_eq!(time.to_string(), "25:10:05");
        assert!(GtfsTime::parse("8:00:00").unwrap() < GtfsTime::parse("10:00:00").unwrap());
    }

    #[test]
    fn rejects_invalid_time() {
        assert!(GtfsTime::parse("25:99:00").is_err());
        assert!(GtfsTime::parse("bad").is_err());
    }

    #[test]
    fn rejects_hours_beyond_second_range() {
        assert!(matches!(
            GtfsTime::parse("999999:00:00"),
            Err(GtfsParseError::InvalidTimeValue(_))
        ));
        assert!(GtfsTime::parse("2147483647:00:00").is_err());
        assert!(GtfsTime::parse("596522:00:00").is_ok());
    }

    #[test]
    fn reads_direction_id_leniently() {
        assert_eq!(DirectionId::from_value("0"), Some(DirectionId::Direction0));
        assert_eq!(DirectionId::from_value(" 1.0 "), Some(DirectionId::Direction1));
        assert_eq!(DirectionId::from_value("2"), None);
        assert_eq!(DirectionId::from_value("north"), None);
    }

    #[test]
    fn degrades_unparseable_cells_to_missing() {
        let data = "stop_id,stop_name,stop_lat,stop_lon\nS1,Main,45.5,not-a-number\nS2,Side,,-73.6\n";
        let mut reader = csv::ReaderBuilder::new().from_reader(data.as_bytes());
        let stops: Vec<Stop> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("rows deserialize");

        assert_eq!(stops[0].stop_lat, Some(45.5));
        assert_eq!(stops[0].stop_lon, None);
        assert_eq!(stops[1].stop_lat, None);
        assert_eq!(stops[1].stop_lon, Some(-73.6));
    }

    #[test]
    fn missing_columns_use_defaults() {
        let data = "trip_id,route_id\nT1,R1\n";
        let mut reader = csv::ReaderBuilder::new().from_reader(data.as_bytes());
        let trips: Vec<Trip> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("rows deserialize");

        assert_eq!(trips[0].trip_id, "T1");
        assert_eq!(trips[0].service_id, "");
        assert_eq!(trips[0].direction_id, None);
    }

    #[test]
    fn reads_calendar_flags_and_exceptions() {
        let data = "service_id,monday,tuesday,start_date,end_date\nA,1, 0,20240101,2024-01-31\n";
        let mut reader = csv::ReaderBuilder::new().from_reader(data.as_bytes());
        let rows: Vec<Calendar> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("rows deserialize");

        assert_eq!(rows[0].monday, ServiceAvailability::Available);
        assert_eq!(rows[0].tuesday, ServiceAvailability::Unavailable);
        assert_eq!(rows[0].sunday, ServiceAvailability::Unavailable);
        assert_eq!(rows[0].start_date, GtfsDate::parse("20240101").ok());
        assert_eq!(rows[0].end_date, None);

        let data = "service_id,date,exception_type\nA,20240108,2\nB,20240108,1\nC,20240108,7\nD,20240108,2.0\nE,20240108,1.0\n";
        let mut reader = csv::ReaderBuilder::new().from_reader(data.as_bytes());
        let rows: Vec<CalendarDate> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("rows deserialize");
        assert_eq!(rows[0].exception_type, ExceptionType::Removed);
        assert_eq!(rows[1].exception_type, ExceptionType::Added);
        assert_eq!(rows[2].exception_type, ExceptionType::Other);
        assert_eq!(rows[3].exception_type, ExceptionType::Removed);
        assert_eq!(rows[4].exception_type, ExceptionType::Added);
    }
}
