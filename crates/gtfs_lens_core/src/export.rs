use std::io::Write;

use serde::Serialize;

use crate::StopVisit;

#[derive(Serialize)]
struct StopVisitRow<'a> {
    stop_sequence: Option<u32>,
    stop_id: &'a str,
    stop_name: Option<&'a str>,
    arrival_time: Option<&'a str>,
    stop_lat: Option<f64>,
    stop_lon: Option<f64>,
}

/// Writes the displayed stop columns of a trip as CSV. Missing values are
/// written as empty cells.
pub fn write_stop_visits_csv<W: Write>(visits: &[StopVisit], writer: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for visit in visits {
        writer.serialize(StopVisitRow {
            stop_sequence: visit.stop_sequence,
            stop_id: &visit.stop_id,
            stop_name: visit.stop_name.as_deref(),
            arrival_time: visit.arrival_time.as_deref(),
            stop_lat: visit.stop_lat,
            stop_lon: visit.stop_lon,
        })?;
    }
    if visits.is_empty() {
        writer.write_record([
            "stop_sequence",
            "stop_id",
            "stop_name",
            "arrival_time",
            "stop_lat",
            "stop_lon",
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn stop_visits_csv_file_name(trip_id: &str) -> String {
    format!("stops_{}.csv", trip_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_display_columns() {
        let visits = vec![
            StopVisit {
                stop_sequence: Some(1),
                stop_id: "S1".into(),
                stop_name: Some("Main, North".into()),
                arrival_time: Some("08:00:00".into()),
                departure_time: Some("08:01:00".into()),
                stop_lat: Some(45.5),
                stop_lon: Some(-73.25),
                stop_known: true,
            },
            StopVisit {
                stop_sequence: Some(2),
                stop_id: "GHOST".into(),
                stop_name: None,
                arrival_time: None,
                departure_time: None,
                stop_lat: None,
                stop_lon: None,
                stop_known: false,
            },
        ];
        let mut out = Vec::new();
        write_stop_visits_csv(&visits, &mut out).expect("write csv");

        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(
            text,
            "stop_sequence,stop_id,stop_name,arrival_time,stop_lat,stop_lon\n\
             1,S1,\"Main, North\",08:00:00,45.5,-73.25\n\
             2,GHOST,,,,\n"
        );
    }

    #[test]
    fn writes_header_for_empty_trip() {
        let mut out = Vec::new();
        write_stop_visits_csv(&[], &mut out).expect("write csv");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "stop_sequence,stop_id,stop_name,arrival_time,stop_lat,stop_lon\n"
        );
        assert_eq!(stop_visits_csv_file_name("T1"), "stops_T1.csv");
    }
}
