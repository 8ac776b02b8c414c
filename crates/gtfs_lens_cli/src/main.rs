use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gtfs_lens_core::{
    canonical_id, default_runner, parse_service_date, route_label, route_options,
    stop_visits_csv_file_name,
    trip_label, visits_centroid, write_stop_visits_csv, Anomaly, AnomalySeverity,
    ArchiveSession, DerivationError, DirectionKey, GtfsInput, LoadedArchive, TripEndpoints,
};

#[derive(Debug, Parser)]
#[command(name = "gtfs-lens")]
#[command(about = "Validate and explore a GTFS archive")]
struct Args {
    /// GTFS zip archive or directory of extracted .txt files
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the integrity checks and print every anomaly
    Validate {
        #[arg(long)]
        json: bool,
        #[arg(short = 'p', long)]
        pretty: bool,
    },
    /// List routes with their display labels
    Routes,
    /// Group a route's trips by direction
    Directions {
        #[arg(short = 'r', long)]
        route: String,
    },
    /// List a route's trips, optionally narrowed by direction and service date
    Trips {
        #[arg(short = 'r', long)]
        route: String,
        /// `0`, `1`, a headsign, `all` or `unassigned`
        #[arg(long)]
        direction: Option<String>,
        /// YYYY-MM-DD or YYYYMMDD
        #[arg(short = 'd', long)]
        date: Option<String>,
    },
    /// Print a trip's ordered stops
    Stops {
        #[arg(short = 't', long)]
        trip: String,
        /// Also write the stop table as CSV (file, or directory for stops_<trip>.csv)
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Print a trip's shape points
    Shape {
        #[arg(short = 't', long)]
        trip: String,
    },
    /// List service ids active on a date
    Services {
        #[arg(short = 'd', long)]
        date: String,
    },
}

const EXIT_BLOCKING_ANOMALIES: u8 = 1;
const EXIT_DERIVATION_BLOCKED: u8 = 2;

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let input = GtfsInput::from_path(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    info!("input {} detected", input.source());
    let session = ArchiveSession::open(&input)
        .with_context(|| format!("cannot load {}", args.input.display()))?;
    let Some(archive) = session.snapshot() else {
        bail!("no archive loaded");
    };

    let result = match &args.command {
        Command::Validate { json, pretty } => return run_validate(&session, *json, *pretty),
        Command::Routes => run_routes(&archive),
        Command::Directions { route } => run_directions(&archive, route),
        Command::Trips {
            route,
            direction,
            date,
        } => run_trips(&archive, route, direction.as_deref(), date.as_deref()),
        Command::Stops { trip, csv } => run_stops(&archive, trip, csv.as_deref()),
        Command::Shape { trip } => run_shape(&archive, trip),
        Command::Services { date } => run_services(&archive, date),
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => match err.downcast_ref::<DerivationError>() {
            Some(blocked) => {
                eprintln!("error: {}", blocked);
                Ok(ExitCode::from(EXIT_DERIVATION_BLOCKED))
            }
            None => Err(err),
        },
    }
}

fn run_validate(session: &ArchiveSession, json: bool, pretty: bool) -> anyhow::Result<ExitCode> {
    let Some(report) = session.validate(&default_runner()) else {
        bail!("no archive loaded");
    };

    if json {
        let output = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{}", output);
    } else {
        if let Some(archive) = session.snapshot() {
            let statuses: Vec<String> = archive
                .table_statuses
                .iter()
                .map(|(relation, status)| format!("{}={}", relation, status.as_str()))
                .collect();
            println!("tables: {}", statuses.join(" "));
        }
        for anomaly in report.iter() {
            println!("{}", format_anomaly(anomaly));
        }
        println!(
            "{} critical, {} error(s), {} warning(s)",
            report.count_by_severity(AnomalySeverity::Critical),
            report.count_by_severity(AnomalySeverity::Error),
            report.count_by_severity(AnomalySeverity::Warning)
        );
    }

    if report.has_blocking() {
        Ok(ExitCode::from(EXIT_BLOCKING_ANOMALIES))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn format_anomaly(anomaly: &Anomaly) -> String {
    match anomaly.count {
        Some(count) => format!(
            "[{}] {} ({}, count {}): {}",
            anomaly.severity.as_str(),
            anomaly.relation,
            anomaly.code,
            count,
            anomaly.message
        ),
        None => format!(
            "[{}] {} ({}): {}",
            anomaly.severity.as_str(),
            anomaly.relation,
            anomaly.code,
            anomaly.message
        ),
    }
}

fn run_routes(archive: &LoadedArchive) -> anyhow::Result<()> {
    archive.feed.ensure_required_tables()?;
    for option in route_options(&archive.feed) {
        println!("{}\t{}", option.route_id, option.label);
    }
    Ok(())
}

fn run_directions(archive: &LoadedArchive, route_id: &str) -> anyhow::Result<()> {
    let route_id = canonical_id(route_id);
    let selector = archive.selector()?;
    let route = selector.route(&route_id)?;
    println!("{}", route_label(route));
    for (key, trips) in selector.directions_for_route(&route_id) {
        println!("  {} ({} trip(s))", key, trips.len());
    }
    Ok(())
}

fn run_trips(
    archive: &LoadedArchive,
    route_id: &str,
    direction: Option<&str>,
    date: Option<&str>,
) -> anyhow::Result<()> {
    let route_id = canonical_id(route_id);
    let selector = archive.selector()?;
    selector.route(&route_id)?;

    let trips = match date {
        Some(value) => {
            let date = parse_date(value)?;
            let calendar = archive.service_calendar()?;
            selector.trips_for_route_on(&route_id, &calendar, date)
        }
        None => selector.trips_for_route(&route_id),
    };

    let groups = gtfs_lens_core::partition_by_direction(&trips);
    let mut listed = 0usize;
    for (key, trips) in &groups {
        if let Some(wanted) = direction {
            if !direction_matches(key, wanted) {
                continue;
            }
        }
        println!("{}", key);
        for trip in trips {
            println!("  {}", trip_label(trip));
            listed += 1;
        }
    }
    if listed == 0 {
        warn!("no trips for route {} with the given filters", route_id);
    }
    Ok(())
}

fn direction_matches(key: &DirectionKey, wanted: &str) -> bool {
    let wanted = wanted.trim();
    match key {
        DirectionKey::Direction(value) => wanted == value.to_string(),
        DirectionKey::Headsign(headsign) => headsign == wanted,
        DirectionKey::All => wanted.eq_ignore_ascii_case("all"),
        DirectionKey::Unassigned => wanted.eq_ignore_ascii_case("unassigned"),
    }
}

fn run_stops(archive: &LoadedArchive, trip_id: &str, csv: Option<&Path>) -> anyhow::Result<()> {
    let trip_id = canonical_id(trip_id);
    let selector = archive.selector()?;
    let visits = selector.ordered_stops(&trip_id)?;

    println!("stop_sequence\tstop_id\tstop_name\tarrival_time\tstop_lat\tstop_lon");
    for visit in &visits {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            display(visit.stop_sequence),
            visit.stop_id,
            visit.stop_name.as_deref().unwrap_or(""),
            visit.arrival_time.as_deref().unwrap_or(""),
            display(visit.stop_lat),
            display(visit.stop_lon)
        );
    }
    if let Some(endpoints) = TripEndpoints::from_visits(&visits) {
        println!(
            "from {} ({}) to {} ({})",
            endpoints.first.stop_name.as_deref().unwrap_or(&endpoints.first.stop_id),
            endpoints.first.arrival_time.as_deref().unwrap_or("?"),
            endpoints.last.stop_name.as_deref().unwrap_or(&endpoints.last.stop_id),
            endpoints.last.arrival_time.as_deref().unwrap_or("?")
        );
    }
    if let Some((lat, lon)) = visits_centroid(&visits) {
        println!("centroid {:.6},{:.6}", lat, lon);
    }

    if let Some(path) = csv {
        let path = if path.is_dir() {
            path.join(stop_visits_csv_file_name(&trip_id))
        } else {
            path.to_path_buf()
        };
        let file = File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        write_stop_visits_csv(&visits, BufWriter::new(file))
            .with_context(|| format!("cannot write {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

fn run_shape(archive: &LoadedArchive, trip_id: &str) -> anyhow::Result<()> {
    let trip_id = canonical_id(trip_id);
    let selector = archive.selector()?;
    let points = selector.shape_for(&trip_id)?;
    if points.is_empty() {
        warn!("trip {} has no usable shape", trip_id);
    }
    for (lat, lon) in points {
        println!("{},{}", lat, lon);
    }
    Ok(())
}

fn run_services(archive: &LoadedArchive, value: &str) -> anyhow::Result<()> {
    let date = parse_date(value)?;
    let calendar = archive.service_calendar()?;
    for service_id in calendar.active_services(date) {
        println!("{}", service_id);
    }
    Ok(())
}

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    if value.trim().is_empty() {
        bail!("--date cannot be empty");
    }
    parse_service_date(value).with_context(|| format!("invalid --date {}", value))
}

fn display<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_lens_core::model::{Agency, Route, Stop, StopTime, Trip};
    use gtfs_lens_core::{CsvTable, GtfsFeed};

    fn archive() -> LoadedArchive {
        let feed = GtfsFeed {
            agency: Some(CsvTable::from_rows(&["agency_name"], vec![Agency::default()])),
            stops: Some(CsvTable::from_rows(
                &["stop_id"],
                vec![Stop {
                    stop_id: "7".into(),
                    ..Stop::default()
                }],
            )),
            routes: Some(CsvTable::from_rows(
                &["route_id"],
                vec![Route {
                    route_id: "10".into(),
                    ..Route::default()
                }],
            )),
            trips: Some(CsvTable::from_rows(
                &["route_id", "service_id", "trip_id"],
                vec![Trip {
                    route_id: "10".into(),
                    service_id: "WK".into(),
                    trip_id: "55".into(),
                    ..Trip::default()
                }],
            )),
            stop_times: Some(CsvTable::from_rows(
                &["trip_id", "stop_id"],
                vec![StopTime {
                    trip_id: "55".into(),
                    stop_id: "7".into(),
                    ..StopTime::default()
                }],
            )),
            ..GtfsFeed::default()
        };
        LoadedArchive {
            feed,
            ..LoadedArchive::default()
        }
    }

    #[test]
    fn float_spelled_ids_match_normalized_feed() {
        let archive = archive();
        assert!(run_directions(&archive, "10.0").is_ok());
        assert!(run_trips(&archive, " 10.0 ", None, None).is_ok());
        assert!(run_stops(&archive, "55.0", None).is_ok());
        assert!(run_shape(&archive, "55").is_ok());
    }

    #[test]
    fn unknown_route_is_a_derivation_error() {
        let err = run_directions(&archive(), "11").unwrap_err();
        assert_eq!(
            err.downcast_ref::<DerivationError>(),
            Some(&DerivationError::UnknownRoute("11".into()))
        );
    }

    #[test]
    fn matches_direction_filters() {
        assert!(direction_matches(&DirectionKey::Direction(1), " 1 "));
        assert!(direction_matches(&DirectionKey::All, "ALL"));
        assert!(!direction_matches(&DirectionKey::Headsign("North".into()), "South"));
    }
}
