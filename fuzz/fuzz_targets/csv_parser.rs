#![no_main]
use gtfs_lens_core::read_csv_table;
use gtfs_lens_model::{Stop, StopTime};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = read_csv_table::<Stop>("stops.txt", data);
    let _ = read_csv_table::<StopTime>("stop_times.txt", data);
});
