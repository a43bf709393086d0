//! The classic counter walkthrough: one COUNTER source sampled every
//! five minutes, consolidated at one- and six-step resolutions.

use rrdb_core::{ConsolidationFn, Database, Definition, FetchRequest, OpenMode};
use ruc::*;
use std::fs;

const T0: i64 = 920_804_400;

fn scratch_path() -> String {
    let dir = format!("/tmp/rrdb_testing/{}", rand::random::<u64>());
    pnk!(fs::create_dir_all(&dir));
    format!("{dir}/speed.rrd")
}

fn close_to(want: f64, got: f64) -> bool {
    (want - got).abs() < 1e-4
}

#[test]
fn counter_tutorial() {
    let path = scratch_path();

    let mut def = pnk!(Definition::new(&path, 300));
    def.set_start(T0);
    pnk!(def.add_ds_str("DS:speed:COUNTER:600:U:U"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:1:24"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:6:10"));
    let mut db = pnk!(Database::create(&def));

    let readings = [
        12345, 12357, 12363, 12363, 12363, 12373, 12383, 12393, 12399, 12405,
        12411, 12415, 12420, 12422, 12423,
    ];
    for (k, v) in readings.iter().enumerate() {
        pnk!(db.update_from_str(&format!("{}:{}", T0 + 300 * (k as i64 + 1), v)));
    }
    pnk!(db.close());

    let db = pnk!(Database::open(&path, OpenMode::ReadOnly));
    let r = pnk!(db.fetch(&FetchRequest::new(
        ConsolidationFn::Average,
        T0,
        T0 + 4800
    )));

    assert_eq!(17, r.rows());
    assert_eq!(300, r.step);
    assert_eq!(T0, r.timestamps[0]);
    assert_eq!(T0 + 4800, r.timestamps[16]);

    let col = r.column("speed").unwrap();
    let want = [
        f64::NAN,
        f64::NAN,
        0.04,
        0.02,
        0.0,
        0.0,
        0.03333,
        0.03333,
        0.03333,
        0.02,
        0.02,
        0.02,
        0.01333,
        0.01667,
        0.00667,
        0.00333,
        f64::NAN,
    ];
    for (i, w) in want.iter().enumerate() {
        if w.is_nan() {
            assert!(col[i].is_nan(), "row {i}: expected NaN, got {}", col[i]);
        } else {
            assert!(close_to(*w, col[i]), "row {i}: expected {w}, got {}", col[i]);
        }
    }

    // the six-step archive consolidated the same data
    let coarse = pnk!(db.fetch(
        &FetchRequest::new(ConsolidationFn::Average, T0, T0 + 3600).with_resolution(1800)
    ));
    assert_eq!(1800, coarse.step);
    let col = coarse.column("speed").unwrap();
    assert!(col[0].is_nan());
    // (0.04 + 0.02 + 0 + 0 + 0.03333) / 5 known points
    assert!(close_to(0.018666, col[1]));
    assert!(close_to(0.023333, col[2]));
}
