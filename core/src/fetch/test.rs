use super::*;
use crate::model::Definition;
use ruc::*;

const T0: i64 = 920_804_400;

fn two_archive_db(name: &str) -> Database {
    let mut def = pnk!(Definition::new(name, 10));
    def.set_start(T0);
    pnk!(def.add_ds_str("DS:load:GAUGE:30:U:U"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:1:100"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:10:100"));
    let mut db = pnk!(Database::create_named(&def));
    for k in 1..=20 {
        pnk!(db.update_from_str(&format!("{}:{}", T0 + 10 * k, k)));
    }
    db
}

#[test]
fn resolution_picks_among_full_matches() {
    let name = format!("fetch_res_{}", rand::random::<u64>());
    let db = two_archive_db(&name);

    let fine = pnk!(db.fetch(&FetchRequest::new(
        ConsolidationFn::Average,
        T0 + 100,
        T0 + 200
    )));
    assert_eq!(10, fine.step);

    let coarse = pnk!(db.fetch(
        &FetchRequest::new(ConsolidationFn::Average, T0 + 100, T0 + 200)
            .with_resolution(100)
    ));
    assert_eq!(100, coarse.step);
}

#[test]
fn rows_and_timestamps_line_up() {
    let name = format!("fetch_rows_{}", rand::random::<u64>());
    let db = two_archive_db(&name);

    let r = pnk!(db.fetch(&FetchRequest::new(
        ConsolidationFn::Average,
        T0 + 105,
        T0 + 155
    )));
    // snapped to [T0+100, T0+160]
    assert_eq!(7, r.rows());
    assert_eq!(T0 + 100, r.timestamps[0]);
    assert_eq!(T0 + 160, r.timestamps[6]);
    let col = r.column("load").unwrap();
    // row at T0+110 carries the sample of window (T0+100, T0+110]
    assert_eq!(11.0, col[1]);
    assert_eq!(16.0, col[6]);
}

#[test]
fn uncovered_positions_are_nan() {
    let name = format!("fetch_nan_{}", rand::random::<u64>());
    let db = two_archive_db(&name);

    // beyond the newest consolidated row
    let r = pnk!(db.fetch(&FetchRequest::new(
        ConsolidationFn::Average,
        T0 + 150,
        T0 + 400
    )));
    let col = r.column("load").unwrap();
    assert_eq!(20.0, col[5]); // T0+200, the newest known row
    assert!(col[6].is_nan());
    assert!(col.last().unwrap().is_nan());
}

#[test]
fn full_coverage_beats_partial() {
    let name = format!("fetch_full_{}", rand::random::<u64>());
    let db = two_archive_db(&name);

    // only the coarse archive reaches back this far
    let r = pnk!(db.fetch(&FetchRequest::new(
        ConsolidationFn::Average,
        T0 - 900,
        T0 + 150
    )));
    assert_eq!(100, r.step);
}

#[test]
fn widest_overlap_wins_among_partials() {
    let name = format!("fetch_part_{}", rand::random::<u64>());
    let db = two_archive_db(&name);

    // nothing covers the whole window, the coarse archive overlaps most
    let r = pnk!(db.fetch(&FetchRequest::new(
        ConsolidationFn::Average,
        T0 - 20_000,
        T0 + 150
    )));
    assert_eq!(100, r.step);
}

#[test]
fn missing_cf_is_an_error() {
    let name = format!("fetch_cf_{}", rand::random::<u64>());
    let db = two_archive_db(&name);
    let e = db
        .fetch(&FetchRequest::new(ConsolidationFn::Max, T0, T0 + 100))
        .err()
        .map(|e| e.to_string())
        .unwrap();
    assert!(e.contains("NoMatchingArchive"), "{e}");
}

#[test]
fn bad_windows_are_rejected() {
    let name = format!("fetch_bad_{}", rand::random::<u64>());
    let db = two_archive_db(&name);
    assert!(db
        .fetch(&FetchRequest::new(ConsolidationFn::Average, T0 + 100, T0 + 100))
        .is_err());
    assert!(db
        .fetch(&FetchRequest::new(ConsolidationFn::Average, T0 + 200, T0 + 100))
        .is_err());
    assert!(db
        .fetch(
            &FetchRequest::new(ConsolidationFn::Average, T0, T0 + 100)
                .with_resolution(0)
        )
        .is_err());
}

#[test]
fn filters_select_columns() {
    let name = format!("fetch_filter_{}", rand::random::<u64>());
    let mut def = pnk!(Definition::new(&name, 10));
    def.set_start(T0);
    pnk!(def.add_ds_str("DS:in:GAUGE:30:U:U"));
    pnk!(def.add_ds_str("DS:out:GAUGE:30:U:U"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:1:100"));
    let mut db = pnk!(Database::create_named(&def));
    pnk!(db.update_from_str(&format!("{}:1:2", T0 + 10)));

    let r = pnk!(db.fetch(
        &FetchRequest::new(ConsolidationFn::Average, T0, T0 + 10).with_filter(&["out"])
    ));
    assert_eq!(vec!["out".to_owned()], r.names);
    assert_eq!(Some(2.0), r.value(1, "out"));
    assert!(r.column("in").is_none());

    assert!(db
        .fetch(
            &FetchRequest::new(ConsolidationFn::Average, T0, T0 + 10)
                .with_filter(&["nope"])
        )
        .is_err());
}
