//! Create, populate, dump, restore; the restored file must answer
//! queries exactly like the original.

use rrdb_core::{ConsolidationFn, Database, Definition, FetchRequest, OpenMode};
use ruc::*;
use std::fs;

const T0: i64 = 1_000_000_000;

fn scratch_dir() -> String {
    let dir = format!("/tmp/rrdb_testing/{}", rand::random::<u64>());
    pnk!(fs::create_dir_all(&dir));
    dir
}

#[test]
fn dump_and_restore_answer_alike() {
    let dir = scratch_dir();
    let path = format!("{dir}/orig.rrd");
    let copy_path = format!("{dir}/copy.rrd");

    let mut def = pnk!(Definition::new(&path, 60));
    def.set_start(T0);
    pnk!(def.add_ds_str("DS:temp:GAUGE:120:-50:50"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:1:60"));
    pnk!(def.add_archive_str("RRA:MIN:0.5:5:12"));
    pnk!(def.add_archive_str("RRA:MAX:0.5:5:12"));
    let mut db = pnk!(Database::create(&def));

    for k in 1..=30 {
        let v = (k % 7) as f64 - 3.0;
        pnk!(db.update_from_str(&format!("{}:{}", T0 + 60 * k, v)));
    }
    pnk!(db.close());

    let db = pnk!(Database::open(&path, OpenMode::ReadOnly));
    let xml = pnk!(db.to_xml());
    let copy = pnk!(Database::import(&copy_path, &xml));

    for (cf, resolution) in [
        (ConsolidationFn::Average, 60),
        (ConsolidationFn::Min, 300),
        (ConsolidationFn::Max, 300),
    ] {
        let req =
            FetchRequest::new(cf, T0, T0 + 1800).with_resolution(resolution);
        let a = pnk!(db.fetch(&req));
        let b = pnk!(copy.fetch(&req));
        assert_eq!(a.step, b.step);
        assert_eq!(a.timestamps, b.timestamps);
        let (ca, cb) = (a.column("temp").unwrap(), b.column("temp").unwrap());
        for i in 0..ca.len() {
            assert!(
                ca[i] == cb[i] || (ca[i].is_nan() && cb[i].is_nan()),
                "{cf} row {i}: {} vs {}",
                ca[i],
                cb[i]
            );
        }
    }

    // the restored file is a regular database, updates keep working
    let mut copy = pnk!(Database::open(&copy_path, OpenMode::ReadWrite));
    pnk!(copy.update_from_str(&format!("{}:1.5", T0 + 60 * 31)));
    assert_eq!(1.5, pnk!(copy.tail_value(0, 0, 1)));
}
