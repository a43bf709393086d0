use super::*;
use crate::model::Definition;
use ruc::*;
use std::fs;

const T0: i64 = 920_804_400;

fn scratch_path(tag: &str) -> String {
    let dir = format!("/tmp/rrdb_testing/{}", rand::random::<u64>());
    pnk!(fs::create_dir_all(&dir));
    format!("{dir}/{tag}.rrd")
}

fn one_ds_def(path: &str) -> Definition {
    let mut def = pnk!(Definition::new(path, 10));
    def.set_start(T0);
    pnk!(def.add_ds_str("DS:load:GAUGE:30:U:U"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:1:5"));
    def
}

#[test]
fn file_database_survives_reopen() {
    let path = scratch_path("reopen");
    let mut db = pnk!(Database::create(&one_ds_def(&path)));

    let mut s = pnk!(db.create_sample(T0 + 10));
    pnk!(s.set("load", 3.5));
    pnk!(s.update());
    pnk!(db.close());

    let db = pnk!(Database::open(&path, OpenMode::ReadWrite));
    assert_eq!(10, db.step());
    assert_eq!(1, db.ds_count());
    assert_eq!(1, db.arc_count());
    assert_eq!(T0 + 10, pnk!(db.last_update()));
    assert_eq!(3.5, pnk!(db.tail_value(0, 0, 1)));
    assert_eq!(vec!["load".to_owned()], pnk!(db.ds_names()));
}

#[test]
fn closed_handles_reject_everything() {
    let path = scratch_path("closed");
    let mut db = pnk!(Database::create(&one_ds_def(&path)));
    pnk!(db.close());
    pnk!(db.close()); // idempotent

    assert!(db.is_closed());
    let e = db.last_update().err().unwrap().to_string();
    assert!(e.contains("DatabaseClosed"), "{e}");
    assert!(db.ds_names().is_err());
    assert!(db.create_sample(T0 + 10).is_err());
    assert!(db.to_xml().is_err());
}

#[test]
fn read_only_handles_reject_mutation() {
    let path = scratch_path("readonly");
    {
        let _db = pnk!(Database::create(&one_ds_def(&path)));
    }

    let mut db = pnk!(Database::open(&path, OpenMode::ReadOnly));
    let e = db.create_sample(T0 + 10).err().map(|e| e.to_string()).unwrap();
    assert!(e.contains("NotWritable"), "{e}");
    assert!(db.update_from_str(&format!("{}:1", T0 + 10)).is_err());
    // reads still fine
    assert_eq!(T0, pnk!(db.last_update()));
}

#[test]
fn memory_databases_share_a_registry() {
    let name = format!("db_registry_{}", rand::random::<u64>());
    let mut db = pnk!(Database::create_named(&one_ds_def(&name)));
    pnk!(db.update_from_str(&format!("{}:2.5", T0 + 10)));

    assert!(crate::store::MemStore::exists(&name));
    let other = pnk!(Database::open_named(&name, OpenMode::ReadOnly));
    assert_eq!(2.5, pnk!(other.tail_value(0, 0, 1)));

    assert!(crate::store::MemStore::drop_named(&name));
    assert!(Database::open_named(&name, OpenMode::ReadOnly).is_err());
}

#[test]
fn garbage_files_are_rejected() {
    let path = scratch_path("garbage");
    pnk!(fs::write(&path, b"definitely not a database"));
    let e = Database::open(&path, OpenMode::ReadOnly)
        .err()
        .map(|e| e.to_string())
        .unwrap();
    assert!(e.contains("InvalidFormat"), "{e}");

    assert!(Database::open("/nonexistent/nowhere.rrd", OpenMode::ReadOnly).is_err());
}

#[test]
fn truncated_files_are_rejected() {
    let path = scratch_path("truncated");
    {
        let _db = pnk!(Database::create(&one_ds_def(&path)));
    }
    let bytes = pnk!(fs::read(&path));
    pnk!(fs::write(&path, &bytes[..bytes.len() - 8]));
    assert!(Database::open(&path, OpenMode::ReadWrite).is_err());
}

#[test]
fn archive_windows_follow_the_last_update() {
    let name = format!("db_windows_{}", rand::random::<u64>());
    let mut def = pnk!(Definition::new(&name, 10));
    def.set_start(T0);
    pnk!(def.add_ds_str("DS:load:GAUGE:30:U:U"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:6:10"));
    let mut db = pnk!(Database::create_named(&def));

    assert_eq!(60, pnk!(db.arc_step(0)));
    assert_eq!(10, pnk!(db.arc_rows(0)));

    pnk!(db.update_from_str(&format!("{}:1", T0 + 125)));
    let end = pnk!(db.archive_end(0));
    assert_eq!(T0 + 120, end);
    assert_eq!(end - 600, pnk!(db.archive_start(0)));
}
