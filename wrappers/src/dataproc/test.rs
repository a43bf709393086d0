use super::*;
use ruc::*;
use rrdb_core::Definition;
use std::fs;

const T0: i64 = 920_804_400;

fn db_path() -> String {
    let dir = format!("/tmp/rrdb_testing/{}", rand::random::<u64>());
    pnk!(fs::create_dir_all(&dir));
    format!("{dir}/dp.rrd")
}

fn make_db(path: &str) {
    let mut def = pnk!(Definition::new(path, 10));
    def.set_start(T0);
    pnk!(def.add_ds_str("DS:rate:GAUGE:30:U:U"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:1:100"));
    let mut db = pnk!(Database::create(&def));
    for k in 1..=10 {
        pnk!(db.update_from_str(&format!("{}:{}", T0 + 10 * k, k)));
    }
    pnk!(db.close());
}

#[test]
fn constants_and_expressions() {
    let mut dp = DataProcessor::new(T0, T0 + 300);
    dp.set_resolution(300);
    dp.def_constant("four", 4.0);
    dp.def_rpn("eight", "four,2,*");
    dp.def_rpn("answer", "eight,DUP,+,26,+");
    dp.def_rpn("clamped", "four,10,MIN,3,MAX");
    dp.def_rpn("cond", "four,3,GT,100,200,IF");
    dp.def_rpn("patched", "UNKN,UN,0,UNKN,IF,1,+");
    dp.def_rpn("grid", "STEP");
    let out = pnk!(dp.process());

    assert_eq!(2, out.rows());
    assert_eq!(Some(8.0), out.value(0, "eight"));
    assert_eq!(Some(42.0), out.value(1, "answer"));
    assert_eq!(Some(4.0), out.value(0, "clamped"));
    assert_eq!(Some(100.0), out.value(0, "cond"));
    assert_eq!(Some(1.0), out.value(0, "patched"));
    assert_eq!(Some(300.0), out.value(0, "grid"));
}

#[test]
fn time_prev_and_nan_propagation() {
    let mut dp = DataProcessor::new(T0, T0 + 40);
    dp.set_resolution(10);
    dp.def_rpn("t", "TIME");
    dp.def_rpn("ticks", "PREV,UN,1,PREV,1,+,IF");
    dp.def_rpn("poisoned", "UNKN,1,+");
    dp.def_rpn("infinite", "1,0,/,ISINF");
    let out = pnk!(dp.process());

    assert_eq!(5, out.rows());
    for (i, ts) in out.timestamps.iter().enumerate() {
        assert_eq!(Some(*ts as f64), out.value(i, "t"));
        assert_eq!(Some(i as f64 + 1.0), out.value(i, "ticks"));
        assert!(out.value(i, "poisoned").unwrap().is_nan());
        assert_eq!(Some(1.0), out.value(i, "infinite"));
    }
}

#[test]
fn archives_and_transforms() {
    let path = db_path();
    make_db(&path);

    let mut dp = DataProcessor::new(T0 + 10, T0 + 50);
    dp.def_archive("rate", &path, "rate", ConsolidationFn::Average);
    dp.def_step_total("amount", "rate");
    dp.def_rpn("double", "rate,2,*");
    let out = pnk!(dp.process());

    // the grid follows the only source
    assert_eq!(10, out.step);
    assert_eq!(5, out.rows());
    assert_eq!(Some(1.0), out.value(0, "rate"));
    assert_eq!(Some(5.0), out.value(4, "rate"));
    assert_eq!(Some(10.0), out.value(0, "amount"));
    assert_eq!(Some(6.0), out.value(2, "double"));
}

#[test]
fn bad_declarations_are_rejected() {
    let path = db_path();
    make_db(&path);

    let mut dp = DataProcessor::new(T0, T0 + 100);
    dp.def_rpn("x", "1,NOPE,+");
    assert!(dp.process().is_err());

    let mut dp = DataProcessor::new(T0, T0 + 100);
    dp.def_rpn("x", "1,+");
    assert!(dp.process().is_err());

    let mut dp = DataProcessor::new(T0, T0 + 100);
    dp.def_rpn("x", "1,2");
    assert!(dp.process().is_err());

    let mut dp = DataProcessor::new(T0, T0 + 100);
    dp.def_rpn("x", "missing,1,+");
    assert!(dp.process().is_err());

    let mut dp = DataProcessor::new(T0, T0 + 100);
    dp.def_constant("a", 1.0);
    dp.def_constant("a", 2.0);
    assert!(dp.process().is_err());

    let mut dp = DataProcessor::new(T0, T0 + 100);
    dp.def_archive("rate", &path, "nope", ConsolidationFn::Average);
    assert!(dp.process().is_err());

    let mut dp = DataProcessor::new(T0 + 100, T0 + 100);
    dp.def_constant("a", 1.0);
    assert!(dp.process().is_err());

    assert!(DataProcessor::new(T0, T0 + 100).process().is_err());
}
