use super::*;
use ruc::*;

#[test]
fn ds_spec_parsing() {
    let d = pnk!(DsDef::parse("DS:speed:COUNTER:600:U:U"));
    assert_eq!("speed", d.name);
    assert_eq!(DsType::Counter, d.kind);
    assert_eq!(600, d.heartbeat);
    assert!(d.min.is_nan() && d.max.is_nan());

    let d = pnk!(DsDef::parse("DS:temp:GAUGE:120:-40:80"));
    assert_eq!(-40.0, d.min);
    assert_eq!(80.0, d.max);

    let e = DsDef::parse("DS:speed:COUNTER:600:U").err().unwrap().to_string();
    assert!(e.contains("DefinitionError"), "{e}");
    assert!(DsDef::parse("XX:speed:COUNTER:600:U:U").is_err());
    assert!(DsDef::parse("DS:speed:BOGUS:600:U:U").is_err());
    assert!(DsDef::parse("DS:speed:COUNTER:0:U:U").is_err());
    assert!(DsDef::parse("DS:speed:COUNTER:600:10:10").is_err());
    assert!(DsDef::parse("DS:speed:COUNTER:600:20:10").is_err());
    assert!(DsDef::parse("DS::COUNTER:600:U:U").is_err());
    assert!(DsDef::parse("DS:way-too-long-name-for-a-cell:GAUGE:600:U:U").is_err());
    assert!(DsDef::parse("DS:white space:GAUGE:600:U:U").is_err());
}

#[test]
fn archive_spec_parsing() {
    let a = pnk!(ArcDef::parse("RRA:AVERAGE:0.5:6:700"));
    assert_eq!(ConsolidationFn::Average, a.cf);
    assert_eq!(0.5, a.xff);
    assert_eq!(6, a.steps);
    assert_eq!(700, a.rows);

    for cf in ["MIN", "MAX", "LAST", "FIRST", "TOTAL"] {
        pnk!(ArcDef::parse(&format!("RRA:{cf}:0:1:1")));
    }

    assert!(ArcDef::parse("RRA:AVERAGE:1:6:700").is_err());
    assert!(ArcDef::parse("RRA:AVERAGE:-0.1:6:700").is_err());
    assert!(ArcDef::parse("RRA:AVERAGE:0.5:0:700").is_err());
    assert!(ArcDef::parse("RRA:AVERAGE:0.5:6:0").is_err());
    assert!(ArcDef::parse("RRA:BOGUS:0.5:6:700").is_err());
    assert!(ArcDef::parse("RRA:AVERAGE:0.5:6").is_err());
}

#[test]
fn definition_validation() {
    let mut def = pnk!(Definition::new("x", 300));
    assert!(def.validate().is_err()); // no sources

    pnk!(def.add_ds_str("DS:a:GAUGE:600:U:U"));
    assert!(def.validate().is_err()); // no archives

    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:1:24"));
    pnk!(def.validate());

    pnk!(def.add_ds_str("DS:a:COUNTER:600:U:U"));
    let e = def.validate().err().unwrap().to_string();
    assert!(e.contains("DefinitionError"), "{e}"); // duplicate name

    assert!(Definition::new("x", 0).is_err());
    assert!(Definition::new("x", -300).is_err());
}

#[test]
fn names_round_trip_through_strings() {
    for kind in [
        DsType::Gauge,
        DsType::Counter,
        DsType::Derive,
        DsType::Absolute,
    ] {
        assert_eq!(kind, pnk!(kind.as_str().parse::<DsType>()));
    }
    for cf in [
        ConsolidationFn::Average,
        ConsolidationFn::Min,
        ConsolidationFn::Max,
        ConsolidationFn::Last,
        ConsolidationFn::First,
        ConsolidationFn::Total,
    ] {
        assert_eq!(cf, pnk!(cf.as_str().parse::<ConsolidationFn>()));
    }
}
