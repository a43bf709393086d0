use crate::db::Database;
use crate::model::Definition;
use ruc::*;

const T0: i64 = 920_804_400;

fn sample_db(name: &str) -> Database {
    let mut def = pnk!(Definition::new(name, 10));
    def.set_start(T0);
    pnk!(def.add_ds_str("DS:load:GAUGE:30:0:100"));
    pnk!(def.add_ds_str("DS:pkts:COUNTER:60:U:U"));
    pnk!(def.add_archive_str("RRA:AVERAGE:0.5:1:5"));
    pnk!(def.add_archive_str("RRA:MAX:0.5:2:3"));
    let mut db = pnk!(Database::create_named(&def));
    for k in 1..=4 {
        pnk!(db.update_from_str(&format!("{}:{}:{}", T0 + 10 * k, k, 100 * k)));
    }
    // leave a partial window behind as well
    pnk!(db.update_from_str(&format!("{}:7:U", T0 + 45)));
    db
}

#[test]
fn dump_covers_the_whole_database() {
    let name = format!("xml_dump_{}", rand::random::<u64>());
    let db = sample_db(&name);
    let xml = pnk!(db.to_xml());

    for needle in [
        "<rrd>",
        "<version>0003</version>",
        "<step>10</step>",
        &format!("<lastupdate>{}</lastupdate>", T0 + 45),
        "<name>load</name>",
        "<type>COUNTER</type>",
        "<minimal_heartbeat>30</minimal_heartbeat>",
        "<min>0</min>",
        "<max>NaN</max>",
        "<cf>MAX</cf>",
        "<pdp_per_row>2</pdp_per_row>",
        "<xff>0.5</xff>",
        "<unknown_datapoints>",
        "<database>",
        "<row>",
        "<v>NaN</v>",
    ] {
        assert!(xml.contains(needle), "missing {needle} in dump");
    }
}

#[test]
fn roundtrip_is_pointwise_exact() {
    let name = format!("xml_rt_{}", rand::random::<u64>());
    let db = sample_db(&name);
    let xml = pnk!(db.to_xml());

    let copy_name = format!("{name}_copy");
    let copy = pnk!(Database::import_named(&copy_name, &xml));

    assert_eq!(db.step(), copy.step());
    assert_eq!(db.ds_count(), copy.ds_count());
    assert_eq!(db.arc_count(), copy.arc_count());
    assert_eq!(pnk!(db.last_update()), pnk!(copy.last_update()));
    assert_eq!(pnk!(db.ds_names()), pnk!(copy.ds_names()));

    for idx in 0..db.arc_count() {
        assert_eq!(pnk!(db.arc_step(idx)), pnk!(copy.arc_step(idx)));
        assert_eq!(pnk!(db.arc_cf(idx)), pnk!(copy.arc_cf(idx)));
        let rows = pnk!(db.arc_rows(idx));
        assert_eq!(rows, pnk!(copy.arc_rows(idx)));
        for ds in 0..db.ds_count() {
            for nth in 1..=rows {
                let a = pnk!(db.tail_value(idx, ds, nth));
                let b = pnk!(copy.tail_value(idx, ds, nth));
                assert!(
                    a == b || (a.is_nan() && b.is_nan()),
                    "archive {idx} ds {ds} row -{nth}: {a} vs {b}"
                );
            }
        }
    }

    // and the copy dumps to the very same document
    assert_eq!(xml, pnk!(copy.to_xml()));
}

#[test]
fn malformed_dumps_are_rejected() {
    assert!(Database::import_named("xml_bad_1", "<rrd>").is_err());
    let e = Database::import_named("xml_bad_2", "<html></html>")
        .err()
        .map(|e| e.to_string())
        .unwrap();
    assert!(e.contains("XmlError"), "{e}");
    assert!(Database::import_named("xml_bad_3", "not xml at all").is_err());

    let name = format!("xml_bad_src_{}", rand::random::<u64>());
    let db = sample_db(&name);
    let xml = pnk!(db.to_xml());

    // drop one ring value: the row width no longer matches
    let broken = xml.replacen("<v>NaN</v>", "", 1);
    let e = Database::import_named("xml_bad_4", &broken)
        .err()
        .map(|e| e.to_string())
        .unwrap();
    assert!(e.contains("XmlError"), "{e}");

    let broken = xml.replace("<version>0003</version>", "<version>9999</version>");
    let e = Database::import_named("xml_bad_5", &broken)
        .err()
        .map(|e| e.to_string())
        .unwrap();
    assert!(e.contains("UnsupportedVersion"), "{e}");

    let broken = xml.replace("<step>10</step>", "<step>x</step>");
    assert!(Database::import_named("xml_bad_6", &broken).is_err());
}
