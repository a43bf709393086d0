//!
//! # XML dump and import
//!
//! Stable textual representation of a whole database. The dump carries
//! every header, descriptor, prep and ring value; import rebuilds a
//! database from it all-or-nothing, so a malformed tree never leaves a
//! half-created store behind. NaN prints as the literal `NaN` and doubles
//! use their shortest round-tripping form, so `import(to_xml(db))` is
//! pointwise exact.
//!

#[cfg(test)]
mod test;

use crate::common::{VERSION_1, VERSION_3};
use crate::db::Database;
use crate::model::{ArcDef, ConsolidationFn, Definition, DsDef, DsType};
use crate::store::{ByteStore, FileStore, MemStore};
use ruc::*;
use std::io::Write;
use xml::reader::{EventReader, XmlEvent as REvent};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent as WEvent};

impl Database {
    /// Dump the whole database as UTF-8 XML.
    pub fn to_xml(&self) -> Result<String> {
        self.guard_readable().c(d!())?;
        let sto = &*self.store;

        let mut buf: Vec<u8> = Vec::new();
        let mut w = EmitterConfig::new()
            .perform_indent(true)
            .create_writer(&mut buf);

        start(&mut w, "rrd").c(d!())?;
        tag(&mut w, "version", &self.schema.version).c(d!())?;
        tag(&mut w, "step", &self.step.to_string()).c(d!())?;
        let lut = self.schema.header.last_update.get(sto).c(d!())?;
        tag(&mut w, "lastupdate", &lut.to_string()).c(d!())?;

        for src in self.schema.sources.iter() {
            start(&mut w, "ds").c(d!())?;
            tag(&mut w, "name", &src.name.get(sto).c(d!())?).c(d!())?;
            tag(&mut w, "type", &src.kind.get(sto).c(d!())?).c(d!())?;
            tag(
                &mut w,
                "minimal_heartbeat",
                &src.heartbeat.get(sto).c(d!())?.to_string(),
            )
            .c(d!())?;
            tag(&mut w, "min", &fmt_f64(src.min.get(sto).c(d!())?)).c(d!())?;
            tag(&mut w, "max", &fmt_f64(src.max.get(sto).c(d!())?)).c(d!())?;
            tag(&mut w, "last_ds", &src.last_ds.get(sto).c(d!())?).c(d!())?;
            tag(&mut w, "value", &fmt_f64(src.scratch.get(sto).c(d!())?)).c(d!())?;
            tag(
                &mut w,
                "unknown_sec",
                &src.unknown_sec.get(sto).c(d!())?.to_string(),
            )
            .c(d!())?;
            end(&mut w).c(d!())?;
        }

        for arc in self.schema.archives.iter() {
            start(&mut w, "rra").c(d!())?;
            tag(&mut w, "cf", &arc.cf.get(sto).c(d!())?).c(d!())?;
            tag(
                &mut w,
                "pdp_per_row",
                &arc.pdp_per_row.get(sto).c(d!())?.to_string(),
            )
            .c(d!())?;
            tag(&mut w, "xff", &fmt_f64(arc.xff.get(sto).c(d!())?)).c(d!())?;

            start(&mut w, "cdp_prep").c(d!())?;
            for st in arc.states.iter() {
                start(&mut w, "ds").c(d!())?;
                tag(&mut w, "value", &fmt_f64(st.value.get(sto).c(d!())?)).c(d!())?;
                tag(
                    &mut w,
                    "unknown_datapoints",
                    &st.unknown_steps.get(sto).c(d!())?.to_string(),
                )
                .c(d!())?;
                end(&mut w).c(d!())?;
            }
            end(&mut w).c(d!())?;

            // rows go out oldest first
            let rows = arc.robin.rows() as i64;
            let cur = arc.cur_row.get(sto).c(d!())? as i64;
            start(&mut w, "database").c(d!())?;
            for k in 0..rows {
                start(&mut w, "row").c(d!())?;
                for col in 0..self.schema.sources.len() as u32 {
                    let v = arc.robin.get(sto, cur + 1 + k, col).c(d!())?;
                    tag(&mut w, "v", &fmt_f64(v)).c(d!())?;
                }
                end(&mut w).c(d!())?;
            }
            end(&mut w).c(d!())?;

            end(&mut w).c(d!())?;
        }

        end(&mut w).c(d!())?;
        String::from_utf8(buf).c(d!())
    }

    /// Rebuild a file-backed database at `path` from an XML dump.
    pub fn import(path: &str, xml: &str) -> Result<Database> {
        let tree = parse_dump(xml).c(d!())?;
        let def = tree.definition(path).c(d!())?;
        def.validate().c(d!())?;
        let store = FileStore::create(path).c(d!())?;
        Self::restore(Box::new(store), &def, &tree)
    }

    /// Rebuild a database on the named in-memory store.
    pub fn import_named(name: &str, xml: &str) -> Result<Database> {
        let tree = parse_dump(xml).c(d!())?;
        let def = tree.definition(name).c(d!())?;
        def.validate().c(d!())?;
        let mut store = MemStore::attach(name);
        store.truncate(0).c(d!())?;
        Self::restore(Box::new(store), &def, &tree)
    }

    fn restore(store: Box<dyn ByteStore>, def: &Definition, tree: &DumpTree) -> Result<Database> {
        let mut db = Database::create_with(store, def).c(d!())?;

        {
            let sto = &mut *db.store;
            let hdr = &db.schema.header;
            hdr.last_update.set(sto, tree.lastupdate as i32).c(d!())?;
            if let Some(us) = hdr.last_update_us {
                us.set(sto, 0).c(d!())?;
            }

            for (src, d) in db.schema.sources.iter().zip(tree.ds.iter()) {
                src.last_ds.set(sto, &d.last_ds).c(d!())?;
                src.unknown_sec.set(sto, d.unknown_sec as i32).c(d!())?;
                src.scratch.set(sto, d.value).c(d!())?;
            }

            for (arc, a) in db.schema.archives.iter().zip(tree.arcs.iter()) {
                for (st, c) in arc.states.iter().zip(a.cdp.iter()) {
                    st.value.set(sto, c.value).c(d!())?;
                    st.unknown_steps.set(sto, c.unknown as i32).c(d!())?;
                }
                // dumped oldest first; the newest lands on the ring tail
                arc.cur_row
                    .set(sto, a.rows.len() as i32 - 1)
                    .c(d!())?;
                for (k, row) in a.rows.iter().enumerate() {
                    for (col, v) in row.iter().enumerate() {
                        arc.robin.set(sto, k as i64, col as u32, *v).c(d!())?;
                    }
                }
            }
        }

        db.store.sync().c(d!())?;
        Ok(db)
    }
}

fn fmt_f64(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_owned()
    } else {
        format!("{v}")
    }
}

fn start<W: Write>(w: &mut EventWriter<W>, name: &str) -> Result<()> {
    w.write(WEvent::start_element(name)).c(d!())
}

fn end<W: Write>(w: &mut EventWriter<W>) -> Result<()> {
    w.write(WEvent::end_element()).c(d!())
}

fn tag<W: Write>(w: &mut EventWriter<W>, name: &str, text: &str) -> Result<()> {
    start(w, name).c(d!())?;
    w.write(WEvent::characters(text)).c(d!())?;
    end(w).c(d!())
}

// ----------------------------------------------------------------------
// import side
// ----------------------------------------------------------------------

#[derive(Default)]
struct DsDump {
    name: String,
    kind: String,
    heartbeat: i64,
    min: f64,
    max: f64,
    last_ds: String,
    value: f64,
    unknown_sec: i64,
}

#[derive(Default)]
struct CdpDump {
    value: f64,
    unknown: i64,
}

#[derive(Default)]
struct ArcDump {
    cf: String,
    pdp_per_row: i64,
    xff: f64,
    cdp: Vec<CdpDump>,
    rows: Vec<Vec<f64>>,
}

#[derive(Default)]
struct DumpTree {
    version: String,
    step: i64,
    lastupdate: i64,
    ds: Vec<DsDump>,
    arcs: Vec<ArcDump>,
}

impl DumpTree {
    fn definition(&self, path: &str) -> Result<Definition> {
        let mut def = Definition::new(path, self.step).c(d!())?;
        def.set_start(self.lastupdate);
        for d in self.ds.iter() {
            def.add_ds(
                DsDef::new(&d.name, d.kind.parse::<DsType>().c(d!())?, d.heartbeat, d.min, d.max)
                    .c(d!())?,
            );
        }
        for a in self.arcs.iter() {
            def.add_archive(
                ArcDef::new(
                    a.cf.parse::<ConsolidationFn>().c(d!())?,
                    a.xff,
                    a.pdp_per_row as u32,
                    a.rows.len() as u32,
                )
                .c(d!())?,
            );
        }
        Ok(def)
    }

    fn check(&self) -> Result<()> {
        alt!(
            self.version != VERSION_1 && self.version != VERSION_3,
            return Err(eg!(format!("UnsupportedVersion: dump revision `{}`", self.version)))
        );
        alt!(self.ds.is_empty(), return Err(eg!("XmlError: dump has no data sources")));
        alt!(self.arcs.is_empty(), return Err(eg!("XmlError: dump has no archives")));
        for a in self.arcs.iter() {
            alt!(
                a.pdp_per_row < 1 || a.pdp_per_row > i32::MAX as i64,
                return Err(eg!(format!("XmlError: bad pdp_per_row {}", a.pdp_per_row)))
            );
            alt!(
                a.cdp.len() != self.ds.len(),
                return Err(eg!("XmlError: cdp_prep width does not match the data sources"))
            );
            alt!(a.rows.is_empty(), return Err(eg!("XmlError: archive dump has no rows")));
            for row in a.rows.iter() {
                alt!(
                    row.len() != self.ds.len(),
                    return Err(eg!("XmlError: row width does not match the data sources"))
                );
            }
        }
        Ok(())
    }
}

fn parse_dump(xml: &str) -> Result<DumpTree> {
    let mut tree = DumpTree::default();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut seen_root = false;

    for ev in EventReader::new(xml.as_bytes()) {
        match ev.c(d!("XmlError: unreadable dump"))? {
            REvent::StartElement { name, .. } => {
                let name = name.local_name;
                match (path_str(&path).as_str(), name.as_str()) {
                    ("", "rrd") => seen_root = true,
                    ("", _) => return Err(eg!(format!("XmlError: unexpected root `{name}`"))),
                    ("rrd", "ds") => tree.ds.push(DsDump::default()),
                    ("rrd", "rra") => tree.arcs.push(ArcDump::default()),
                    ("rrd/rra/cdp_prep", "ds") => {
                        last_arc(&mut tree)?.cdp.push(CdpDump::default())
                    }
                    ("rrd/rra/database", "row") => {
                        last_arc(&mut tree)?.rows.push(Vec::new())
                    }
                    _ => {}
                }
                path.push(name);
                text.clear();
            }
            REvent::Characters(t) | REvent::CData(t) => text.push_str(&t),
            REvent::EndElement { .. } => {
                let txt = text.trim().to_owned();
                absorb(&mut tree, &path, &txt).c(d!())?;
                text.clear();
                path.pop();
            }
            _ => {}
        }
    }

    alt!(!seen_root, return Err(eg!("XmlError: not an rrd dump")));
    tree.check().c(d!())?;
    Ok(tree)
}

fn path_str(path: &[String]) -> String {
    path.join("/")
}

fn last_arc(tree: &mut DumpTree) -> Result<&mut ArcDump> {
    tree.arcs.last_mut().ok_or_else(|| eg!("XmlError: dangling archive data"))
}

fn last_ds(tree: &mut DumpTree) -> Result<&mut DsDump> {
    tree.ds.last_mut().ok_or_else(|| eg!("XmlError: dangling data source field"))
}

fn absorb(tree: &mut DumpTree, path: &[String], txt: &str) -> Result<()> {
    match path_str(path).as_str() {
        "rrd/version" => tree.version = txt.to_owned(),
        "rrd/step" => tree.step = int(txt).c(d!())?,
        "rrd/lastupdate" => tree.lastupdate = int(txt).c(d!())?,

        "rrd/ds/name" => last_ds(tree)?.name = txt.to_owned(),
        "rrd/ds/type" => last_ds(tree)?.kind = txt.to_owned(),
        "rrd/ds/minimal_heartbeat" => last_ds(tree)?.heartbeat = int(txt).c(d!())?,
        "rrd/ds/min" => last_ds(tree)?.min = num(txt).c(d!())?,
        "rrd/ds/max" => last_ds(tree)?.max = num(txt).c(d!())?,
        "rrd/ds/last_ds" => last_ds(tree)?.last_ds = txt.to_owned(),
        "rrd/ds/value" => last_ds(tree)?.value = num(txt).c(d!())?,
        "rrd/ds/unknown_sec" => last_ds(tree)?.unknown_sec = int(txt).c(d!())?,

        "rrd/rra/cf" => last_arc(tree)?.cf = txt.to_owned(),
        "rrd/rra/pdp_per_row" => last_arc(tree)?.pdp_per_row = int(txt).c(d!())?,
        "rrd/rra/xff" => last_arc(tree)?.xff = num(txt).c(d!())?,

        "rrd/rra/cdp_prep/ds/value" => {
            last_cdp(tree)?.value = num(txt).c(d!())?
        }
        "rrd/rra/cdp_prep/ds/unknown_datapoints" => {
            last_cdp(tree)?.unknown = int(txt).c(d!())?
        }

        "rrd/rra/database/row/v" => {
            let v = num(txt).c(d!())?;
            last_arc(tree)?
                .rows
                .last_mut()
                .ok_or_else(|| eg!("XmlError: dangling row value"))?
                .push(v);
        }

        // structural elements carry no own text
        "rrd" | "rrd/ds" | "rrd/rra" | "rrd/rra/cdp_prep" | "rrd/rra/cdp_prep/ds"
        | "rrd/rra/database" | "rrd/rra/database/row" => {
            alt!(
                !txt.is_empty(),
                return Err(eg!(format!("XmlError: stray text `{txt}` in dump")))
            );
        }

        p => return Err(eg!(format!("XmlError: unexpected element `{p}` in dump"))),
    }
    Ok(())
}

fn last_cdp(tree: &mut DumpTree) -> Result<&mut CdpDump> {
    last_arc(tree)?
        .cdp
        .last_mut()
        .ok_or_else(|| eg!("XmlError: dangling cdp_prep field"))
}

fn int(s: &str) -> Result<i64> {
    s.parse()
        .map_err(|_| eg!(format!("XmlError: `{s}` is not an integer")))
}

fn num(s: &str) -> Result<f64> {
    s.parse()
        .map_err(|_| eg!(format!("XmlError: `{s}` is not a number")))
}
