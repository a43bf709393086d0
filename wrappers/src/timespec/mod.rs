//!
//! # At-style time specifications
//!
//! The query-window grammar inherited from the classic tooling:
//! absolute forms (`17:30`, `noon yesterday`, `12/25/1999`, `20080101`),
//! the anchors `now`, `start` and `end`, and signed offset chains like
//! `-1day+6hours`. A parsed [`TimeSpec`] is either absolute or relative
//! to the other end of a (start, end) pair; [`TimeSpec::resolve_pair`]
//! ties the two together.
//!
//! Civil arithmetic is UTC-based; day words move along whole UTC days.
//!

mod scanner;


use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use ruc::*;
use scanner::{Scanner, Tok, Unit};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// What a parsed spec is anchored to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TimeAnchor {
    Absolute,
    /// Relative to the paired start spec.
    Start,
    /// Relative to the paired end spec.
    End,
}

/// Outcome of parsing one at-style expression: a civil base plus signed
/// month and second deltas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSpec {
    pub anchor: TimeAnchor,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub delta_months: i32,
    pub delta_sec: i64,
}

impl TimeSpec {
    /// Epoch seconds of an absolute spec.
    pub fn timestamp(&self) -> Result<i64> {
        alt!(
            TimeAnchor::Absolute != self.anchor,
            return Err(eg!("TimeSpecError: spec is relative, resolve it against its pair"))
        );
        self.materialize().c(d!())
    }

    /// Epoch seconds, taking the paired anchor for relative specs.
    pub fn resolve(&self, anchor_epoch: i64) -> Result<i64> {
        if TimeAnchor::Absolute == self.anchor {
            return self.materialize().c(d!());
        }
        let dt = DateTime::from_timestamp(anchor_epoch, 0)
            .ok_or_else(|| eg!("TimeSpecError: anchor out of range"))?
            .naive_utc();
        let dt = shift_months(dt, self.delta_months).c(d!())?;
        Ok(dt.and_utc().timestamp() + self.delta_sec)
    }

    /// Resolve a (start, end) pair with cross-references; mutual
    /// references are rejected.
    pub fn resolve_pair(start: &TimeSpec, end: &TimeSpec) -> Result<(i64, i64)> {
        match (start.anchor, end.anchor) {
            (TimeAnchor::End, TimeAnchor::Start) => {
                Err(eg!("TimeSpecError: start and end reference each other"))
            }
            (TimeAnchor::Start, _) => {
                Err(eg!("TimeSpecError: the start spec cannot be relative to itself"))
            }
            (_, TimeAnchor::End) => {
                Err(eg!("TimeSpecError: the end spec cannot be relative to itself"))
            }
            (TimeAnchor::End, _) => {
                let e = end.timestamp().c(d!())?;
                Ok((start.resolve(e).c(d!())?, e))
            }
            (_, TimeAnchor::Start) => {
                let s = start.timestamp().c(d!())?;
                Ok((s, end.resolve(s).c(d!())?))
            }
            _ => Ok((start.timestamp().c(d!())?, end.timestamp().c(d!())?)),
        }
    }

    fn materialize(&self) -> Result<i64> {
        let d = NaiveDate::from_ymd_opt(self.year, self.month, self.day)
            .ok_or_else(|| eg!(format!(
                "TimeSpecError: no such date {}-{}-{}",
                self.year, self.month, self.day
            )))?;
        let dt = d
            .and_hms_opt(self.hour, self.minute, self.second)
            .ok_or_else(|| eg!("TimeSpecError: invalid time of day"))?;
        let dt = shift_months(dt, self.delta_months).c(d!())?;
        Ok(dt.and_utc().timestamp() + self.delta_sec)
    }
}

/// Entry points for the grammar.
pub struct TimeParser;

impl TimeParser {
    /// Parse against the current wall clock.
    pub fn parse(input: &str) -> Result<TimeSpec> {
        Self::parse_at(input, epoch_now().c(d!())?)
    }

    /// Parse with an explicit "now" (deterministic tests, replays).
    pub fn parse_at(input: &str, now: i64) -> Result<TimeSpec> {
        let base = DateTime::from_timestamp(now, 0)
            .ok_or_else(|| eg!("TimeSpecError: reference time out of range"))?
            .naive_utc();
        let mut p = Parser {
            sc: Scanner::new(input),
            cur: Tok::Eof,
            date_seen: false,
            date: base.date(),
            hour: base.hour(),
            minute: base.minute(),
            second: base.second(),
            anchor: TimeAnchor::Absolute,
            delta_months: 0,
            delta_sec: 0,
        };
        p.advance();
        p.spec().c(d!())?;
        alt!(
            Tok::Eof != p.cur,
            return Err(eg!(format!("TimeSpecError: trailing input in `{input}`")))
        );
        Ok(TimeSpec {
            anchor: p.anchor,
            year: p.date.year(),
            month: p.date.month(),
            day: p.date.day(),
            hour: p.hour,
            minute: p.minute,
            second: p.second,
            delta_months: p.delta_months,
            delta_sec: p.delta_sec,
        })
    }

    /// Parse and resolve a (start, end) pair in one go.
    pub fn parse_pair(start: &str, end: &str) -> Result<(i64, i64)> {
        Self::parse_pair_at(start, end, epoch_now().c(d!())?)
    }

    pub fn parse_pair_at(start: &str, end: &str, now: i64) -> Result<(i64, i64)> {
        let s = Self::parse_at(start, now).c(d!())?;
        let e = Self::parse_at(end, now).c(d!())?;
        TimeSpec::resolve_pair(&s, &e).c(d!())
    }
}

struct Parser {
    sc: Scanner,
    cur: Tok,
    date_seen: bool,
    date: NaiveDate,
    hour: u32,
    minute: u32,
    second: u32,
    anchor: TimeAnchor,
    delta_months: i32,
    delta_sec: i64,
}

impl Parser {
    fn advance(&mut self) {
        self.cur = self.sc.next_word();
    }

    fn advance_mult(&mut self) {
        self.cur = self.sc.next_mult();
    }

    fn spec(&mut self) -> Result<()> {
        match self.cur.clone() {
            Tok::Eof => Err(eg!("TimeSpecError: empty specification")),
            Tok::Plus | Tok::Minus => self.offsets().c(d!()),
            Tok::Now => {
                self.advance();
                self.offsets().c(d!())
            }
            Tok::Start => {
                self.anchor = TimeAnchor::Start;
                self.advance();
                self.offsets().c(d!())
            }
            Tok::End => {
                self.anchor = TimeAnchor::End;
                self.advance();
                self.offsets().c(d!())
            }
            Tok::Midnight | Tok::Noon | Tok::Teatime => {
                self.tod().c(d!())?;
                self.day_opt().c(d!())?;
                self.offsets().c(d!())
            }
            Tok::Number(_) => {
                self.numeric_spec().c(d!())?;
                self.offsets().c(d!())
            }
            Tok::Month(_)
            | Tok::Weekday(_)
            | Tok::Today
            | Tok::Yesterday
            | Tok::Tomorrow => {
                // a leading date pins the time to midnight
                self.hour = 0;
                self.minute = 0;
                self.second = 0;
                self.day().c(d!())?;
                self.tod_opt().c(d!())?;
                self.offsets().c(d!())
            }
            t => Err(eg!(format!("TimeSpecError: unexpected `{t:?}`"))),
        }
    }

    // HH[:MM[:SS]], military HHMM, the named times; am/pm suffixes
    fn tod(&mut self) -> Result<()> {
        match self.cur.clone() {
            Tok::Midnight => {
                self.set_time(0, 0, 0);
                self.advance();
            }
            Tok::Noon => {
                self.set_time(12, 0, 0);
                self.advance();
            }
            Tok::Teatime => {
                self.set_time(16, 0, 0);
                self.advance();
            }
            Tok::Number(raw) => {
                self.advance();
                self.tod_digits(&raw).c(d!())?;
            }
            t => return Err(eg!(format!("TimeSpecError: expected a time of day, got `{t:?}`"))),
        }
        Ok(())
    }

    fn tod_opt(&mut self) -> Result<()> {
        match self.cur {
            Tok::Midnight | Tok::Noon | Tok::Teatime | Tok::Number(_) => {
                self.tod().c(d!())
            }
            _ => Ok(()),
        }
    }

    /// The number itself is already consumed; `cur` is what follows.
    fn tod_digits(&mut self, raw: &str) -> Result<()> {
        let (mut hour, mut minute, mut second) = (0_u32, 0_u32, 0_u32);
        match raw.len() {
            1 | 2 => {
                hour = raw.parse::<u32>().c(d!())?;
                if Tok::Colon == self.cur {
                    self.advance();
                    minute = self.expect_number().c(d!())?.parse::<u32>().c(d!())?;
                    if Tok::Colon == self.cur {
                        self.advance();
                        second = self.expect_number().c(d!())?.parse::<u32>().c(d!())?;
                    }
                }
            }
            3 => {
                hour = raw[..1].parse::<u32>().c(d!())?;
                minute = raw[1..].parse::<u32>().c(d!())?;
            }
            4 => {
                hour = raw[..2].parse::<u32>().c(d!())?;
                minute = raw[2..].parse::<u32>().c(d!())?;
            }
            _ => return Err(eg!(format!("TimeSpecError: unreadable time `{raw}`"))),
        }

        match self.cur {
            Tok::Am => {
                alt!(hour < 1 || hour > 12, return Err(eg!("TimeSpecError: bad am/pm hour")));
                if 12 == hour {
                    hour = 0;
                }
                self.advance();
            }
            Tok::Pm => {
                alt!(hour < 1 || hour > 12, return Err(eg!("TimeSpecError: bad am/pm hour")));
                if hour < 12 {
                    hour += 12;
                }
                self.advance();
            }
            _ => {}
        }

        alt!(
            hour > 23 || minute > 59 || second > 59,
            return Err(eg!(format!("TimeSpecError: time of day out of range `{raw}`")))
        );
        self.set_time(hour, minute, second);
        Ok(())
    }

    // dates: day words, weekdays, `monthname D [Y]`, MM/DD[/YY[YY]],
    // DD.MM[.YY[YY]], YYYYMMDD
    fn day(&mut self) -> Result<()> {
        match self.cur.clone() {
            Tok::Today => self.advance(),
            Tok::Yesterday => {
                self.date -= Duration::days(1);
                self.advance();
            }
            Tok::Tomorrow => {
                self.date += Duration::days(1);
                self.advance();
            }
            Tok::Weekday(w) => {
                let cw = self.date.weekday().num_days_from_sunday();
                self.date += Duration::days(w as i64 - cw as i64);
                self.advance();
            }
            Tok::Month(m) => {
                self.advance();
                let day: u32 = self.expect_number().c(d!())?.parse::<u32>().c(d!())?;
                let year = match self.cur.clone() {
                    Tok::Number(y) if 2 == y.len() || 4 == y.len() => {
                        self.advance();
                        window_year(y.parse::<i32>().c(d!())?)
                    }
                    _ => self.date.year(),
                };
                self.set_date(year, m, day).c(d!())?;
            }
            Tok::Number(raw) if 8 == raw.len() => {
                self.advance();
                self.set_date(
                    raw[..4].parse::<i32>().c(d!())?,
                    raw[4..6].parse::<u32>().c(d!())?,
                    raw[6..].parse::<u32>().c(d!())?,
                )
                .c(d!())?;
            }
            t => return Err(eg!(format!("TimeSpecError: expected a date, got `{t:?}`"))),
        }
        self.date_seen = true;
        Ok(())
    }

    fn day_opt(&mut self) -> Result<()> {
        match self.cur.clone() {
            Tok::Today
            | Tok::Yesterday
            | Tok::Tomorrow
            | Tok::Weekday(_)
            | Tok::Month(_) => self.day().c(d!()),
            Tok::Number(raw) if 8 == raw.len() => self.day().c(d!()),
            Tok::Number(raw) => {
                // lookahead: `12/25` or `25.12` after a time of day
                let mark = self.sc.save();
                let saved = Tok::Number(raw.clone());
                self.advance();
                match self.cur {
                    Tok::Slash => self.date_slash(&raw).c(d!()),
                    Tok::Dot => self.date_dot(&raw).c(d!()),
                    _ => {
                        self.sc.restore(mark);
                        self.cur = saved;
                        Ok(())
                    }
                }
            }
            _ => Ok(()),
        }
    }

    /// The month digits are consumed and `cur` sits on the slash.
    fn date_slash(&mut self, month_raw: &str) -> Result<()> {
        self.advance();
        let month: u32 = month_raw.parse::<u32>().c(d!())?;
        let day: u32 = self.expect_number().c(d!())?.parse::<u32>().c(d!())?;
        let year = if Tok::Slash == self.cur {
            self.advance();
            window_year(self.expect_number().c(d!())?.parse::<i32>().c(d!())?)
        } else {
            self.date.year()
        };
        self.set_date(year, month, day).c(d!())?;
        self.date_seen = true;
        Ok(())
    }

    /// The day digits are consumed and `cur` sits on the dot.
    fn date_dot(&mut self, day_raw: &str) -> Result<()> {
        self.advance();
        let day: u32 = day_raw.parse::<u32>().c(d!())?;
        let month: u32 = self.expect_number().c(d!())?.parse::<u32>().c(d!())?;
        let year = if Tok::Dot == self.cur {
            self.advance();
            window_year(self.expect_number().c(d!())?.parse::<i32>().c(d!())?)
        } else {
            self.date.year()
        };
        self.set_date(year, month, day).c(d!())?;
        self.date_seen = true;
        Ok(())
    }

    fn numeric_spec(&mut self) -> Result<()> {
        let raw = match self.cur.clone() {
            Tok::Number(r) => r,
            _ => return Err(eg!("TimeSpecError: expected digits")),
        };
        self.advance();
        if 8 == raw.len() {
            self.set_time(0, 0, 0);
            self.set_date(
                raw[..4].parse::<i32>().c(d!())?,
                raw[4..6].parse::<u32>().c(d!())?,
                raw[6..].parse::<u32>().c(d!())?,
            )
            .c(d!())?;
            self.date_seen = true;
            self.tod_opt().c(d!())?;
        } else if Tok::Slash == self.cur {
            self.set_time(0, 0, 0);
            self.date_slash(&raw).c(d!())?;
            self.tod_opt().c(d!())?;
        } else if Tok::Dot == self.cur {
            self.set_time(0, 0, 0);
            self.date_dot(&raw).c(d!())?;
            self.tod_opt().c(d!())?;
        } else {
            self.tod_digits(&raw).c(d!())?;
            self.day_opt().c(d!())?;
        }
        Ok(())
    }

    fn offsets(&mut self) -> Result<()> {
        let mut op: i64 = 1;
        loop {
            match self.cur {
                Tok::Eof => return Ok(()),
                Tok::Plus => {
                    op = 1;
                    self.advance();
                }
                Tok::Minus => {
                    op = -1;
                    self.advance();
                }
                // `1day2hours` keeps the sign of the previous term
                Tok::Number(_) => {}
                _ => {
                    return Err(eg!(format!(
                        "TimeSpecError: expected an offset, got `{:?}`",
                        self.cur
                    )))
                }
            }
            let n: i64 = self.expect_number_mult().c(d!())?.parse::<i64>().c(d!())?;
            let unit = match self.cur {
                Tok::Unit(u) => u,
                _ => {
                    return Err(eg!(format!(
                        "TimeSpecError: expected an offset unit, got `{:?}`",
                        self.cur
                    )))
                }
            };
            self.apply_offset(op, n, unit);
            self.advance();
        }
    }

    fn apply_offset(&mut self, op: i64, n: i64, unit: Unit) {
        let months = match unit {
            Unit::Months => n,
            Unit::Years => 12 * n,
            Unit::MonthsOrMinutes if self.date_seen => n,
            _ => 0,
        };
        if 0 != months {
            self.delta_months += (op * months) as i32;
            return;
        }
        let secs = match unit {
            Unit::Seconds => n,
            Unit::Minutes | Unit::MonthsOrMinutes => 60 * n,
            Unit::Hours => 3_600 * n,
            Unit::Days => 86_400 * n,
            Unit::Weeks => 7 * 86_400 * n,
            Unit::Months | Unit::Years => 0,
        };
        self.delta_sec += op * secs;
    }

    fn expect_number(&mut self) -> Result<String> {
        match self.cur.clone() {
            Tok::Number(raw) => {
                self.advance();
                Ok(raw)
            }
            t => Err(eg!(format!("TimeSpecError: expected digits, got `{t:?}`"))),
        }
    }

    /// Like `expect_number`, but the following token is scanned in
    /// multiplier mode so unit suffixes stay whole.
    fn expect_number_mult(&mut self) -> Result<String> {
        match self.cur.clone() {
            Tok::Number(raw) => {
                self.advance_mult();
                Ok(raw)
            }
            t => Err(eg!(format!("TimeSpecError: expected digits, got `{t:?}`"))),
        }
    }

    fn set_time(&mut self, hour: u32, minute: u32, second: u32) {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
    }

    fn set_date(&mut self, year: i32, month: u32, day: u32) -> Result<()> {
        self.date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            eg!(format!("TimeSpecError: no such date {year}-{month}-{day}"))
        })?;
        Ok(())
    }
}

/// Two-digit years window into 1938..2037.
fn window_year(y: i32) -> i32 {
    if y < 38 {
        y + 2000
    } else if y < 100 {
        y + 1900
    } else {
        y
    }
}

fn shift_months(dt: NaiveDateTime, months: i32) -> Result<NaiveDateTime> {
    let shifted = if months >= 0 {
        dt.checked_add_months(Months::new(months as u32))
    } else {
        dt.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.ok_or_else(|| eg!("TimeSpecError: date arithmetic out of range"))
}

fn epoch_now() -> Result<i64> {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .c(d!())
        .map(|d| d.as_secs() as i64)
}
