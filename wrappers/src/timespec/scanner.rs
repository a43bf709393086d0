//! Token scanner for the at-style grammar.
//!
//! Two scanning modes share one cursor: word mode groups letter runs
//! into keywords, multiplier mode only accepts offset units, so the
//! ambiguous `m` survives until the parser can resolve it from context.
//! The parser may save and restore the cursor to look ahead.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Unit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
    /// The bare `m`: months after a date, minutes otherwise.
    MonthsOrMinutes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Tok {
    Eof,
    Plus,
    Minus,
    Dot,
    Slash,
    Colon,
    /// Raw digit run; the digit count distinguishes `7`, `0730` and
    /// `19990404`.
    Number(String),
    Now,
    Start,
    End,
    Today,
    Yesterday,
    Tomorrow,
    Midnight,
    Noon,
    Teatime,
    Am,
    Pm,
    /// 1..=12
    Month(u32),
    /// 0 = sunday
    Weekday(u32),
    Unit(Unit),
    Word(String),
}

#[derive(Clone, Debug)]
pub(crate) struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    pub fn save(&self) -> usize {
        self.pos
    }

    pub fn restore(&mut self, mark: usize) {
        self.pos = mark;
    }

    fn skip_ws(&mut self) {
        while self
            .chars
            .get(self.pos)
            .map(|c| c.is_whitespace() || ',' == *c)
            .unwrap_or(false)
        {
            self.pos += 1;
        }
    }

    fn run<F: Fn(char) -> bool>(&mut self, keep: F) -> String {
        let from = self.pos;
        while self.chars.get(self.pos).map(|c| keep(*c)).unwrap_or(false) {
            self.pos += 1;
        }
        self.chars[from..self.pos].iter().collect()
    }

    /// Word mode: keywords, numbers and separators.
    pub fn next_word(&mut self) -> Tok {
        self.skip_ws();
        let c = match self.chars.get(self.pos) {
            None => return Tok::Eof,
            Some(c) => *c,
        };
        if c.is_ascii_digit() {
            return Tok::Number(self.run(|c| c.is_ascii_digit()));
        }
        if c.is_alphabetic() {
            let word = self.run(char::is_alphabetic).to_lowercase();
            return keyword(&word);
        }
        self.pos += 1;
        match c {
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '.' => Tok::Dot,
            '/' => Tok::Slash,
            ':' => Tok::Colon,
            _ => Tok::Word(c.to_string()),
        }
    }

    /// Multiplier mode: only offset units come out whole; anything else
    /// is handed back as a plain word for the parser to reject.
    pub fn next_mult(&mut self) -> Tok {
        self.skip_ws();
        match self.chars.get(self.pos) {
            None => Tok::Eof,
            Some(c) if c.is_alphabetic() => {
                let word = self.run(char::is_alphabetic).to_lowercase();
                match unit(&word) {
                    Some(u) => Tok::Unit(u),
                    None => Tok::Word(word),
                }
            }
            Some(_) => self.next_word(),
        }
    }
}

fn keyword(word: &str) -> Tok {
    if let Some(u) = unit(word) {
        return Tok::Unit(u);
    }
    match word {
        "now" => Tok::Now,
        "start" => Tok::Start,
        "end" => Tok::End,
        "today" => Tok::Today,
        "yesterday" => Tok::Yesterday,
        "tomorrow" => Tok::Tomorrow,
        "midnight" => Tok::Midnight,
        "noon" => Tok::Noon,
        "teatime" => Tok::Teatime,
        "am" => Tok::Am,
        "pm" => Tok::Pm,
        _ => month(word)
            .map(Tok::Month)
            .or_else(|| weekday(word).map(Tok::Weekday))
            .unwrap_or_else(|| Tok::Word(word.to_owned())),
    }
}

fn unit(word: &str) -> Option<Unit> {
    Some(match word {
        "s" | "sec" | "secs" | "second" | "seconds" => Unit::Seconds,
        "min" | "mins" | "minute" | "minutes" => Unit::Minutes,
        "m" => Unit::MonthsOrMinutes,
        "h" | "hr" | "hour" | "hours" => Unit::Hours,
        "d" | "day" | "days" => Unit::Days,
        "w" | "wk" | "week" | "weeks" => Unit::Weeks,
        "mon" | "month" | "months" => Unit::Months,
        "y" | "yr" | "year" | "years" => Unit::Years,
        _ => return None,
    })
}

fn month(word: &str) -> Option<u32> {
    const NAMES: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    if word.len() < 3 {
        return None;
    }
    NAMES
        .iter()
        .position(|n| n.starts_with(word))
        .map(|i| i as u32 + 1)
}

fn weekday(word: &str) -> Option<u32> {
    const NAMES: [&str; 7] = [
        "sunday",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
    ];
    if word.len() < 3 {
        return None;
    }
    NAMES
        .iter()
        .position(|n| n.starts_with(word))
        .map(|i| i as u32)
}
