#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt::{self, Write as _};

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("cannot parse timestamp {text:?}: {detail}")]
    Malformed { text: String, detail: String },
    #[error("timestamp part {part} = {value} is out of range in {text:?}")]
    OutOfRange {
        part: &'static str,
        value: i64,
        text: String,
    },
}

/// Which calendar components of a [`Timestamp`] are meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    #[default]
    DateTime,
    DateOnly,
    TimeOnly,
}

/// A calendar timestamp with optional timezone offset.
///
/// Components are stored as written; conversion to nanoseconds since the
/// Unix epoch happens on demand. A date-only value means midnight of that
/// day; a time-only value borrows the current local date when an epoch is
/// requested.
///
/// Equality is component-wise (two renderings of the same instant in
/// different timezones are *not* equal); ordering via [`cmp_instant`]
/// compares the resolved instants.
///
/// [`cmp_instant`]: Timestamp::cmp_instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub nanos: u32,
    pub tz_offset_minutes: Option<i32>,
    pub precision: DatePrecision,
}

/// When the formatter appends a `±HHMM` timezone suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TzPrint {
    Always,
    Never,
    /// Only when the value carries an explicit offset.
    #[default]
    IfSet,
}

impl Timestamp {
    #[must_use]
    pub fn date(year: i32, month: u32, day: u32) -> Self {
        Self {
            year,
            month,
            day,
            precision: DatePrecision::DateOnly,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn time(hour: u32, minute: u32, second: u32, nanos: u32) -> Self {
        Self {
            hour,
            minute,
            second,
            nanos,
            precision: DatePrecision::TimeOnly,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn time_tz(hour: u32, minute: u32, second: u32, nanos: u32, tz_minutes: i32) -> Self {
        Self {
            tz_offset_minutes: Some(tz_minutes),
            ..Self::time(hour, minute, second, nanos)
        }
    }

    #[must_use]
    pub fn ymd_hms(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_date(&self) -> bool {
        self.precision != DatePrecision::TimeOnly
    }

    #[must_use]
    pub fn has_time(&self) -> bool {
        self.precision != DatePrecision::DateOnly
    }

    fn naive_date(&self) -> NaiveDate {
        let (y, m, d) = if self.has_date() {
            (self.year, self.month, self.day)
        } else {
            let today = Local::now().date_naive();
            (today.year(), today.month(), today.day())
        };
        // Invalid components (possible through direct construction) sort
        // before every real date rather than poisoning the comparator.
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
    }

    fn naive_time(&self) -> NaiveTime {
        if self.has_time() {
            NaiveTime::from_hms_nano_opt(self.hour, self.minute, self.second, self.nanos)
                .unwrap_or(NaiveTime::MIN)
        } else {
            NaiveTime::MIN
        }
    }

    /// Nanoseconds since the Unix epoch.
    ///
    /// An explicit timezone offset wins; otherwise the local offset at that
    /// wall-clock time applies, or UTC when `assume_utc` is set.
    #[must_use]
    pub fn epoch_nanos(&self, assume_utc: bool) -> i64 {
        let naive = self.naive_date().and_time(self.naive_time());
        let offset_secs = match self.tz_offset_minutes {
            Some(minutes) => i64::from(minutes) * 60,
            None if assume_utc => 0,
            None => i64::from(
                Local
                    .offset_from_local_datetime(&naive)
                    .earliest()
                    .map(|offset| offset.local_minus_utc())
                    .unwrap_or(0),
            ),
        };
        (naive.and_utc().timestamp() - offset_secs) * 1_000_000_000 + i64::from(self.nanos)
    }

    /// Order two timestamps by the instant they resolve to.
    #[must_use]
    pub fn cmp_instant(&self, other: &Self) -> Ordering {
        self.epoch_nanos(false).cmp(&other.epoch_nanos(false))
    }

    /// Render with an optional date format (`%Y-%m-%d` by default),
    /// `subsecond_digits` fractional digits, and a timezone policy.
    ///
    /// Date-only values print just the date; time-only values just
    /// `HH:MM:SS`; full values join both with `T`.
    #[must_use]
    pub fn to_text(&self, date_fmt: Option<&str>, subsecond_digits: u8, tz: TzPrint) -> String {
        let mut out = String::new();
        if self.has_date() {
            let date = self.naive_date();
            let _ = write!(out, "{}", date.format(date_fmt.unwrap_or("%Y-%m-%d")));
        }
        if self.has_time() {
            if self.has_date() {
                out.push('T');
            }
            let _ = write!(out, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second);
            push_subseconds(&mut out, self.nanos, subsecond_digits);
        }
        let print_tz = match tz {
            TzPrint::Always => true,
            TzPrint::Never => false,
            TzPrint::IfSet => self.tz_offset_minutes.is_some(),
        };
        if print_tz {
            push_tz_suffix(&mut out, self.tz_offset_minutes.unwrap_or(0));
        }
        out
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(None, 0, TzPrint::IfSet))
    }
}

fn push_subseconds(out: &mut String, nanos: u32, digits: u8) {
    if digits == 0 || digits > 9 {
        return;
    }
    let mut scaled = nanos;
    for _ in 0..9 - digits {
        scaled /= 10;
    }
    let _ = write!(out, ".{:0width$}", scaled, width = usize::from(digits));
}

fn push_tz_suffix(out: &mut String, offset_minutes: i32) {
    let (sign, magnitude) = if offset_minutes < 0 {
        ('-', -offset_minutes)
    } else {
        ('+', offset_minutes)
    };
    let _ = write!(out, "{sign}{:02}{:02}", magnitude / 60, magnitude % 60);
}

/// Format an epoch-nanosecond instant with a strftime-like pattern.
///
/// `tz_offset_minutes` shifts the rendered wall clock; when absent the local
/// offset applies, or UTC when `use_utc_if_unset` is set.
#[must_use]
pub fn format_epoch_nanos(
    epoch_nanos: i64,
    fmt: &str,
    subsecond_digits: u8,
    tz: TzPrint,
    tz_offset_minutes: Option<i32>,
    use_utc_if_unset: bool,
) -> String {
    let secs = epoch_nanos.div_euclid(1_000_000_000);
    let nanos = epoch_nanos.rem_euclid(1_000_000_000) as u32;
    let utc = DateTime::from_timestamp(secs, nanos).unwrap_or_default();
    let offset_minutes = match tz_offset_minutes {
        Some(minutes) => minutes,
        None if use_utc_if_unset => 0,
        None => Local.offset_from_utc_datetime(&utc.naive_utc()).local_minus_utc() / 60,
    };
    let shifted = utc.naive_utc() + chrono::Duration::minutes(i64::from(offset_minutes));

    let mut out = format!("{}", shifted.format(fmt));
    push_subseconds(&mut out, shifted.nanosecond(), subsecond_digits);
    let print_tz = match tz {
        TzPrint::Always => true,
        TzPrint::Never => false,
        TzPrint::IfSet => tz_offset_minutes.is_some(),
    };
    if print_tz {
        push_tz_suffix(&mut out, offset_minutes);
    }
    out
}

struct Cursor<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn skip_space(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.bump();
        }
    }

    /// Read a run of decimal digits; returns the value and digit count.
    fn read_uint(&mut self) -> Option<(u64, usize)> {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(b) = self.peek() {
            if !b.is_ascii_digit() {
                break;
            }
            value = value.saturating_mul(10).saturating_add(u64::from(b - b'0'));
            self.bump();
        }
        if self.pos == start {
            None
        } else {
            Some((value, self.pos - start))
        }
    }

    fn malformed(&self, detail: impl Into<String>) -> TimeError {
        TimeError::Malformed {
            text: self.text.to_owned(),
            detail: detail.into(),
        }
    }

    fn out_of_range(&self, part: &'static str, value: u64) -> TimeError {
        TimeError::OutOfRange {
            part,
            value: value as i64,
            text: self.text.to_owned(),
        }
    }
}

/// Parse the timestamp grammar.
///
/// Date-only: `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYYMMDD`. An ambiguous `a-b-c`
/// date is resolved by digit count: a 4-digit first part reads as
/// year-month-day, a 4-digit last part as month-day-year, anything else is
/// malformed. Time-only: `HH:MM:SS[.sub]`. Combined forms join the two with
/// a space or any single separator byte. A trailing `±HHMM` / `±HH:MM` /
/// `±HH` timezone offset and a terminal `Z` are accepted.
pub fn parse_timestamp(text: &str) -> Result<Timestamp, TimeError> {
    let mut cur = Cursor::new(text);
    let mut ts = Timestamp::default();

    cur.skip_space();
    let (first, first_digits) = cur
        .read_uint()
        .ok_or_else(|| cur.malformed("expected a leading integer"))?;

    if cur.peek() == Some(b':') {
        ts.precision = DatePrecision::TimeOnly;
        parse_time_tail(&mut cur, &mut ts, first)?;
    } else {
        parse_date(&mut cur, &mut ts, first, first_digits)?;
        if cur.peek() == Some(b':') {
            return Err(cur.malformed("':' is not allowed at the end of a date"));
        }
        if matches!(cur.peek(), Some(b) if !b.is_ascii_whitespace()) {
            cur.bump(); // date/time separator such as 'T'
        }
        cur.skip_space();
        match cur.read_uint() {
            None => {
                if cur.at_end() {
                    ts.precision = DatePrecision::DateOnly;
                    return Ok(ts);
                }
                return Err(cur.malformed("unexpected text after date"));
            }
            Some((hour, _)) => {
                if cur.peek() != Some(b':') {
                    return Err(cur.malformed("expected ':' after hour"));
                }
                parse_time_tail(&mut cur, &mut ts, hour)?;
            }
        }
    }

    parse_tz_suffix(&mut cur, &mut ts)?;
    Ok(ts)
}

fn parse_date(
    cur: &mut Cursor<'_>,
    ts: &mut Timestamp,
    first: u64,
    first_digits: usize,
) -> Result<(), TimeError> {
    if first_digits > 8 {
        return Err(cur.out_of_range("year", first));
    }
    if first_digits == 8 {
        // Compact YYYYMMDD.
        ts.year = (first / 10_000) as i32;
        let rest = first % 10_000;
        ts.month = (rest / 100) as u32;
        ts.day = (rest % 100) as u32;
    } else {
        let sep = cur
            .peek()
            .ok_or_else(|| cur.malformed("expected a date separator"))?;
        cur.bump();
        let (second_part, _) = cur
            .read_uint()
            .ok_or_else(|| cur.malformed("expected the second part of the date"))?;
        if cur.peek() != Some(sep) {
            return Err(cur.malformed("mismatched date separators"));
        }
        cur.bump();
        let (third_part, third_digits) = cur
            .read_uint()
            .ok_or_else(|| cur.malformed("expected the third part of the date"))?;

        if first_digits == 4 {
            ts.year = first as i32;
            ts.month = second_part as u32;
            ts.day = third_part as u32;
        } else if third_digits == 4 {
            ts.year = third_part as i32;
            ts.month = first as u32;
            ts.day = second_part as u32;
        } else {
            return Err(cur.malformed("ambiguous date: neither first nor last part has 4 digits"));
        }
    }

    if ts.month == 0 || ts.month > 12 {
        return Err(cur.out_of_range("month", u64::from(ts.month)));
    }
    if ts.day == 0 || ts.day > 31 {
        return Err(cur.out_of_range("day", u64::from(ts.day)));
    }
    if NaiveDate::from_ymd_opt(ts.year, ts.month, ts.day).is_none() {
        return Err(cur.out_of_range("day", u64::from(ts.day)));
    }
    Ok(())
}

fn parse_time_tail(cur: &mut Cursor<'_>, ts: &mut Timestamp, hour: u64) -> Result<(), TimeError> {
    if hour >= 24 {
        return Err(cur.out_of_range("hour", hour));
    }
    cur.bump(); // ':'
    let (minute, _) = cur
        .read_uint()
        .ok_or_else(|| cur.malformed("expected minutes"))?;
    if cur.peek() != Some(b':') {
        return Err(cur.malformed("expected ':' after minutes"));
    }
    cur.bump();
    let (second, _) = cur
        .read_uint()
        .ok_or_else(|| cur.malformed("expected seconds"))?;
    if minute >= 60 {
        return Err(cur.out_of_range("minute", minute));
    }
    if second >= 60 {
        return Err(cur.out_of_range("second", second));
    }
    ts.hour = hour as u32;
    ts.minute = minute as u32;
    ts.second = second as u32;

    if cur.peek() == Some(b'.') {
        cur.bump();
        let (sub, digits) = cur
            .read_uint()
            .ok_or_else(|| cur.malformed("expected subsecond digits after '.'"))?;
        if digits > 9 {
            return Err(cur.out_of_range("subseconds", sub));
        }
        let mut nanos = sub;
        for _ in 0..9 - digits {
            nanos *= 10;
        }
        ts.nanos = nanos as u32;
    }
    Ok(())
}

fn parse_tz_suffix(cur: &mut Cursor<'_>, ts: &mut Timestamp) -> Result<(), TimeError> {
    cur.skip_space();
    if cur.at_end() {
        return Ok(());
    }
    if cur.peek() == Some(b'Z') {
        cur.bump();
        cur.skip_space();
        if !cur.at_end() {
            return Err(cur.malformed("unexpected text after 'Z'"));
        }
        return Ok(());
    }

    let sign: i32 = match cur.peek() {
        Some(b'+') => 1,
        Some(b'-') => -1,
        _ => return Err(cur.malformed("expected a '+' or '-' timezone offset")),
    };
    cur.bump();
    let (value, digits) = cur
        .read_uint()
        .ok_or_else(|| cur.malformed("expected timezone digits"))?;

    let (hours, minutes) = if digits == 4 {
        (value / 100, value % 100)
    } else if digits == 1 || digits == 2 {
        let hours = value;
        let minutes = if cur.peek() == Some(b':') {
            cur.bump();
            let (m, md) = cur
                .read_uint()
                .ok_or_else(|| cur.malformed("expected timezone minutes after ':'"))?;
            if md != 1 && md != 2 {
                return Err(cur.malformed("timezone minutes must have 1 or 2 digits"));
            }
            m
        } else {
            0
        };
        (hours, minutes)
    } else {
        return Err(cur.malformed("timezone must be +HHMM, +HH:MM, or +HH"));
    };

    if hours > 12 {
        return Err(cur.out_of_range("timezone hours", hours));
    }
    if minutes > 60 {
        return Err(cur.out_of_range("timezone minutes", minutes));
    }
    cur.skip_space();
    if !cur.at_end() && cur.peek() != Some(b'Z') {
        return Err(cur.malformed("unexpected text after timezone"));
    }
    ts.tz_offset_minutes = Some(sign * (hours * 60 + minutes) as i32);
    Ok(())
}
