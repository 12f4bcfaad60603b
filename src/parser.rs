//! Directory-listing parsers.
//!
//! A [`Parser`] turns one `LIST` line into a [`StatRecord`]. Two
//! formats are built in:
//!
//! 1. **Unix-style** (`ls -l`):
//!    `-rw-r--r--   1 owner group 1234 Sep 14 09:42 file.txt`
//!    (a variant without the owner column is also recognised)
//! 2. **MS/DOS-style** (IIS):
//!    `10-23-01  03:25PM       <DIR>          dirname`
//!
//! Listing timestamps are given in the server's time zone; parsers
//! subtract the host's time shift to produce UTC epoch seconds.
//! Custom parsers implement the same two-method contract and are
//! installed with `FtpHost::set_parser`.

use crate::error::{FtpError, FtpResult};
use crate::types::{
    StatRecord, DAY_PRECISION, MINUTE_PRECISION, S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK,
    S_IFREG, S_IFSOCK, S_ISGID, S_ISUID, S_ISVTX,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Summary preamble emitted by many servers ("total 23").
    static ref TOTAL_RE: Regex = Regex::new(r"^total\s+\d+").unwrap();
}

/// Parser for one directory-listing format.
pub trait Parser {
    /// Whether the line carries no entry data and should be skipped.
    /// The default ignores empty lines and the `total N` preamble.
    fn ignores_line(&self, line: &str) -> bool {
        line.trim().is_empty() || TOTAL_RE.is_match(line)
    }

    /// Parse one non-ignored line into a stat record. `time_shift` is
    /// `server time − UTC` in seconds.
    fn parse_line(&self, line: &str, time_shift: f64) -> FtpResult<StatRecord>;
}

// ─── Shared parsing helpers ──────────────────────────────────────────

fn as_int<T: std::str::FromStr>(value: &str, what: &str) -> FtpResult<T> {
    value
        .parse()
        .map_err(|_| FtpError::parser_failure(format!("non-integer {} value '{}'", what, value)))
}

fn month_number(abbreviation: &str) -> FtpResult<u32> {
    let number = match abbreviation.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => {
            return Err(FtpError::parser_failure(format!(
                "invalid month abbreviation '{}'",
                abbreviation
            )))
        }
    };
    Ok(number)
}

/// UTC datetime from components. Out-of-range components fail, they
/// never wrap.
fn datetime_utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> FtpResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            FtpError::parser_failure(format!(
                "invalid datetime '{:04}-{:02}-{:02} {:02}:{:02}'",
                year, month, day, hour, minute
            ))
        })
}

/// Whitespace-split into at most `limit` fields; the last field is the
/// remainder of the line with leading whitespace removed, so names may
/// contain spaces.
fn split_limited(line: &str, limit: usize) -> Vec<&str> {
    let mut parts = Vec::with_capacity(limit);
    let mut rest = line;
    while parts.len() + 1 < limit {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(&rest[..end]);
                rest = &rest[end..];
            }
            None => {
                parts.push(rest);
                rest = "";
            }
        }
    }
    let rest = rest.trim_start();
    if !rest.is_empty() {
        parts.push(rest);
    }
    parts
}

/// Decode a ten-character mode string like `drwxr-sr-x`.
fn parse_unix_mode(mode_string: &str) -> FtpResult<u32> {
    let chars: Vec<char> = mode_string.chars().collect();
    if chars.len() != 10 {
        return Err(FtpError::parser_failure(format!(
            "invalid mode string '{}'",
            mode_string
        )));
    }
    let mut mode = 0u32;
    for (index, &c) in chars[1..].iter().enumerate() {
        let bit = 1u32 << (8 - index);
        match (index, c) {
            (_, '-') => {}
            // setuid/setgid/sticky; lowercase also grants execute.
            (2, 's') => mode |= bit | S_ISUID,
            (2, 'S') => mode |= S_ISUID,
            (5, 's') => mode |= bit | S_ISGID,
            (5, 'S') => mode |= S_ISGID,
            (8, 't') => mode |= bit | S_ISVTX,
            (8, 'T') => mode |= S_ISVTX,
            _ => mode |= bit,
        }
    }
    mode |= match chars[0] {
        'b' => S_IFBLK,
        'c' => S_IFCHR,
        'd' => S_IFDIR,
        'l' => S_IFLNK,
        'p' => S_IFIFO,
        's' => S_IFSOCK,
        '-' => S_IFREG,
        // `ls` itself prints this for types it cannot identify.
        '?' => 0,
        other => {
            return Err(FtpError::parser_failure(format!(
                "unknown file type character '{}'",
                other
            )))
        }
    };
    Ok(mode)
}

/// Parse a Unix listing timestamp (`Sep 14 09:42` or `Sep 14  2019`)
/// into `(mtime, precision)`, both relative to UTC.
///
/// A `HH:MM` token carries no year. The year is taken from the
/// server's current time (`now` plus the time shift); if that makes
/// the timestamp more than one day in the server's future, the entry
/// is from last year. When in doubt a file is assumed to be new, not
/// to be to-the-minute one year old.
fn parse_unix_time(
    month_abbreviation: &str,
    day: &str,
    year_or_time: &str,
    time_shift: f64,
    now: DateTime<Utc>,
) -> FtpResult<(f64, Option<f64>)> {
    let month = month_number(month_abbreviation)?;
    let day: u32 = as_int(day, "day")?;
    let shift_seconds = time_shift as i64;
    let (server_datetime, precision) = if !year_or_time.contains(':') {
        let year: i32 = as_int(year_or_time, "year")?;
        (datetime_utc(year, month, day, 0, 0)?, DAY_PRECISION)
    } else {
        let (hour_str, minute_str) = year_or_time.split_once(':').unwrap_or((year_or_time, ""));
        let hour: u32 = as_int(hour_str, "hour")?;
        let minute: u32 = as_int(minute_str, "minute")?;
        let server_now = now + Duration::seconds(shift_seconds);
        let mut year = server_now.year();
        let candidate = datetime_utc(year, month, day, hour, minute)?;
        // Compare against the server's "now" truncated to the minute,
        // since listing times are truncated the same way.
        let server_now_minute = server_now.timestamp() - server_now.timestamp().rem_euclid(60);
        if candidate.timestamp() > server_now_minute + 24 * 3600 {
            year -= 1;
        }
        (
            datetime_utc(year, month, day, hour, minute)?,
            MINUTE_PRECISION,
        )
    };
    let utc = server_datetime - Duration::seconds(shift_seconds);
    let mtime = utc.timestamp() as f64;
    if mtime < 0.0 {
        // Before the epoch; the clamped value says nothing about precision.
        Ok((0.0, None))
    } else {
        Ok((mtime, Some(precision)))
    }
}

/// Parse an MS/DOS listing timestamp (`10-23-01` + `03:25PM`) into
/// `(mtime, precision)`.
fn parse_ms_time(date: &str, time: &str, time_shift: f64) -> FtpResult<(f64, Option<f64>)> {
    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() != 3 {
        return Err(FtpError::parser_failure(format!(
            "invalid date string '{}'",
            date
        )));
    }
    let month: u32 = as_int(parts[0], "month")?;
    let day: u32 = as_int(parts[1], "day")?;
    let mut year: i32 = as_int(parts[2], "year")?;
    if year < 70 {
        year += 2000;
    } else if year < 1000 {
        year += 1900;
    }
    if time.len() < 6 || !time.is_ascii() {
        return Err(FtpError::parser_failure(format!(
            "invalid time string '{}'",
            time
        )));
    }
    let mut hour: u32 = as_int(&time[0..2], "hour")?;
    let minute: u32 = as_int(&time[3..5], "minute")?;
    match &time[5..6] {
        "A" | "a" => {
            if hour == 12 {
                hour = 0;
            }
        }
        "P" | "p" => {
            if hour != 12 {
                hour += 12;
            }
        }
        other => {
            return Err(FtpError::parser_failure(format!(
                "invalid am/pm marker '{}'",
                other
            )))
        }
    }
    let server_datetime = datetime_utc(year, month, day, hour, minute)?;
    let utc = server_datetime - Duration::seconds(time_shift as i64);
    let mtime = utc.timestamp() as f64;
    if mtime < 0.0 {
        Ok((0.0, None))
    } else {
        Ok((mtime, Some(MINUTE_PRECISION)))
    }
}

// ─── Unix parser ─────────────────────────────────────────────────────

/// Parser for `ls -l` style listings.
pub struct UnixParser {
    /// Clock used for year inference; injectable for tests.
    now: fn() -> DateTime<Utc>,
}

impl UnixParser {
    pub fn new() -> Self {
        Self { now: Utc::now }
    }

    pub fn with_now(now: fn() -> DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Split a line into (mode, nlink, user, group, size, month, day,
    /// year_or_time, name). Some servers omit the user column; then
    /// the sixth whitespace field is the day number instead of the
    /// month abbreviation.
    fn split_line(line: &str) -> FtpResult<[Option<&str>; 9]> {
        let probe: Vec<&str> = line.split_whitespace().collect();
        if probe.len() < 8 {
            return Err(FtpError::parser_failure(format!(
                "line '{}' can't be parsed",
                line
            )));
        }
        let has_user_field = probe[5].parse::<u64>().is_err();
        if has_user_field {
            let p = split_limited(line, 9);
            if p.len() < 9 {
                return Err(FtpError::parser_failure(format!(
                    "line '{}' can't be parsed",
                    line
                )));
            }
            Ok([
                Some(p[0]),
                Some(p[1]),
                Some(p[2]),
                Some(p[3]),
                Some(p[4]),
                Some(p[5]),
                Some(p[6]),
                Some(p[7]),
                Some(p[8]),
            ])
        } else {
            let p = split_limited(line, 8);
            if p.len() < 8 {
                return Err(FtpError::parser_failure(format!(
                    "line '{}' can't be parsed",
                    line
                )));
            }
            Ok([
                Some(p[0]),
                Some(p[1]),
                None,
                Some(p[2]),
                Some(p[3]),
                Some(p[4]),
                Some(p[5]),
                Some(p[6]),
                Some(p[7]),
            ])
        }
    }
}

impl Default for UnixParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for UnixParser {
    fn parse_line(&self, line: &str, time_shift: f64) -> FtpResult<StatRecord> {
        let [mode_string, nlink, user, group, size, month, day, year_or_time, name_field] =
            Self::split_line(line)?;
        // The array is fully populated except possibly the user slot.
        let (mode_string, nlink, group, size, month, day, year_or_time, name_field) = (
            mode_string.unwrap_or_default(),
            nlink.unwrap_or_default(),
            group.unwrap_or_default(),
            size.unwrap_or_default(),
            month.unwrap_or_default(),
            day.unwrap_or_default(),
            year_or_time.unwrap_or_default(),
            name_field.unwrap_or_default(),
        );
        let mode = parse_unix_mode(mode_string)?;
        let nlink: u32 = as_int(nlink, "nlink")?;
        let size: u64 = as_int(size, "size")?;
        let (mtime, mtime_precision) =
            parse_unix_time(month, day, year_or_time, time_shift, (self.now)())?;
        let (name, target) = match name_field.matches(" -> ").count() {
            0 => (name_field.to_string(), None),
            1 => {
                let (name, target) = name_field
                    .split_once(" -> ")
                    .unwrap_or((name_field, ""));
                (name.to_string(), Some(target.to_string()))
            }
            _ => {
                return Err(FtpError::parser_failure(format!(
                    "name '{}' contains more than one \"->\"",
                    name_field
                )))
            }
        };
        Ok(StatRecord {
            mode,
            ino: None,
            dev: None,
            nlink: Some(nlink),
            uid: user.map(str::to_string),
            gid: Some(group.to_string()),
            size,
            atime: None,
            mtime,
            ctime: None,
            name,
            target,
            mtime_precision,
        })
    }
}

// ─── MS/DOS parser ───────────────────────────────────────────────────

/// Parser for the "Microsoft format" (IIS and friends).
#[derive(Default)]
pub struct MsdosParser;

impl MsdosParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for MsdosParser {
    fn parse_line(&self, line: &str, time_shift: f64) -> FtpResult<StatRecord> {
        let parts = split_limited(line, 4);
        if parts.len() < 4 {
            return Err(FtpError::parser_failure(format!(
                "line '{}' can't be parsed",
                line
            )));
        }
        let (date, time, dir_or_size, name) = (parts[0], parts[1], parts[2], parts[3]);
        // The format shows no permissions; assume read access only.
        let (mode, size) = if dir_or_size == "<DIR>" {
            (0o400 | S_IFDIR, 0)
        } else {
            (0o400 | S_IFREG, as_int(dir_or_size, "size")?)
        };
        let (mtime, mtime_precision) = parse_ms_time(date, time, time_shift)?;
        Ok(StatRecord {
            mode,
            ino: None,
            dev: None,
            nlink: None,
            uid: None,
            gid: None,
            size,
            atime: None,
            mtime,
            ctime: None,
            name: name.to_string(),
            target: None,
            mtime_precision,
        })
    }
}
