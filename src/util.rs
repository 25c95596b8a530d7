// Utility helpers for parsing, summation and display formatting.
//
// This module centralizes all the "dirty" CSV/number/date handling so the
// rest of the code can assume clean, typed values.
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Coerce a money or serial-day cell to a number.
///
/// Spreadsheet exports write large amounts in exponent form (`1.5E+07`) and
/// sometimes with thousands separators; both are accepted. Blanks, free text
/// and non-finite spellings (`NaN`, `inf`) are "no number".
pub fn parse_f64_safe(cell: Option<&str>) -> Option<f64> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }
    let digits: String = cell.chars().filter(|c| *c != ',').collect();
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a spreadsheet serial day number into a calendar date.
///
/// Serial day 0 is 1899-12-30, the anchor used by the Excel/Lotus system.
/// Anchoring there (rather than at 1900-01-01) absorbs the phantom
/// 1900-02-29 so every serial from 61 onwards lands on the real date.
/// The fractional part (time of day) is discarded.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor();
    // chrono cannot represent dates much beyond +/- 262,000 years anyway.
    if days.abs() > 90_000_000.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(days as i64))
}

/// Coerce a raw cell into a serial date; anything non-numeric is "no date".
pub fn parse_serial_date(s: Option<&str>) -> Option<NaiveDate> {
    parse_f64_safe(s).and_then(serial_to_date)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %b %Y", "%d-%b-%Y", "%d %B %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];

/// Parse an already calendar-formatted date (never a serial number).
///
/// Accepts plain dates in a handful of common layouts, date-times with or
/// without fractional seconds, and RFC 3339 timestamps. Returns `None` for
/// blanks and anything unrecognized.
pub fn parse_calendar_date(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    // Last resort: an ISO date prefix followed by something we don't know.
    s.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Running sum with Neumaier compensation.
///
/// Tens of thousands of financial-magnitude values (including reversals)
/// lose cents under naive `f64` accumulation; the compensation term keeps
/// the low-order bits that each addition would otherwise drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct Total {
    sum: f64,
    compensation: f64,
}

impl Total {
    pub fn add(&mut self, v: f64) {
        let t = self.sum + v;
        if self.sum.abs() >= v.abs() {
            self.compensation += (self.sum - t) + v;
        } else {
            self.compensation += (v - t) + self.sum;
        }
        self.sum = t;
    }

    pub fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

impl FromIterator<f64> for Total {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut total = Total::default();
        for v in iter {
            total.add(v);
        }
        total
    }
}

/// USD amount with `decimals` places and English thousands separators.
pub fn format_number(n: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let grouped = whole
        .parse::<u64>()
        .map(|w| w.to_formatted_string(&Locale::en))
        .unwrap_or_else(|_| whole.to_string());
    let sign = if n < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };
    if cents.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, cents)
    }
}

/// Row and transaction counts for console notes.
pub fn format_int<T: ToFormattedString>(n: T) -> String {
    n.to_formatted_string(&Locale::en)
}

const WORD_SCALES: &[(f64, &str)] = &[
    (1e15, "quadrillion"),
    (1e12, "trillion"),
    (1e9, "billion"),
    (1e6, "million"),
];

/// Render large amounts as words, e.g. `1.2 billion`.
///
/// Values under a million are printed in full with separators.
pub fn humanize(n: f64) -> String {
    let abs_n = n.abs();
    for (scale, word) in WORD_SCALES {
        if abs_n >= *scale {
            let sign = if n < 0.0 { "-" } else { "" };
            return format!("{}{:.1} {}", sign, abs_n / scale, word);
        }
    }
    format_number(n, 0)
}

// `tabled` display hooks. Row structs keep raw numerics; only previews
// are formatted.
pub fn display_usd(v: &f64) -> String {
    humanize(*v)
}

pub fn display_opt_year(v: &Option<i32>) -> String {
    v.map(|y| y.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn serial_epoch_matches_spreadsheet_convention() {
        assert_eq!(serial_to_date(0.0), Some(ymd(1899, 12, 30)));
        assert_eq!(serial_to_date(1.0), Some(ymd(1899, 12, 31)));
        assert_eq!(serial_to_date(61.0), Some(ymd(1900, 3, 1)));
        assert_eq!(serial_to_date(43831.0), Some(ymd(2020, 1, 1)));
    }

    #[test]
    fn serial_drops_time_of_day() {
        assert_eq!(serial_to_date(43831.75), Some(ymd(2020, 1, 1)));
        assert_eq!(serial_to_date(-1.0), Some(ymd(1899, 12, 29)));
        assert_eq!(serial_to_date(f64::NAN), None);
    }

    #[test]
    fn serial_cells_are_coerced() {
        assert_eq!(parse_serial_date(Some(" 43,831 ")), Some(ymd(2020, 1, 1)));
        assert_eq!(parse_serial_date(Some("")), None);
        assert_eq!(parse_serial_date(Some("n/a")), None);
        assert_eq!(parse_serial_date(Some("2020-01-01")), None);
        assert_eq!(parse_serial_date(None), None);
    }

    #[test]
    fn amounts_accept_exponents_but_not_text() {
        assert_eq!(parse_f64_safe(Some("1.5E+07")), Some(15_000_000.0));
        assert_eq!(parse_f64_safe(Some("2.5e-1")), Some(0.25));
        assert_eq!(parse_f64_safe(Some("-1,234.5")), Some(-1234.5));
        assert_eq!(parse_f64_safe(Some("NaN")), None);
        assert_eq!(parse_f64_safe(Some("inf")), None);
        assert_eq!(parse_f64_safe(Some("USD 10")), None);
        assert_eq!(parse_serial_date(Some("4.3831E+04")), Some(ymd(2020, 1, 1)));
    }

    #[test]
    fn calendar_dates_in_common_layouts() {
        let want = Some(ymd(2015, 6, 30));
        assert_eq!(parse_calendar_date(Some("2015-06-30")), want);
        assert_eq!(parse_calendar_date(Some("2015-06-30 00:00:00")), want);
        assert_eq!(parse_calendar_date(Some("2015-06-30T12:30:00.000")), want);
        assert_eq!(parse_calendar_date(Some("2015-06-30T12:30:00+10:00")), want);
        assert_eq!(parse_calendar_date(Some("06/30/2015")), want);
        assert_eq!(parse_calendar_date(Some("30 Jun 2015")), want);
        assert_eq!(parse_calendar_date(Some("not a date")), None);
        assert_eq!(parse_calendar_date(Some("  ")), None);
    }

    #[test]
    fn compensated_total_keeps_small_amounts() {
        let mut naive = 0.0f64;
        let mut total = Total::default();
        for v in [1e16, 1.0, -1e16, 1.0] {
            naive += v;
            total.add(v);
        }
        assert_eq!(total.value(), 2.0);
        assert_ne!(naive, 2.0);
    }

    #[test]
    fn humanized_words() {
        assert_eq!(humanize(1_234_000_000.0), "1.2 billion");
        assert_eq!(humanize(-5_500_000.0), "-5.5 million");
        assert_eq!(humanize(12_345.0), "12,345");
    }

    #[test]
    fn numbers_get_separators() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-42.0, 0), "-42");
        assert_eq!(format_int(9855), "9,855");
    }
}
