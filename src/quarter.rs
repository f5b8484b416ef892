//! Quarter labels.
//!
//! Every company writes its quarters differently (`1T25`, `1Q2025`, `1º25`).
//! Everything downstream works on the canonical `<quarter>Q<yy>` form and sorts
//! it with [`sort_key`].

use std::{fmt, str::FromStr};

use anyhow::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use time::Date;

static RAW_QUARTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*([0-9])[TQº]?\s?([0-9]{2,4})").expect("valid quarter pattern")
});
static CANONICAL_QUARTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9])Q([0-9]{2})").expect("valid canonical pattern"));

/// Sort key given to labels that are not quarters, placing them last.
pub const UNPARSEABLE_KEY: (i32, i32) = (9999, 9);

/// Two-digit years below 80 are read as 20xx, the rest as 19xx.
fn full_year(year: u8) -> i32 {
    let year = i32::from(year);
    if year < 80 {
        year + 2000
    } else {
        year + 1900
    }
}

/// Leading digit and two-digit year of any source spelling. The digit is not range
/// checked here.
fn split_raw(raw: &str) -> Option<(u8, u8)> {
    let caps = RAW_QUARTER.captures(raw)?;
    let digits = &caps[2];
    Some((caps[1].parse().ok()?, digits[digits.len() - 2..].parse().ok()?))
}

/// A quarter of a year, 1 to 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuarterLabel {
    quarter: u8,
    year: u8,
}

impl QuarterLabel {
    pub fn new(quarter: u8, year: u8) -> Option<Self> {
        ((1..=4).contains(&quarter) && year < 100).then_some(Self { quarter, year })
    }

    pub fn from_date(date: Date) -> Self {
        let quarter = (u8::from(date.month()) - 1) / 3 + 1;
        Self {
            quarter,
            year: date.year().rem_euclid(100) as u8,
        }
    }

    /// Parses any of the source spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let (quarter, year) = split_raw(raw)?;
        Self::new(quarter, year)
    }

    pub fn full_year(&self) -> i32 {
        full_year(self.year)
    }

    pub fn sort_key(&self) -> (i32, i32) {
        (self.full_year(), i32::from(self.quarter))
    }
}

impl fmt::Display for QuarterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{:02}", self.quarter, self.year)
    }
}

impl FromStr for QuarterLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::msg(format!("'{s}' is not a quarter label")))
    }
}

impl PartialOrd for QuarterLabel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QuarterLabel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Canonicalizes a quarter label, whatever its leading digit. Anything else comes
/// back unchanged.
pub fn normalize(raw: &str) -> String {
    match split_raw(raw) {
        Some((quarter, year)) => format!("{quarter}Q{year:02}"),
        None => raw.to_string(),
    }
}

/// Chronological key `(full year, digit)` of a canonical label, [`UNPARSEABLE_KEY`]
/// for anything else.
pub fn sort_key(label: &str) -> (i32, i32) {
    CANONICAL_QUARTER
        .captures(label)
        .and_then(|caps| {
            let quarter: i32 = caps[1].parse().ok()?;
            let year: u8 = caps[2].parse().ok()?;
            Some((full_year(year), quarter))
        })
        .unwrap_or(UNPARSEABLE_KEY)
}

/// Stable chronological sort; non-quarters keep their relative order at the end.
pub fn sort_chronologically(labels: &mut [String]) {
    labels.sort_by_key(|l| sort_key(l));
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn normalizes_source_spellings() {
        assert_eq!(normalize("1T25"), "1Q25");
        assert_eq!(normalize("4Q2024"), "4Q24");
        assert_eq!(normalize("1º25"), "1Q25");
        assert_eq!(normalize("2t23"), "2Q23");
        assert_eq!(normalize("3q2019"), "3Q19");
        assert_eq!(normalize("2 24"), "2Q24");
        assert_eq!(normalize("324"), "3Q24");
    }

    #[test]
    fn passes_through_non_quarters() {
        assert_eq!(normalize("Trimestre"), "Trimestre");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("n.d."), "n.d.");
    }

    #[test]
    fn any_leading_digit_is_canonicalized() {
        assert_eq!(normalize("5T25"), "5Q25");
        assert_eq!(normalize("0t2025"), "0Q25");
        assert_eq!(sort_key("5Q25"), (2025, 5));
        let mut labels = vec!["5Q25".to_string(), "4Q25".to_string(), "1Q26".to_string()];
        sort_chronologically(&mut labels);
        assert_eq!(labels, ["4Q25", "5Q25", "1Q26"]);
        // Only 1 to 4 make a quarter value.
        assert!(QuarterLabel::parse("5T25").is_none());
    }

    #[test]
    fn non_ascii_digits_are_not_quarters() {
        assert_eq!(normalize("1Q\u{967}\u{968}"), "1Q\u{967}\u{968}");
        assert_eq!(normalize("\u{661}T25"), "\u{661}T25");
        assert_eq!(sort_key("1Q\u{967}\u{968}"), UNPARSEABLE_KEY);
        assert!(QuarterLabel::parse("1Q\u{967}\u{968}").is_none());
    }

    #[test]
    fn sorts_chronologically_across_centuries() {
        let mut labels = vec!["4Q24".to_string(), "1Q25".to_string(), "1Q20".to_string()];
        sort_chronologically(&mut labels);
        assert_eq!(labels, ["1Q20", "4Q24", "1Q25"]);

        let mut labels = vec!["1Q00".to_string(), "4Q99".to_string(), "2Q80".to_string()];
        sort_chronologically(&mut labels);
        assert_eq!(labels, ["2Q80", "4Q99", "1Q00"]);
    }

    #[test]
    fn unparseable_labels_sort_last() {
        assert_eq!(sort_key("Total"), UNPARSEABLE_KEY);
        let mut labels = vec!["Total".to_string(), "2Q24".to_string(), "1Q24".to_string()];
        sort_chronologically(&mut labels);
        assert_eq!(labels, ["1Q24", "2Q24", "Total"]);
    }

    #[test]
    fn quarter_from_month() {
        assert_eq!(QuarterLabel::from_date(date!(2024 - 01 - 01)).to_string(), "1Q24");
        assert_eq!(QuarterLabel::from_date(date!(2024 - 06 - 30)).to_string(), "2Q24");
        assert_eq!(QuarterLabel::from_date(date!(1999 - 12 - 01)).to_string(), "4Q99");
    }

    #[test]
    fn rejects_out_of_range_quarters() {
        assert!(QuarterLabel::new(0, 24).is_none());
        assert!(QuarterLabel::new(5, 24).is_none());
        assert!("9Q24".parse::<QuarterLabel>().is_err());
    }
}
