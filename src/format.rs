//! Locale-aware number rendering.
//!
//! Output cells use a comma as the decimal separator (`12,34%`). Parsing accepts
//! either separator. Conversions never fail loudly: anything unparseable becomes
//! `None` and ends up as an empty cell.

/// Cell contents that mean "no value" and are blanked before writing.
const NAN_SENTINELS: [&str; 4] = ["nan", "nan%", "none", ""];

/// Parses a decimal written with a comma or a dot separator.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let value = raw.trim().replace(',', ".").parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Parses a plain decimal or a percentage; `"12,34%"` gives `0.1234`.
pub fn to_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.strip_suffix('%') {
        Some(points) => parse_percent_points(points).map(|p| p / 100.),
        None => parse_decimal(raw),
    }
}

/// Parses a percentage as points, the `%` sign being optional; `"5,00%"` gives `5.0`.
pub fn parse_percent_points(raw: &str) -> Option<f64> {
    parse_decimal(raw.trim().trim_end_matches('%'))
}

/// Renders a fraction as a comma-separated percentage, `"NaN"` if `raw` is not a number.
pub fn to_percent_string(raw: &str) -> String {
    match parse_decimal(raw) {
        Some(fraction) => fraction_to_percent(fraction),
        None => "NaN".to_string(),
    }
}

/// `0.1234` -> `"12,34%"`.
pub fn fraction_to_percent(fraction: f64) -> String {
    points_to_percent(fraction * 100.)
}

/// `12.34` -> `"12,34%"`.
pub fn points_to_percent(points: f64) -> String {
    format!("{}%", format_decimal(points, 2))
}

/// Fixed-precision rendering with a comma separator.
pub fn format_decimal(value: f64, precision: usize) -> String {
    localize_decimal(&format!("{value:.precision$}"))
}

/// Rewrites the fractional separator from dot to comma.
pub fn localize_decimal(raw: &str) -> String {
    raw.replace('.', ",")
}

/// Rounds to `precision` places the way the fixed-precision rendering does.
pub fn round_to(value: f64, precision: usize) -> f64 {
    format!("{value:.precision$}").parse().unwrap_or(value)
}

/// Best-effort rounding of a cell.
pub fn to_rounded_number(raw: &str, precision: usize) -> Option<f64> {
    parse_decimal(raw).map(|v| round_to(v, precision))
}

pub fn is_nan_sentinel(cell: &str) -> bool {
    let cell = cell.trim().to_lowercase();
    NAN_SENTINELS.contains(&cell.as_str())
}

/// Blanks NaN-like cells, leaves everything else untouched.
pub fn clean_cell(cell: String) -> String {
    if is_nan_sentinel(&cell) {
        String::new()
    } else {
        cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_from_either_separator() {
        assert_eq!(to_percent_string("0.1234"), "12,34%");
        assert_eq!(to_percent_string("0,1234"), "12,34%");
        assert_eq!(to_percent_string("-0,05"), "-5,00%");
        assert_eq!(to_percent_string("1"), "100,00%");
    }

    #[test]
    fn unparseable_percent_is_nan() {
        assert_eq!(to_percent_string("n.d."), "NaN");
        assert_eq!(to_percent_string(""), "NaN");
        assert_eq!(to_percent_string("abc"), "NaN");
    }

    #[test]
    fn percent_round_trip() {
        let number = to_number("12,34%").unwrap();
        assert_eq!(fraction_to_percent(number), "12,34%");
        assert_eq!(to_percent_string(&number.to_string()), "12,34%");
    }

    #[test]
    fn percent_points() {
        assert_eq!(parse_percent_points("5,00%"), Some(5.0));
        assert_eq!(parse_percent_points("-1.5"), Some(-1.5));
        assert_eq!(parse_percent_points("NaN%"), None);
    }

    #[test]
    fn rounded_number_is_best_effort() {
        assert_eq!(to_rounded_number("1,23456", 3), Some(1.235));
        assert_eq!(to_rounded_number("0.1", 3), Some(0.1));
        assert_eq!(to_rounded_number("n/a", 3), None);
    }

    #[test]
    fn infinities_are_not_numbers() {
        assert_eq!(parse_decimal("inf"), None);
        assert_eq!(parse_decimal("NaN"), None);
    }

    #[test]
    fn sentinels_are_blanked_case_insensitively() {
        for cell in ["nan", "NaN", "NaN%", "NAN%", "None", "none", "", "  "] {
            assert_eq!(clean_cell(cell.to_string()), "", "{cell:?}");
        }
        assert_eq!(clean_cell("2,94%".to_string()), "2,94%");
        assert_eq!(clean_cell("0".to_string()), "0");
    }
}
