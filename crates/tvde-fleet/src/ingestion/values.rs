use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Parses money in either European (`1.234,56`) or plain (`1234.56`) notation.
///
/// Empty cells are zero; `None` means the cell is not a number.
pub(crate) fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .replace("EUR", "")
        .replace("eur", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€' && *c != '\u{a0}' && *c != '+')
        .collect();
    if cleaned.is_empty() || cleaned == "-" {
        return Some(0.0);
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let canonical = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) if cleaned.matches(',').count() == 1 => cleaned.replace(',', "."),
        (None, Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    canonical.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Whole counts such as trips; tolerates `12,0` style exports.
pub(crate) fn parse_count(raw: &str) -> Option<u32> {
    let value = parse_amount(raw)?;
    (value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX)).then_some(value as u32)
}

pub(crate) fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_datetime(raw).map(|dt| dt.date())
}

/// Picks `;` when it dominates the header line, `,` otherwise.
pub(crate) fn sniff_delimiter(input: &str) -> u8 {
    let header = input
        .trim_start_matches('\u{feff}')
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default();

    let mut in_quotes = false;
    let (mut semicolons, mut commas) = (0usize, 0usize);
    for c in header.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => semicolons += 1,
            ',' if !in_quotes => commas += 1,
            _ => {}
        }
    }
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_accept_local_and_plain_notation() {
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("1234.56"), Some(1234.56));
        assert_eq!(parse_amount("12,50 €"), Some(12.5));
        assert_eq!(parse_amount("-3,20"), Some(-3.2));
        assert_eq!(parse_amount("1,234.50"), Some(1234.5));
        assert_eq!(parse_amount("1.000.000"), Some(1_000_000.0));
        assert_eq!(parse_amount(""), Some(0.0));
        assert_eq!(parse_amount("n/a"), None);
    }

    #[test]
    fn dates_accept_common_export_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 14).expect("date");
        for raw in [
            "2025-03-14",
            "14/03/2025",
            "14-03-2025 08:15",
            "14/03/2025 08:15:30",
            "2025-03-14T08:15:00+00:00",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_date("03/2025"), None);
    }

    #[test]
    fn counts_reject_fractions() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("12,0"), Some(12));
        assert_eq!(parse_count("1,5"), None);
    }

    #[test]
    fn delimiter_sniffing_ignores_quoted_separators() {
        assert_eq!(sniff_delimiter("Data;Valor;\"Local, Norte\"\n"), b';');
        assert_eq!(sniff_delimiter("\u{feff}date,amount\n"), b',');
        assert_eq!(sniff_delimiter("\"a;b;c\",d\n"), b',');
    }
}
