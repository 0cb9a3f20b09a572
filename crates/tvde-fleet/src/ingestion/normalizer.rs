/// Canonical form of a CSV heading so exports in either language and with
/// decorations (BOM, accents, currency markers) land on the same key.
pub(crate) fn normalize_header(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}', '\u{a0}'], " ");
    let without_currency = cleaned.replace('€', "");
    let ascii = deunicode::deunicode(&without_currency).to_ascii_lowercase();
    let ascii = ascii.replace("()", "").replace("[]", "").replace('_', " ");
    let mut collapsed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");

    for suffix in [" (eur)", " eur", "|"] {
        if let Some(stripped) = collapsed.strip_suffix(suffix) {
            collapsed = stripped.trim_end().to_string();
        }
    }
    collapsed
        .trim_end_matches(|c: char| c == '|' || c == ':' || c.is_whitespace())
        .to_string()
}

/// Comparison key for people's names coming from different exports.
pub(crate) fn normalize_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let ascii = deunicode::deunicode(&cleaned);
    let collapsed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_lose_accents_and_currency() {
        assert_eq!(normalize_header("\u{feff}Matrícula"), "matricula");
        assert_eq!(normalize_header("Valor (€)"), "valor");
        assert_eq!(normalize_header("Ganhos   brutos | €"), "ganhos brutos");
        assert_eq!(normalize_header("Portagem (EUR)"), "portagem");
        assert_eq!(normalize_header("Driver_UUID"), "driver uuid");
        assert_eq!(normalize_header("Energia (kWh)"), "energia (kwh)");
    }

    #[test]
    fn names_compare_without_accents_or_case() {
        assert_eq!(normalize_name("  João   Simões "), "joao simoes");
    }
}
