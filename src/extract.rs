use once_cell::sync::Lazy;
use regex::Regex;

/// What could be recovered from the order metadata. Either half may be
/// missing; callers decide how to fill the gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub target: Option<String>,
    pub quantity: Option<u32>,
}

static QUANTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Звёзды,\s*(\d+)\s*звёзд").expect("quantity regex"));
static TARGET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"По username,\s*([^\s,]+)").expect("target regex"));
static FIRST_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("integer regex"));

/// Parameter labels the marketplace uses for the delivery handle.
const TARGET_LABELS: &[&str] = &["По username", "Username", "Telegram username"];
/// Parameter labels carrying the star quantity.
const QUANTITY_LABELS: &[&str] = &["Количество", "Количество звёзд", "Quantity"];

/// Pull `(target, quantity)` out of a free-text order title, e.g.
/// `"Telegram, Звёзды, 50 звёзд, По username, zzorenko"`.
pub fn extract_from_text(text: &str) -> Extraction {
    let quantity = QUANTITY_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    let target = TARGET_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| normalize_target(m.as_str()))
        .filter(|t| !t.is_empty());
    Extraction { target, quantity }
}

/// Structured variant: the listing exposes `(label, value)` parameters and
/// we look the fields up by their known labels. The quantity value may carry
/// surrounding text ("50 шт."), so only its first embedded integer counts.
pub fn extract_from_params(params: &[(String, String)]) -> Extraction {
    let target = lookup(params, TARGET_LABELS)
        .map(|value| normalize_target(value.trim()))
        .filter(|t| !t.is_empty());
    let quantity = lookup(params, QUANTITY_LABELS)
        .and_then(|value| FIRST_INT_RE.find(value))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    Extraction { target, quantity }
}

fn lookup<'a>(params: &'a [(String, String)], labels: &[&str]) -> Option<&'a str> {
    params
        .iter()
        .find(|(label, _)| labels.iter().any(|known| label.eq_ignore_ascii_case(known)))
        .map(|(_, value)| value.as_str())
}

/// Targets travel through the pipeline without the leading `@`; user-facing
/// messages add it back.
pub fn normalize_target(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn text_with_target_and_quantity() {
        let out = extract_from_text("Telegram, Звёзды, 50 звёзд, По username, zzorenko");
        assert_eq!(out.target.as_deref(), Some("zzorenko"));
        assert_eq!(out.quantity, Some(50));
    }

    #[test]
    fn text_without_target() {
        let out = extract_from_text("Telegram, Звёзды, 100 звёзд, быстрая доставка");
        assert_eq!(out.target, None);
        assert_eq!(out.quantity, Some(100));
    }

    #[test]
    fn text_without_quantity() {
        let out = extract_from_text("По username, @somebody");
        assert_eq!(out.target.as_deref(), Some("somebody"));
        assert_eq!(out.quantity, None);
    }

    #[test]
    fn garbled_text_yields_empty_extraction() {
        assert_eq!(extract_from_text(""), Extraction::default());
        assert_eq!(extract_from_text("random title"), Extraction::default());
    }

    #[test]
    fn params_with_known_labels() {
        let out = extract_from_params(&params(&[
            ("По username", "@buyer_handle"),
            ("Количество", "75 шт."),
        ]));
        assert_eq!(out.target.as_deref(), Some("buyer_handle"));
        assert_eq!(out.quantity, Some(75));
    }

    #[test]
    fn params_quantity_takes_first_embedded_integer() {
        let out = extract_from_params(&params(&[("Quantity", "pack of 50 (x2 bonus 10)")]));
        assert_eq!(out.quantity, Some(50));
    }

    #[test]
    fn params_absent_labels_yield_none() {
        let out = extract_from_params(&params(&[("Цвет", "синий")]));
        assert_eq!(out, Extraction::default());
    }

    #[test]
    fn blank_target_value_is_treated_as_missing() {
        let out = extract_from_params(&params(&[("Username", "  @ ")]));
        assert_eq!(out.target, None);
    }
}
