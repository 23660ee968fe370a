//! Сборка записи по бумаге: наименование, валюта, стоимость и уверенность.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::types::{Identifier, SecurityRecord, ValueMethod, ValueSelection};
use crate::utils::{normalize_chars, truncate_words};
use crate::window::ContextWindow;

/// Максимальная длина наименования в байтах.
pub const MAX_NAME_LEN: usize = 80;

/// Валюта по умолчанию, если в окне не нашлось ни одного кода.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Сколько соседних строк просматривать в поиске наименования.
const NAME_LINE_REACH: usize = 2;

static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(USD|CHF|EUR|GBP|JPY|CAD|AUD)\b").expect("valid currency regex")
});

// Подписи полей выписки, которые не могут быть частью наименования.
const LABELS: &[&str] = &[
    "ISIN", "VALOR", "VALORN", "VALOREN", "WKN", "NOMINAL", "QTY", "QUANTITY", "PRICE", "VALUE",
    "MARKET", "COUNTERVALUE", "TOTAL", "CURRENCY", "AMOUNT", "SHARES", "UNITS", "USD", "CHF", "EUR", "GBP", "JPY",
    "CAD", "AUD",
];

/// Собирает запись по идентификатору, окну и (возможно отсутствующему) выбору.
///
/// Без выбора запись получает нулевую стоимость, нулевую уверенность и метод
/// [`ValueMethod::Unresolved`]: это «не нашли», а не «стоимость равна нулю».
pub fn assemble(
    identifier: &Identifier,
    window: &ContextWindow<'_>,
    selection: Option<ValueSelection>,
) -> SecurityRecord {
    let name = extract_name(window).unwrap_or_else(|| placeholder_name(identifier));
    let currency = extract_currency(window);

    let selection = selection.filter(|s| {
        let ok = s.value >= Decimal::ZERO;
        if !ok {
            log::debug!("{}: dropping negative selection {}", identifier.code, s.value);
        }
        ok
    });

    match selection {
        Some(sel) => SecurityRecord {
            identifier: identifier.code.clone(),
            name,
            value: sel.value,
            currency,
            confidence: if sel.confidence.is_nan() {
                0.0
            } else {
                sel.confidence.clamp(0.0, 1.0)
            },
            method: ValueMethod::Heuristic,
            reasoning: sel.reasoning,
        },
        None => SecurityRecord {
            identifier: identifier.code.clone(),
            name,
            value: Decimal::ZERO,
            currency,
            confidence: 0.0,
            method: ValueMethod::Unresolved,
            reasoning: "no plausible value in context window".to_string(),
        },
    }
}

/// Заглушка наименования из префикса кода.
pub fn placeholder_name(identifier: &Identifier) -> String {
    let prefix: String = identifier.code.chars().take(4).collect();
    format!("Security {prefix}")
}

/// Ближайший к идентификатору код валюты в окне или `USD`.
pub fn extract_currency(window: &ContextWindow<'_>) -> String {
    CURRENCY_RE
        .find_iter(window.text())
        .min_by_key(|m| (window.start + m.start()).abs_diff(window.anchor.offset))
        .map_or_else(|| DEFAULT_CURRENCY.to_string(), |m| m.as_str().to_string())
}

/// Ищет наименование: сначала в строке идентификатора (перед ним, потом после),
/// затем в соседних строках, ближайшие первыми.
pub fn extract_name(window: &ContextWindow<'_>) -> Option<String> {
    let doc = window.document;
    let anchor_line = window.anchor_line();
    let line_start = line_offset(doc, window.anchor.offset);
    let before = &doc[line_start..window.anchor.offset];
    let after = &anchor_line[(window.anchor_end() - line_start).min(anchor_line.len())..];

    let lines: Vec<(usize, &str)> = window.lines().collect();
    let preceding = lines
        .iter()
        .rev()
        .filter(|(n, _)| *n < window.anchor.line)
        .take(NAME_LINE_REACH)
        .map(|(_, l)| *l);
    let following = lines
        .iter()
        .filter(|(n, _)| *n > window.anchor.line)
        .take(NAME_LINE_REACH)
        .map(|(_, l)| *l);

    name_runs(before)
        .pop()
        .or_else(|| name_runs(after).into_iter().next())
        .or_else(|| preceding.chain(following).find_map(|l| name_runs(l).into_iter().next()))
        .map(|name| {
            let cut = truncate_words(&name, MAX_NAME_LEN);
            if cut.is_empty() {
                truncate_bytes(&name, MAX_NAME_LEN).to_string()
            } else {
                cut
            }
        })
}

/// Префикс не длиннее `max` байт, обрезанный по границе символа.
fn truncate_bytes(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn line_offset(doc: &str, offset: usize) -> usize {
    doc[..offset].rfind('\n').map_or(0, |i| i + 1)
}

/// Последовательности слов с заглавной буквы; числа, подписи и коды их разрывают.
fn name_runs(segment: &str) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for raw in segment.split_whitespace() {
        let is_label = raw.ends_with(':');
        let word = raw.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '|'));
        if !is_label && is_name_word(word) {
            current.push(word);
        } else if !current.is_empty() {
            runs.push(normalize_chars(current.join(" ").chars()));
            current.clear();
        }
    }
    if !current.is_empty() {
        runs.push(normalize_chars(current.join(" ").chars()));
    }

    runs.retain(|r| r.chars().filter(|c| c.is_alphabetic()).count() >= 3);
    runs
}

fn is_name_word(word: &str) -> bool {
    let Some(first) = word.chars().next() else {
        return false;
    };
    if !first.is_uppercase() {
        return false;
    }
    let letters = word.chars().filter(|c| c.is_alphabetic()).count();
    let digits = word.chars().filter(char::is_ascii_digit).count();
    if digits > letters {
        return false;
    }
    let upper = word.to_uppercase();
    !LABELS.contains(&upper.trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::scan_identifiers;
    use crate::raw::LineIndex;
    use crate::window::build_window;

    fn record(text: &str, selection: Option<ValueSelection>) -> SecurityRecord {
        let index = LineIndex::new(text);
        let ids = scan_identifiers(text, &index, false);
        let window = build_window(&ids[0], ids[0].anchors[0], text, &index, &[], 5);
        assemble(&ids[0], &window, selection)
    }

    fn selection(value: i64) -> ValueSelection {
        ValueSelection {
            value: Decimal::from(value),
            confidence: 0.9,
            reasoning: "test".to_string(),
            offset: 0,
        }
    }

    #[test]
    fn name_before_identifier() {
        let rec = record("Bond XYZ ISIN: XS1234567893 value USD 1'000'000", Some(selection(1)));
        assert_eq!(rec.name, "Bond XYZ");
        assert_eq!(rec.currency, "USD");
        assert_eq!(rec.method, ValueMethod::Heuristic);
    }

    #[test]
    fn name_after_identifier() {
        let rec = record("CH0012032048 Nestle SA Namen-Akt. CHF 12'500", None);
        assert_eq!(rec.name, "Nestle SA Namen-Akt.");
        assert_eq!(rec.currency, "CHF");
    }

    #[test]
    fn name_from_previous_line() {
        let text = "TORONTO DOMINION BANK NOTES 23-23.02.27\nISIN: XS2993414619 Valorn.: 140610687";
        let rec = record(text, None);
        assert_eq!(rec.name, "TORONTO DOMINION BANK NOTES");
    }

    #[test]
    fn placeholder_when_no_name() {
        let rec = record("12 XS2993414619 99", None);
        assert_eq!(rec.name, "Security XS29");
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "Alpha ".repeat(30);
        let rec = record(&format!("{long}XS2993414619"), None);
        assert!(rec.name.len() <= MAX_NAME_LEN);
        assert!(rec.name.starts_with("Alpha Alpha"));
    }

    #[test]
    fn single_long_word_is_cut_by_bytes() {
        let word = "Ä".repeat(60);
        let rec = record(&format!("{word} XS2993414619"), None);
        assert!(rec.name.len() <= MAX_NAME_LEN);
        assert_eq!(rec.name, "Ä".repeat(MAX_NAME_LEN / 2));

        assert_eq!(truncate_bytes("aÄb", 2), "a");
        assert_eq!(truncate_bytes("abc", 10), "abc");
    }

    #[test]
    fn nearest_currency_wins() {
        let text = "EUR cash\nUS0378331005 Apple\nCHF far away";
        let rec = record(text, None);
        assert_eq!(rec.currency, "EUR");

        let rec = record("Apple US0378331005 GBP", None);
        assert_eq!(rec.currency, "GBP");

        let rec = record("Apple US0378331005", None);
        assert_eq!(rec.currency, DEFAULT_CURRENCY);
    }

    #[test]
    fn unresolved_is_not_zero_value() {
        let rec = record("Apple US0378331005", None);
        assert_eq!(rec.value, Decimal::ZERO);
        assert!(rec.confidence.abs() < f64::EPSILON);
        assert_eq!(rec.method, ValueMethod::Unresolved);
        assert!(!rec.is_resolved());
    }

    #[test]
    fn selector_output_is_sanitized() {
        let mut sel = selection(-5);
        let rec = record("Apple US0378331005", Some(sel.clone()));
        assert!(!rec.is_resolved());

        sel.value = Decimal::from(5_000);
        sel.confidence = 7.0;
        let rec = record("Apple US0378331005", Some(sel));
        assert!((rec.confidence - 1.0).abs() < f64::EPSILON);
    }
}
