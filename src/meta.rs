//! Метаданные выписки: дата оценки и итог портфеля, указанный в документе.

use std::sync::LazyLock;

use regex::Regex;

use crate::numbers::parse_amount;
use crate::types::StatementMeta;
use crate::utils::{capture_text, parse_date};

static VALUATION_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:valuation(?:\s+date)?(?:\s+as\s+of)?|as\s+of|per|stichtag|bewertung\s+per)\s*:?\s*(\d{2}\.\d{2}\.\d{4})",
    )
    .expect("valid valuation date regex")
});

static STATED_TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:total\s+assets|total\s+portfolio|portfolio\s+total|grand\s+total|total\s+value|gesamtvermögen)\b[^\d\n]{0,30}?(\d(?:[\d'’.,]*\d)?)",
    )
    .expect("valid stated total regex")
});

/// Извлекает метаданные из текста выписки.
///
/// Отсутствие полей — нормальный случай: поля остаются `None`.
pub fn parse_meta(text: &str) -> StatementMeta {
    let valuation_date = capture_text(text, &VALUATION_DATE_RE).and_then(|d| parse_date(&d));

    // Итог обычно стоит в конце выписки, поэтому берём последнее совпадение.
    let stated_total = STATED_TOTAL_RE
        .captures_iter(text)
        .filter_map(|caps| parse_amount(&caps[1]))
        .last();

    StatementMeta {
        valuation_date,
        stated_total,
    }
}
