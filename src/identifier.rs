//! Поиск кодов ценных бумаг (ISIN) в тексте.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use isin::ISIN;
use regex::Regex;

use crate::raw::LineIndex;
use crate::types::{Anchor, Identifier};

// Две буквы страны, девять буквенно-цифровых символов, контрольная цифра.
static ISIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z]{2}[A-Z0-9]{9}[0-9]\b").expect("valid isin regex"));

/// Проверяет контрольную цифру ISIN.
#[inline]
pub fn is_valid_isin(code: &str) -> bool {
    ISIN::from_str(code).is_ok()
}

/// Находит все ISIN в тексте.
///
/// Совпадения ищутся слева направо без перекрытий. Каждый код возвращается
/// один раз (в порядке первого появления), но со всеми вхождениями в `anchors`.
/// При `validate_checksum` коды с неверной контрольной цифрой отбрасываются
/// целиком: это ложные срабатывания внутри посторонних буквенно-цифровых строк.
pub fn scan_identifiers(text: &str, index: &LineIndex, validate_checksum: bool) -> Vec<Identifier> {
    let mut found: Vec<Identifier> = Vec::new();
    let mut by_code: HashMap<&str, usize> = HashMap::new();

    for m in ISIN_RE.find_iter(text) {
        let code = m.as_str();
        if validate_checksum && !is_valid_isin(code) {
            log::trace!("skipping {code}: checksum mismatch");
            continue;
        }
        let anchor = Anchor {
            offset: m.start(),
            line: index.line_of(m.start()),
        };
        if let Some(&slot) = by_code.get(code) {
            found[slot].anchors.push(anchor);
        } else {
            by_code.insert(code, found.len());
            found.push(Identifier {
                code: code.to_string(),
                anchors: vec![anchor],
            });
        }
    }

    found
}
