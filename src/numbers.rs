//! Поиск и нормализация числовых токенов в региональных форматах.
//!
//! Поддерживаются швейцарская (`1'234'567.89`), американская (`1,234,567.89`)
//! и европейская (`1.234.567,89`) группировки, сокращённая запись (`1.5M`)
//! и числа без разделителей. Неоднозначный токен с одним разделителем
//! считается десятичной дробью только при ровно двух цифрах после разделителя;
//! при ровно трёх цифрах разделитель трактуется как разрядный.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::raw::LineIndex;
use crate::types::{Money, NumberFormat, NumericToken};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d(?:[\d'’.,]*\d)?(?:[ \t]?(?:Mio|Mn|mn|Bn|bn)\b|[KkMB]\b)?")
        .expect("valid token regex")
});

static COMPACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:[.,]\d+)?)([ \t]?(?:Mio|Mn|mn|Bn|bn)|[KkMB])$")
        .expect("valid compact regex")
});

static SWISS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}(?:['’]\d{3})+(?:[.,]\d{1,2})?$").expect("valid swiss regex")
});

static TWO_DIGIT_DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.,]\d{2}$").expect("valid decimal regex"));

static US_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(?:,\d{3})+(?:\.\d+)?$").expect("valid us regex"));

static EUROPEAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}(?:\.\d{3})+(?:,\d+)?$").expect("valid european regex")
});

static PLAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:[.,]\d+)?$").expect("valid plain regex"));

/// Диапазон правдоподобных величин рыночной стоимости.
///
/// Это эвристика «похоже на стоимость позиции», а не гарантия корректности;
/// границы настраиваются через опции извлечения.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagnitudeRange {
    /// Нижняя граница (включительно).
    pub min: Money,
    /// Верхняя граница (включительно).
    pub max: Money,
}

impl MagnitudeRange {
    /// Создаёт диапазон без проверки границ.
    #[inline]
    pub const fn new(min: Money, max: Money) -> Self {
        Self { min, max }
    }

    /// Значение попадает в диапазон.
    #[inline]
    pub fn contains(&self, value: Money) -> bool {
        value >= self.min && value <= self.max
    }

    /// Границы упорядочены и неотрицательны.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min >= Decimal::ZERO && self.min <= self.max
    }
}

impl Default for MagnitudeRange {
    fn default() -> Self {
        Self::new(Decimal::from(1_000), Decimal::from(50_000_000))
    }
}

/// Нормализует числовую строку, определяя её формат.
///
/// Возвращает `None` для строк, не подходящих ни под один формат
/// (например, дат `31.03.2025`).
pub fn normalize(raw: &str) -> Option<(Money, NumberFormat)> {
    let raw = raw.trim();
    if let Some(caps) = COMPACT_RE.captures(raw) {
        let (mantissa, _) = normalize_grouped(&caps[1])?;
        let multiplier = match caps[2].trim_start() {
            "K" | "k" => Decimal::from(1_000),
            "M" | "Mio" | "Mn" | "mn" => Decimal::from(1_000_000),
            _ => Decimal::from(1_000_000_000),
        };
        return mantissa
            .checked_mul(multiplier)
            .map(|v| (v.normalize(), NumberFormat::Compact));
    }
    normalize_grouped(raw)
}

/// Разбирает сумму, отбрасывая информацию о формате.
#[inline]
pub fn parse_amount(raw: &str) -> Option<Money> {
    normalize(raw).map(|(value, _)| value)
}

fn normalize_grouped(raw: &str) -> Option<(Money, NumberFormat)> {
    let (canonical, format) = if SWISS_RE.is_match(raw) {
        (
            raw.chars()
                .filter(|c| !matches!(c, '\'' | '’'))
                .map(|c| if c == ',' { '.' } else { c })
                .collect::<String>(),
            NumberFormat::Swiss,
        )
    } else if TWO_DIGIT_DECIMAL_RE.is_match(raw) {
        (raw.replace(',', "."), NumberFormat::Plain)
    } else if US_RE.is_match(raw) {
        (raw.replace(',', ""), NumberFormat::Us)
    } else if EUROPEAN_RE.is_match(raw) {
        (raw.replace('.', "").replace(',', "."), NumberFormat::European)
    } else if PLAIN_RE.is_match(raw) {
        (raw.replace(',', "."), NumberFormat::Plain)
    } else {
        return None;
    };
    Decimal::from_str(&canonical)
        .ok()
        .map(|v| (v.normalize(), format))
}

/// Находит все числовые токены в тексте, попадающие в диапазон величин.
///
/// Нераспознанные токены и значения вне диапазона пропускаются молча.
/// Результат упорядочен по смещению.
pub fn scan_numbers(text: &str, index: &LineIndex, range: &MagnitudeRange) -> Vec<NumericToken> {
    TOKEN_RE
        .find_iter(text)
        .filter_map(|m| {
            let (value, format) = normalize(m.as_str())?;
            if !range.contains(value) {
                return None;
            }
            Some(NumericToken {
                raw: m.as_str().to_string(),
                value,
                offset: m.start(),
                end: m.end(),
                line: index.line_of(m.start()),
                format,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(raw: &str) -> Option<Money> {
        parse_amount(raw)
    }

    #[test]
    fn swiss_numbers() {
        assert_eq!(value("1'234'567.89"), Some(Decimal::new(123_456_789, 2)));
        assert_eq!(value("19'464'431"), Some(Decimal::from(19_464_431)));
        assert_eq!(value("2’500"), Some(Decimal::from(2_500)));
        assert_eq!(
            normalize("1'000").map(|(_, f)| f),
            Some(NumberFormat::Swiss)
        );
    }

    #[test]
    fn us_and_european_numbers() {
        assert_eq!(value("1,234,567.89"), Some(Decimal::new(123_456_789, 2)));
        assert_eq!(value("1.234.567,89"), Some(Decimal::new(123_456_789, 2)));
        assert_eq!(
            normalize("1.234.567").map(|(_, f)| f),
            Some(NumberFormat::European)
        );
    }

    #[test]
    fn ambiguous_single_separator() {
        // Три цифры после разделителя: разряды.
        assert_eq!(value("1.234"), Some(Decimal::from(1_234)));
        assert_eq!(value("1,234"), Some(Decimal::from(1_234)));
        // Две цифры: десятичная дробь.
        assert_eq!(value("1234.56"), Some(Decimal::new(123_456, 2)));
        assert_eq!(value("1234,56"), Some(Decimal::new(123_456, 2)));
        assert_eq!(value("12.5"), Some(Decimal::new(125, 1)));
    }

    #[test]
    fn compact_suffixes() {
        assert_eq!(value("1.5M"), Some(Decimal::from(1_500_000)));
        assert_eq!(value("250K"), Some(Decimal::from(250_000)));
        assert_eq!(value("2 Mio"), Some(Decimal::from(2_000_000)));
        assert_eq!(
            normalize("1.5M").map(|(_, f)| f),
            Some(NumberFormat::Compact)
        );
    }

    #[test]
    fn lone_letter_after_value_is_not_a_suffix() {
        assert_eq!(value("1'711'920 B"), None);
        assert_eq!(value("3 M"), None);

        let text = "Apple US0378331005 USD 1'711'920 B\n2'500\nM";
        let tokens = scan_numbers(text, &LineIndex::new(text), &MagnitudeRange::default());
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].raw, "1'711'920");
        assert_eq!(tokens[0].value, Decimal::from(1_711_920));
        assert_eq!(tokens[1].raw, "2'500");
        assert_eq!(tokens[1].format, NumberFormat::Swiss);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(value("31.03.2025"), None);
        assert_eq!(value("1'23'4"), None);
        assert_eq!(value("1.234.56"), None);
        assert_eq!(value(""), None);
    }

    #[test]
    fn scan_filters_by_magnitude() {
        let text = "Qty 100\nMarket value 1'234'567.89 USD\nDate 31.03.2025\nfar 99'000'000";
        let tokens = scan_numbers(text, &LineIndex::new(text), &MagnitudeRange::default());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].raw, "1'234'567.89");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].format, NumberFormat::Swiss);
    }

    #[test]
    fn digits_inside_codes_are_not_tokens() {
        let text = "XS2993414619 CH0012032048";
        let tokens = scan_numbers(text, &LineIndex::new(text), &MagnitudeRange::default());
        assert!(tokens.is_empty());
    }

    #[test]
    fn range_validity() {
        assert!(MagnitudeRange::default().is_valid());
        assert!(!MagnitudeRange::new(Decimal::from(10), Decimal::from(1)).is_valid());
        assert!(!MagnitudeRange::new(Decimal::from(-1), Decimal::from(1)).is_valid());
    }
}
