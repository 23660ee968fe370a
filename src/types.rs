//! Доменные типы: идентификаторы, числовые токены, записи и итог по портфелю.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Денежное значение, используем `Decimal` для точных расчётов.
pub type Money = Decimal;

/// Одно вхождение идентификатора в тексте.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Байтовое смещение начала кода.
    pub offset: usize,
    /// Номер строки (с нуля).
    pub line: usize,
}

/// Код ценной бумаги (ISIN), найденный в тексте.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    /// Двенадцатисимвольный код.
    pub code: String,
    /// Все вхождения кода в порядке появления; первое основное.
    pub anchors: Vec<Anchor>,
}

impl Identifier {
    /// Смещение первого вхождения.
    #[inline]
    pub fn position(&self) -> usize {
        self.anchors.first().map_or(0, |a| a.offset)
    }

    /// Строка первого вхождения.
    #[inline]
    pub fn line(&self) -> usize {
        self.anchors.first().map_or(0, |a| a.line)
    }

    /// Двухбуквенный префикс страны.
    #[inline]
    pub fn country(&self) -> &str {
        self.code.get(..2).unwrap_or_default()
    }
}

/// Формат записи числа в исходном тексте.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NumberFormat {
    /// Швейцарская группировка апострофом: `1'234'567.89`.
    Swiss,
    /// Американская группировка запятой: `1,234,567.89`.
    Us,
    /// Европейская группировка точкой: `1.234.567,89`.
    European,
    /// Сокращённая запись с суффиксом: `1.5M`, `250K`.
    Compact,
    /// Число без разделителей разрядов.
    Plain,
}

impl NumberFormat {
    /// Число записано с группировкой разрядов.
    #[inline]
    pub const fn is_grouped(self) -> bool {
        matches!(self, Self::Swiss | Self::Us | Self::European)
    }

    /// Ранг формата при разрешении ничьей: швейцарский выше прочих группированных.
    pub(crate) const fn tie_rank(self) -> u8 {
        match self {
            Self::Swiss => 2,
            Self::Us | Self::European => 1,
            Self::Compact | Self::Plain => 0,
        }
    }
}

/// Числовой токен, кандидат в рыночную стоимость.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericToken {
    /// Исходная подстрока.
    pub raw: String,
    /// Нормализованное значение, всегда неотрицательное.
    pub value: Money,
    /// Байтовое смещение начала токена.
    pub offset: usize,
    /// Байтовое смещение конца токена.
    pub end: usize,
    /// Номер строки (с нуля).
    pub line: usize,
    /// Формат записи.
    pub format: NumberFormat,
}

/// Результат выбора стоимости в контекстном окне.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSelection {
    /// Выбранная стоимость.
    pub value: Money,
    /// Уверенность в диапазоне `[0, 1]`.
    pub confidence: f64,
    /// Краткое объяснение выбора для отладки.
    pub reasoning: String,
    /// Смещение выбранного токена в тексте.
    pub offset: usize,
}

/// Каким путём получена стоимость записи.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ValueMethod {
    /// Стоимость выбрана эвристикой по контексту.
    Heuristic,
    /// Стоимость не найдена.
    Unresolved,
    /// Стоимость подменена справочным значением.
    ReferenceOverride,
}

impl ValueMethod {
    /// Строковое имя метода.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::Unresolved => "unresolved",
            Self::ReferenceOverride => "reference_override",
        }
    }
}

impl fmt::Display for ValueMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Итоговая запись по одной ценной бумаге.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecurityRecord {
    /// ISIN.
    pub identifier: String,
    /// Наименование (по возможности) или заглушка.
    pub name: String,
    /// Стоимость; ноль у нераспознанных записей.
    pub value: Money,
    /// Трёхбуквенный код валюты.
    pub currency: String,
    /// Уверенность в диапазоне `[0, 1]`.
    pub confidence: f64,
    /// Путь получения стоимости.
    pub method: ValueMethod,
    /// Объяснение выбора.
    pub reasoning: String,
}

impl SecurityRecord {
    /// Стоимость найдена (в том числе подменена справочником).
    ///
    /// Нулевая стоимость с `is_resolved() == true` — это настоящий ноль,
    /// а не отсутствие данных.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.method != ValueMethod::Unresolved
    }
}

/// Запись, помеченная как выброс. Стоимость записи не меняется.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Outlier {
    /// ISIN.
    pub identifier: String,
    /// Стоимость записи.
    pub value: Money,
    /// Отклонение от среднего в стандартных отклонениях.
    pub z_score: f64,
}

/// Подмена извлечённой записи справочным значением.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Correction {
    /// ISIN.
    pub identifier: String,
    /// Запись в том виде, в каком её извлекла эвристика.
    pub extracted: SecurityRecord,
    /// Запись после подмены.
    pub corrected: SecurityRecord,
}

/// Метаданные выписки, найденные в тексте.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatementMeta {
    /// Дата оценки портфеля.
    pub valuation_date: Option<NaiveDate>,
    /// Итог портфеля, указанный в самой выписке.
    pub stated_total: Option<Money>,
}

/// Итог обработки одного документа.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortfolioSummary {
    /// Записи, по одной на ISIN, в порядке появления.
    pub records: Vec<SecurityRecord>,
    /// Сумма стоимостей записей.
    pub total_value: Money,
    /// Ожидаемая сумма, если известна.
    pub expected_total: Option<Money>,
    /// `min(total, expected) / max(total, expected)`.
    pub accuracy_ratio: Option<f64>,
    /// ISIN записей без найденной стоимости.
    pub unresolved: Vec<String>,
    /// Записи, выбивающиеся из распределения стоимостей.
    pub outliers: Vec<Outlier>,
    /// Применённые справочные подмены.
    pub corrections: Vec<Correction>,
    /// Метаданные выписки.
    pub meta: StatementMeta,
}

impl PortfolioSummary {
    /// Ищет запись по ISIN.
    pub fn record(&self, identifier: &str) -> Option<&SecurityRecord> {
        self.records.iter().find(|r| r.identifier == identifier)
    }

    /// Запись помечена как выброс.
    pub fn is_outlier(&self, identifier: &str) -> bool {
        self.outliers.iter().any(|o| o.identifier == identifier)
    }
}
