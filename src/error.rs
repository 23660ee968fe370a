//! Ошибки конфигурации и ввода при извлечении позиций.
//!
//! Проблемы в самих данных (нераспознанные числа, бумаги без стоимости,
//! пустой документ) ошибками не считаются и обрабатываются локально.

use crate::types::Money;

/// Ошибка извлечения позиций из выписки.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// Ошибка ввода-вывода при чтении исходного текста.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Нижняя граница диапазона величин больше верхней или отрицательна.
    #[error("Invalid magnitude range [{min}, {max}]")]
    InvalidMagnitudeRange {
        /// Нижняя граница.
        min: Money,
        /// Верхняя граница.
        max: Money,
    },
    /// Порог выбросов должен быть конечным положительным числом.
    #[error("Invalid outlier threshold {0}")]
    InvalidOutlierThreshold(f64),
    /// Ожидаемая сумма портфеля не может быть отрицательной.
    #[error("Expected total must be non-negative, got {0}")]
    NegativeExpectedTotal(Money),
    /// Справочное значение для бумаги отрицательно.
    #[error("Reference value {value} for '{identifier}' is negative")]
    NegativeReferenceValue {
        /// ISIN бумаги.
        identifier: String,
        /// Некорректное значение.
        value: Money,
    },
}
