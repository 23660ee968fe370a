//! Сведение записей в итог по портфелю: дедупликация, сумма, точность, выбросы.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::types::{Money, Outlier, PortfolioSummary, SecurityRecord};

/// Оставляет по одной записи на ISIN с наибольшей уверенностью.
///
/// При равной уверенности остаётся более ранняя запись; порядок первых
/// появлений сохраняется.
pub fn dedupe(records: Vec<SecurityRecord>) -> Vec<SecurityRecord> {
    let mut out: Vec<SecurityRecord> = Vec::with_capacity(records.len());
    let mut slots: HashMap<String, usize> = HashMap::new();

    for record in records {
        if let Some(&slot) = slots.get(&record.identifier) {
            if record.confidence > out[slot].confidence {
                out[slot] = record;
            }
        } else {
            slots.insert(record.identifier.clone(), out.len());
            out.push(record);
        }
    }
    out
}

/// `min(total, expected) / max(total, expected)`; два нуля дают `1.0`.
pub fn accuracy_ratio(total: Money, expected: Money) -> Option<f64> {
    let (lo, hi) = if total <= expected {
        (total, expected)
    } else {
        (expected, total)
    };
    if hi.is_zero() {
        return Some(1.0);
    }
    lo.checked_div(hi).and_then(|r| r.to_f64())
}

/// Записи, отклоняющиеся от среднего больше чем на `threshold` стандартных
/// отклонений. Статистика считается только по найденным стоимостям.
///
/// Пометка носит справочный характер: стоимости записей не меняются.
#[allow(clippy::cast_precision_loss)]
pub fn find_outliers(records: &[SecurityRecord], threshold: f64) -> Vec<Outlier> {
    let values: Vec<(&SecurityRecord, f64)> = records
        .iter()
        .filter(|r| r.is_resolved())
        .filter_map(|r| r.value.to_f64().map(|v| (r, v)))
        .collect();
    if values.len() < 2 {
        return Vec::new();
    }

    let n = values.len() as f64;
    let mean = values.iter().map(|(_, v)| v).sum::<f64>() / n;
    let variance = values.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev <= f64::EPSILON {
        return Vec::new();
    }

    values
        .into_iter()
        .filter_map(|(record, v)| {
            let z_score = (v - mean) / std_dev;
            (z_score.abs() > threshold).then(|| Outlier {
                identifier: record.identifier.clone(),
                value: record.value,
                z_score,
            })
        })
        .collect()
}

/// Сводит записи в итог по портфелю.
pub fn reconcile(
    records: Vec<SecurityRecord>,
    expected_total: Option<Money>,
    outlier_threshold: f64,
) -> PortfolioSummary {
    let records = dedupe(records);
    let total_value = records
        .iter()
        .map(|r| r.value)
        .fold(Decimal::ZERO, |acc, v| acc + v);
    let accuracy_ratio = expected_total.and_then(|expected| accuracy_ratio(total_value, expected));
    let outliers = find_outliers(&records, outlier_threshold);
    let unresolved = records
        .iter()
        .filter(|r| !r.is_resolved())
        .map(|r| r.identifier.clone())
        .collect();

    PortfolioSummary {
        records,
        total_value,
        expected_total,
        accuracy_ratio,
        unresolved,
        outliers,
        ..PortfolioSummary::default()
    }
}
