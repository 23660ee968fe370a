//! Пример CLI: читает текст выписки и выводит найденные позиции.

use std::env;
use std::fs::File;

use holdings_extract::{RawStatement, StatementBuilder, parse_amount};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let path = if let Some(path) = args.next() {
        path
    } else {
        println!("Usage: holdings-extract <statement.txt> [expected-total]");
        return Ok(());
    };

    let raw = RawStatement::from_reader(File::open(&path)?)?;
    let mut builder = StatementBuilder::new(&raw).use_stated_total(true);
    if let Some(expected) = args.next() {
        let total = parse_amount(&expected).ok_or_else(|| format!("Invalid total '{expected}'"))?;
        builder = builder.expected_total(total);
    }
    let summary = builder.extract()?;

    if let Some(date) = summary.meta.valuation_date {
        println!("Дата оценки: {date}");
    }
    for record in &summary.records {
        println!(
            "{}  {:<40} {:>16} {}  {:.2} {}",
            record.identifier,
            record.name,
            record.value,
            record.currency,
            record.confidence,
            record.method
        );
    }
    println!("Итого: {} ({} позиций)", summary.total_value, summary.records.len());
    if let (Some(expected), Some(ratio)) = (summary.expected_total, summary.accuracy_ratio) {
        println!("Ожидалось: {expected}, точность {:.4}%", ratio * 100.0);
    }
    if !summary.unresolved.is_empty() {
        println!("Без стоимости: {}", summary.unresolved.join(", "));
    }
    for outlier in &summary.outliers {
        println!(
            "Выброс: {} = {} (z = {:.1})",
            outlier.identifier, outlier.value, outlier.z_score
        );
    }
    Ok(())
}
