use holdings_extract::{
    ExtractOptions, PortfolioSummary, RawStatement, StatementBuilder, ValueMethod,
    process_document_text,
};
use rust_decimal::Decimal;

fn load_fixture(name: &str) -> RawStatement {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let file = std::fs::File::open(path).expect("open fixture");
    RawStatement::from_reader(file).expect("read fixture")
}

fn extract(text: &str) -> PortfolioSummary {
    process_document_text(text, &ExtractOptions::default()).expect("extract")
}

#[test]
fn extracts_custody_fixture() {
    let raw = load_fixture("custody_statement.txt");
    let summary = StatementBuilder::new(&raw)
        .use_stated_total(true)
        .extract()
        .expect("extract fixture");

    let codes: Vec<&str> = summary.records.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(
        codes,
        [
            "XS2530201644",
            "XS2993414619",
            "US0378331005",
            "CH0012032048",
            "DE0005140008"
        ]
    );

    let toronto = summary.record("XS2530201644").unwrap();
    assert_eq!(toronto.value, Decimal::from(199_080));
    assert_eq!(toronto.name, "TORONTO DOMINION BANK NOTES");
    assert_eq!(toronto.currency, "USD");

    assert_eq!(
        summary.record("XS2993414619").unwrap().value,
        Decimal::from(1_507_550)
    );

    let apple = summary.record("US0378331005").unwrap();
    assert_eq!(apple.value, Decimal::from(1_711_920));
    assert_eq!(apple.name, "APPLE INC");

    let nestle = summary.record("CH0012032048").unwrap();
    assert_eq!(nestle.value, Decimal::from(1_232_460));
    assert_eq!(nestle.currency, "CHF");

    let deutsche = summary.record("DE0005140008").unwrap();
    assert_eq!(deutsche.method, ValueMethod::Unresolved);
    assert_eq!(deutsche.name, "DEUTSCHE BANK CAPITAL NOTE");
    assert_eq!(summary.unresolved, vec!["DE0005140008".to_string()]);

    assert_eq!(summary.total_value, Decimal::from(4_651_010));
    assert_eq!(summary.expected_total, Some(Decimal::from(4_651_010)));
    assert!((summary.accuracy_ratio.unwrap() - 1.0).abs() < 1e-12);
    assert!(summary.outliers.is_empty());
    assert_eq!(
        summary.meta.valuation_date,
        chrono::NaiveDate::from_ymd_opt(2025, 3, 31)
    );
}

#[test]
fn fixture_with_checksum_validation_keeps_all_codes() {
    let raw = load_fixture("custody_statement.txt");
    let summary = StatementBuilder::new(&raw)
        .checksum_validation(true)
        .extract()
        .expect("extract fixture");
    assert_eq!(summary.records.len(), 5);
}

#[test]
fn empty_document() {
    let summary = extract("");
    assert!(summary.records.is_empty());
    assert_eq!(summary.total_value, Decimal::ZERO);
    assert!(summary.unresolved.is_empty());
    assert!(summary.outliers.is_empty());
    assert_eq!(summary.accuracy_ratio, None);
}

#[test]
fn single_clean_security() {
    let summary = extract("Bond XYZ ISIN: XS1234567893 value USD 1'000'000");
    assert_eq!(summary.records.len(), 1);
    let record = &summary.records[0];
    assert_eq!(record.identifier, "XS1234567893");
    assert_eq!(record.value, Decimal::from(1_000_000));
    assert_eq!(record.currency, "USD");
    assert!(record.confidence > 0.5);
    assert_eq!(summary.total_value, Decimal::from(1_000_000));
}

#[test]
fn invalid_checksum_is_dropped_when_validating() {
    let raw = RawStatement::from_str("Bond XYZ ISIN: XS1234567893 value USD 1'000'000");
    let summary = StatementBuilder::new(&raw)
        .checksum_validation(true)
        .extract()
        .unwrap();
    assert!(summary.records.is_empty());
}

#[test]
fn quantity_is_not_market_value() {
    let text = "Apple Inc US0378331005\n\
        Qty: 150'000\n\
        Price 189.50\n\
        Market value USD 28'425'000";
    let summary = extract(text);
    assert_eq!(summary.records[0].value, Decimal::from(28_425_000));
}

#[test]
fn reconciles_against_expected_total() {
    let text = "Alpha Bond XS2530201644 USD 10'000'000\n\n\
        Beta Note XS2993414619 USD 6'464'000\n\n\
        Gamma Equity US0378331005 USD 3'000'000";
    let options = ExtractOptions {
        expected_total: Some(Decimal::from(19_464_431)),
        ..ExtractOptions::default()
    };
    let summary = process_document_text(text, &options).unwrap();
    assert_eq!(summary.total_value, Decimal::from(19_464_000));
    let ratio = summary.accuracy_ratio.unwrap();
    assert!((ratio - 0.999_98).abs() < 1e-5, "ratio {ratio}");
}

#[test]
fn outlier_is_flagged_and_kept() {
    let codes = [
        "US0378331005",
        "CH0012032048",
        "XS2993414619",
        "DE0005140008",
        "CH0244767585",
        "US5949181045",
        "XS2530201644",
        "IE00B4L5Y983",
    ];
    let mut text = String::new();
    for (i, code) in codes.iter().enumerate() {
        let value = if i == 0 {
            "9'500'000".to_string()
        } else {
            format!("{}'{:03}", 10 + i, i * 7)
        };
        text.push_str(&format!("Holding {code} USD {value}\n\n"));
    }
    let options = ExtractOptions {
        outlier_std_dev_threshold: 2.0,
        ..ExtractOptions::default()
    };
    let summary = process_document_text(&text, &options).unwrap();

    assert_eq!(summary.records.len(), codes.len());
    assert_eq!(summary.outliers.len(), 1);
    assert_eq!(summary.outliers[0].identifier, "US0378331005");
    assert_eq!(
        summary.record("US0378331005").unwrap().value,
        Decimal::from(9_500_000)
    );
}

#[test]
fn processing_is_idempotent() {
    let raw = load_fixture("custody_statement.txt");
    let first = process_document_text(&raw.text, &ExtractOptions::default()).unwrap();
    let second = process_document_text(&raw.text, &ExtractOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[cfg(feature = "serde")]
#[test]
fn summary_serializes_to_json() {
    let summary = extract("Nestle CH0012032048 CHF 12'500");
    let json = serde_json::to_value(&summary).expect("serialize summary");
    assert_eq!(json["records"][0]["identifier"], "CH0012032048");
    assert_eq!(json["records"][0]["method"], "heuristic");
}

#[test]
fn extract_real_statement_if_present() {
    if let Ok(path) = std::env::var("REAL_STATEMENT") {
        let file = std::fs::File::open(path).expect("open real statement");
        let raw = RawStatement::from_reader(file).expect("read real statement");
        let summary = StatementBuilder::new(&raw)
            .use_stated_total(true)
            .extract()
            .expect("extract real statement");
        assert!(!summary.records.is_empty());
    }
}
