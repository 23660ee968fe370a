//! Конвейер извлечения: от текста выписки до итога по портфелю.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use crate::assembler::assemble;
use crate::error::ExtractError;
use crate::identifier::scan_identifiers;
use crate::meta::parse_meta;
use crate::numbers::{MagnitudeRange, scan_numbers};
use crate::raw::{LineIndex, RawStatement};
use crate::reconcile::{dedupe, reconcile};
use crate::selector::{HeuristicSelector, ValueSelector};
use crate::types::{
    Anchor, Correction, Identifier, Money, NumericToken, PortfolioSummary, SecurityRecord,
    ValueMethod, ValueSelection,
};
use crate::window::{ContextWindow, LineFence, build_fenced_window};

/// Радиус контекстного окна по умолчанию (в строках).
pub const DEFAULT_CONTEXT_RADIUS: usize = 10;

/// Порог выбросов по умолчанию (в стандартных отклонениях).
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 3.0;

/// Параметры извлечения.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Известная сумма портфеля для сверки.
    pub expected_total: Option<Money>,
    /// Радиус контекстного окна в строках.
    pub context_radius_lines: usize,
    /// Диапазон правдоподобных стоимостей.
    pub magnitude_range: MagnitudeRange,
    /// Порог выбросов в стандартных отклонениях.
    pub outlier_std_dev_threshold: f64,
    /// Отбрасывать коды с неверной контрольной цифрой.
    pub validate_checksum: bool,
    /// Не выводить окно за строки соседних идентификаторов.
    pub stop_at_neighbours: bool,
    /// Брать ожидаемую сумму из итога выписки, если явной нет.
    pub use_stated_total: bool,
    /// Справочные стоимости, подменяющие извлечённые после сверки.
    pub reference_values: BTreeMap<String, Money>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            expected_total: None,
            context_radius_lines: DEFAULT_CONTEXT_RADIUS,
            magnitude_range: MagnitudeRange::default(),
            outlier_std_dev_threshold: DEFAULT_OUTLIER_THRESHOLD,
            validate_checksum: false,
            stop_at_neighbours: true,
            use_stated_total: false,
            reference_values: BTreeMap::new(),
        }
    }
}

impl ExtractOptions {
    /// Проверяет параметры до начала сканирования.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let range = self.magnitude_range;
        if !range.is_valid() {
            return Err(ExtractError::InvalidMagnitudeRange {
                min: range.min,
                max: range.max,
            });
        }
        let threshold = self.outlier_std_dev_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ExtractError::InvalidOutlierThreshold(threshold));
        }
        if let Some(expected) = self.expected_total.filter(|e| *e < Decimal::ZERO) {
            return Err(ExtractError::NegativeExpectedTotal(expected));
        }
        if let Some((identifier, value)) = self
            .reference_values
            .iter()
            .find(|(_, v)| **v < Decimal::ZERO)
        {
            return Err(ExtractError::NegativeReferenceValue {
                identifier: identifier.clone(),
                value: *value,
            });
        }
        Ok(())
    }
}

/// Обрабатывает текст выписки эвристическим селектором.
///
/// # Пример
///
/// ```
/// # use holdings_extract::{process_document_text, ExtractOptions};
/// let summary = process_document_text(
///     "Bond XYZ ISIN: XS1234567893 value USD 1'000'000",
///     &ExtractOptions::default(),
/// )
/// .unwrap();
/// assert_eq!(summary.records.len(), 1);
/// assert_eq!(summary.records[0].currency, "USD");
/// ```
pub fn process_document_text(
    text: &str,
    options: &ExtractOptions,
) -> Result<PortfolioSummary, ExtractError> {
    let selector = HeuristicSelector::new(options.magnitude_range);
    process_document_text_with(text, options, &selector)
}

/// Обрабатывает текст выписки с произвольной стратегией выбора стоимости.
pub fn process_document_text_with(
    text: &str,
    options: &ExtractOptions,
    selector: &dyn ValueSelector,
) -> Result<PortfolioSummary, ExtractError> {
    options.validate()?;

    let index = LineIndex::new(text);
    let identifiers = scan_identifiers(text, &index, options.validate_checksum);
    let tokens = scan_numbers(text, &index, &options.magnitude_range);
    log::debug!(
        "scanned {} identifiers and {} numeric tokens over {} lines",
        identifiers.len(),
        tokens.len(),
        index.line_count()
    );

    let mut anchor_lines: Vec<usize> = identifiers
        .iter()
        .flat_map(|id| id.anchors.iter().map(|a| a.line))
        .collect();
    anchor_lines.sort_unstable();
    let pass = SelectionPass {
        text,
        index,
        tokens,
        anchor_lines,
        options,
        selector,
    };

    // Токен достаётся не более чем одной записи: самой уверенной. Остальные
    // выбирают заново без него, пока спорных токенов не останется.
    let mut excluded: Vec<Vec<usize>> = vec![Vec::new(); identifiers.len()];
    let mut chosen: Vec<Option<(ValueSelection, usize)>> = identifiers
        .iter()
        .map(|identifier| pass.best_selection(identifier, &[]))
        .collect();
    loop {
        let losers = contested(&chosen, |offset| pass.is_token(offset));
        if losers.is_empty() {
            break;
        }
        for i in losers {
            if let Some((selection, _)) = &chosen[i] {
                log::debug!(
                    "{}: token at {} goes to a more confident record",
                    identifiers[i].code,
                    selection.offset
                );
                excluded[i].push(selection.offset);
            }
            chosen[i] = pass.best_selection(&identifiers[i], &excluded[i]);
        }
    }

    let mut records = Vec::with_capacity(identifiers.len());
    for (identifier, best) in identifiers.iter().zip(chosen) {
        let anchor = identifier.anchors[best.as_ref().map_or(0, |(_, i)| *i)];
        let window = pass.window(identifier, anchor);
        let record = assemble(identifier, &window, best.map(|(selection, _)| selection));
        if !record.is_resolved() {
            log::debug!("{}: no value found", record.identifier);
        }
        records.push(record);
    }

    let meta = parse_meta(text);
    let expected_total = options
        .expected_total
        .or_else(|| options.use_stated_total.then_some(meta.stated_total).flatten());

    let (records, corrections) = apply_reference_values(records, &options.reference_values);
    let mut summary = reconcile(records, expected_total, options.outlier_std_dev_threshold);
    summary.corrections = corrections;
    summary.meta = meta;
    log::debug!(
        "{} records, total {}, {} unresolved, {} outliers",
        summary.records.len(),
        summary.total_value,
        summary.unresolved.len(),
        summary.outliers.len()
    );
    Ok(summary)
}

/// Общие для документа данные этапа выбора стоимостей.
struct SelectionPass<'a> {
    text: &'a str,
    index: LineIndex,
    tokens: Vec<NumericToken>,
    anchor_lines: Vec<usize>,
    options: &'a ExtractOptions,
    selector: &'a dyn ValueSelector,
}

impl SelectionPass<'_> {
    fn window<'w>(&'w self, identifier: &'w Identifier, anchor: Anchor) -> ContextWindow<'w> {
        let fence = if self.options.stop_at_neighbours {
            LineFence::between_neighbours(&self.anchor_lines, anchor.line)
        } else {
            LineFence::OPEN
        };
        build_fenced_window(
            identifier,
            anchor,
            self.text,
            &self.index,
            &self.tokens,
            self.options.context_radius_lines,
            fence,
        )
    }

    /// Лучший выбор по всем вхождениям без токенов со смещениями из `excluded`.
    ///
    /// Выигрывает самый уверенный выбор, при равенстве более раннее вхождение.
    fn best_selection(
        &self,
        identifier: &Identifier,
        excluded: &[usize],
    ) -> Option<(ValueSelection, usize)> {
        let mut best: Option<(ValueSelection, usize)> = None;
        for (i, anchor) in identifier.anchors.iter().enumerate() {
            let window = self.window(identifier, *anchor);
            let selection = if excluded.is_empty() {
                self.selector.select(&window)
            } else {
                let kept: Vec<NumericToken> = window
                    .candidates
                    .iter()
                    .filter(|t| !excluded.contains(&t.offset))
                    .cloned()
                    .collect();
                self.selector.select(&ContextWindow {
                    identifier: window.identifier,
                    anchor: window.anchor,
                    document: window.document,
                    start: window.start,
                    end: window.end,
                    first_line: window.first_line,
                    last_line: window.last_line,
                    candidates: &kept,
                })
            };
            let Some(selection) = selection.filter(|s| !excluded.contains(&s.offset)) else {
                continue;
            };
            let better = best
                .as_ref()
                .is_none_or(|(current, _)| selection.confidence > current.confidence);
            if better {
                best = Some((selection, i));
            }
        }
        best
    }

    fn is_token(&self, offset: usize) -> bool {
        self.tokens
            .binary_search_by_key(&offset, |t| t.offset)
            .is_ok()
    }
}

/// Индексы записей, чей токен уже выбран более уверенной записью.
///
/// При равной уверенности токен остаётся за более ранней записью. Выборы,
/// не указывающие на найденный токен, не оспариваются.
fn contested(
    chosen: &[Option<(ValueSelection, usize)>],
    is_token: impl Fn(usize) -> bool,
) -> Vec<usize> {
    let mut owners: HashMap<usize, usize> = HashMap::new();
    let mut losers = Vec::new();
    for (i, entry) in chosen.iter().enumerate() {
        let Some((selection, _)) = entry else {
            continue;
        };
        if !is_token(selection.offset) {
            continue;
        }
        match owners.entry(selection.offset) {
            Entry::Vacant(slot) => {
                slot.insert(i);
            }
            Entry::Occupied(mut slot) => {
                let owner = *slot.get();
                let owner_confidence = chosen[owner].as_ref().map_or(0.0, |(s, _)| s.confidence);
                if selection.confidence > owner_confidence {
                    losers.push(owner);
                    slot.insert(i);
                } else {
                    losers.push(i);
                }
            }
        }
    }
    losers
}

/// Подменяет стоимости справочными значениями, не трогая исходные записи.
///
/// Каждая подмена создаёт новую запись и сохраняет извлечённую в
/// [`Correction`]. Коды, которых нет в документе, игнорируются.
fn apply_reference_values(
    records: Vec<SecurityRecord>,
    reference: &BTreeMap<String, Money>,
) -> (Vec<SecurityRecord>, Vec<Correction>) {
    if reference.is_empty() {
        return (records, Vec::new());
    }
    let records = dedupe(records);
    let mut corrections = Vec::new();
    let records = records
        .into_iter()
        .map(|extracted| {
            let Some(&value) = reference.get(&extracted.identifier) else {
                return extracted;
            };
            let corrected = SecurityRecord {
                value,
                confidence: 1.0,
                method: ValueMethod::ReferenceOverride,
                reasoning: format!("reference value replaces extracted {}", extracted.value),
                ..extracted.clone()
            };
            log::debug!(
                "{}: reference value {} replaces {}",
                extracted.identifier,
                value,
                extracted.value
            );
            corrections.push(Correction {
                identifier: extracted.identifier.clone(),
                extracted,
                corrected: corrected.clone(),
            });
            corrected
        })
        .collect();
    (records, corrections)
}

/// Builder для удобной настройки извлечения.
pub struct StatementBuilder<'a> {
    raw: &'a RawStatement,
    options: ExtractOptions,
    selector: Option<&'a dyn ValueSelector>,
}

impl<'a> StatementBuilder<'a> {
    /// Создаёт builder для указанной выписки.
    ///
    /// # Пример
    ///
    /// ```
    /// # use holdings_extract::{RawStatement, StatementBuilder};
    /// # let raw = RawStatement::from_str("Nestle CH0012032048 CHF 12'500");
    /// let summary = StatementBuilder::new(&raw)
    ///     .context_radius(5)
    ///     .checksum_validation(true)
    ///     .extract()
    ///     .unwrap();
    /// assert_eq!(summary.records[0].currency, "CHF");
    /// ```
    #[inline]
    pub fn new(raw: &'a RawStatement) -> Self {
        Self {
            raw,
            options: ExtractOptions::default(),
            selector: None,
        }
    }

    /// Заменяет все параметры разом.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    /// Известная сумма портфеля.
    #[inline]
    #[must_use]
    pub fn expected_total(mut self, total: Money) -> Self {
        self.options.expected_total = Some(total);
        self
    }

    /// Радиус окна в строках.
    #[inline]
    #[must_use]
    pub fn context_radius(mut self, lines: usize) -> Self {
        self.options.context_radius_lines = lines;
        self
    }

    /// Диапазон правдоподобных стоимостей.
    #[inline]
    #[must_use]
    pub fn magnitude_range(mut self, min: Money, max: Money) -> Self {
        self.options.magnitude_range = MagnitudeRange::new(min, max);
        self
    }

    /// Порог выбросов.
    #[inline]
    #[must_use]
    pub fn outlier_threshold(mut self, std_devs: f64) -> Self {
        self.options.outlier_std_dev_threshold = std_devs;
        self
    }

    /// Включает или отключает проверку контрольной цифры ISIN.
    #[inline]
    #[must_use]
    pub fn checksum_validation(mut self, enabled: bool) -> Self {
        self.options.validate_checksum = enabled;
        self
    }

    /// Разрешает или запрещает окну заходить на строки соседних бумаг.
    #[inline]
    #[must_use]
    pub fn stop_at_neighbours(mut self, enabled: bool) -> Self {
        self.options.stop_at_neighbours = enabled;
        self
    }

    /// Сверять с итогом, указанным в самой выписке.
    #[inline]
    #[must_use]
    pub fn use_stated_total(mut self, enabled: bool) -> Self {
        self.options.use_stated_total = enabled;
        self
    }

    /// Добавляет справочную стоимость для бумаги.
    #[inline]
    #[must_use]
    pub fn reference_value(mut self, identifier: impl Into<String>, value: Money) -> Self {
        self.options.reference_values.insert(identifier.into(), value);
        self
    }

    /// Подключает альтернативную стратегию выбора стоимости.
    #[inline]
    #[must_use]
    pub fn selector(mut self, selector: &'a dyn ValueSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Выполняет извлечение с текущими настройками.
    pub fn extract(self) -> Result<PortfolioSummary, ExtractError> {
        match self.selector {
            Some(selector) => process_document_text_with(&self.raw.text, &self.options, selector),
            None => process_document_text(&self.raw.text, &self.options),
        }
    }
}
