//! Выбор рыночной стоимости среди числовых кандидатов контекстного окна.
//!
//! Каждый кандидат оценивается взвешенной суммой независимых сигналов:
//! близость к идентификатору, соседний код валюты, формат записи, подпись
//! «value» в строке, позиция в конце строки. Штрафуются круглые числа,
//! количества и номиналы (по подписи `Qty`/`Nominal`, суффиксу `Shares`,
//! первой колонке под заголовком `Nominal` или по совпадению с подписанным
//! полем), номера (Valor, WKN, счёт) и числа, похожие на год.
//!
//! При равенстве оценок (в пределах [`SCORE_EPSILON`]) порядок такой:
//! швейцарский/группированный формат, затем ближайший к идентификатору,
//! затем больший по величине.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::numbers::{MagnitudeRange, parse_amount};
use crate::types::{Money, NumberFormat, NumericToken, ValueSelection};
use crate::window::ContextWindow;

/// Оценки, отличающиеся меньше чем на эту величину, считаются равными.
pub const SCORE_EPSILON: f64 = 1e-3;

/// Множитель уверенности, если у победителя есть равный по оценке соперник.
const TIE_DAMPING: f64 = 0.8;

/// Сколько строк над окном просматривать в поиске заголовка таблицы.
const HEADER_LOOKBACK_LINES: usize = 10;

/// Дальность, на которой затухает близость внутри одной строки (в байтах).
const SAME_LINE_REACH: usize = 200;

static CURRENCY_BEFORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:USD|CHF|EUR|GBP)\s*$").expect("valid currency-before regex")
});
static CURRENCY_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:USD|CHF|EUR|GBP)\b").expect("valid currency-after regex")
});
static VALUE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:market\s+value|value|valuation|countervalue|kurswert|marktwert|amount|betrag)\b")
        .expect("valid value label regex")
});
static QUANTITY_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:qty|quantity|nominal|nominale|nennwert|stk|units|shares|anzahl)\b\.?\s*:?\s*(?:[A-Z]{3}\s*)?$",
    )
    .expect("valid quantity label regex")
});
static QUANTITY_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:qty|quantity|nominal|nominale|nennwert|stk|units|shares|anzahl)\b\.?\s*:?\s*(?:[A-Z]{3}\s*)?(\d(?:[\d'’.,]*\d)?)",
    )
    .expect("valid quantity field regex")
});
static QUANTITY_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:shares|units|stk|pcs|pieces|aktien)\b")
        .expect("valid quantity suffix regex")
});
// Строка-заголовок с колонкой количества: подпись есть, цифр нет.
static QUANTITY_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[^\d\n]*\b(?:nominal|quantity|qty|anzahl)\b[^\d\n]*$")
        .expect("valid quantity header regex")
});
static LEADING_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[A-Z]{3}\s+)?$").expect("valid leading column regex"));
static REFERENCE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:valor|valoren|valorn|wkn|account|konto|page|seite|ref|client\s+number|portfolio\s+number)\b\.?\s*(?:no\.?|nr\.?)?\s*:?\s*$",
    )
    .expect("valid reference label regex")
});
static TOTAL_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:total|subtotal|sub-total|zwischentotal|summe|gesamt)\b")
        .expect("valid total line regex")
});

/// Стратегия выбора стоимости в окне.
///
/// Основная реализация: [`HeuristicSelector`]; альтернативные
/// (например, с внешней моделью) подключаются через тот же интерфейс.
pub trait ValueSelector {
    /// Выбирает стоимость или возвращает `None`, если правдоподобных
    /// кандидатов нет (это не то же самое, что нулевая стоимость).
    fn select(&self, window: &ContextWindow<'_>) -> Option<ValueSelection>;
}

/// Веса сигналов эвристики.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Близость к идентификатору.
    pub proximity: f64,
    /// Код валюты рядом с числом.
    pub currency: f64,
    /// Формат записи (швейцарский максимален).
    pub format: f64,
    /// Подпись «value»/«Kurswert» перед числом в той же строке.
    pub value_label: f64,
    /// Число последнее в своей строке (колонка стоимости обычно крайняя).
    pub row_end: f64,
    /// Штраф за кратность 100 000.
    pub round_number: f64,
    /// Штраф за количество/номинал.
    pub quantity: f64,
    /// Штраф за номер (Valor, WKN, счёт, страница).
    pub reference: f64,
    /// Штраф за число, похожее на год.
    pub year_like: f64,
}

impl ScoreWeights {
    /// Максимально возможная оценка, используется для нормализации уверенности.
    #[inline]
    pub fn max_score(&self) -> f64 {
        self.proximity + self.currency + self.format + self.value_label + self.row_end
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            proximity: 0.35,
            currency: 0.25,
            format: 0.15,
            value_label: 0.10,
            row_end: 0.10,
            round_number: 0.10,
            quantity: 0.60,
            reference: 0.60,
            year_like: 0.30,
        }
    }
}

/// Эвристический выбор стоимости по взвешенной сумме сигналов.
#[derive(Debug, Clone, Default)]
pub struct HeuristicSelector {
    range: MagnitudeRange,
    weights: ScoreWeights,
}

impl HeuristicSelector {
    /// Создаёт селектор с локальным диапазоном величин.
    #[inline]
    pub fn new(range: MagnitudeRange) -> Self {
        Self {
            range,
            weights: ScoreWeights::default(),
        }
    }

    /// Заменяет веса сигналов.
    #[inline]
    #[must_use]
    pub const fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Текущие веса.
    #[inline]
    pub const fn weights(&self) -> &ScoreWeights {
        &self.weights
    }
}

#[derive(Debug)]
struct Scored<'a> {
    token: &'a NumericToken,
    score: f64,
    distance: (usize, usize),
    signals: Vec<&'static str>,
}

impl ValueSelector for HeuristicSelector {
    fn select(&self, window: &ContextWindow<'_>) -> Option<ValueSelection> {
        let labeled = labeled_quantities(window.text());
        // Заголовок таблицы обычно стоит над окном, но не дальше нескольких строк.
        let header_start = lines_above(window.document, window.start, HEADER_LOOKBACK_LINES);
        let has_quantity_column =
            QUANTITY_HEADER_RE.is_match(&window.document[header_start..window.end]);

        let mut best: Option<Scored<'_>> = None;
        let mut runner_up: Option<f64> = None;

        for token in window.candidates {
            let Some(scored) = self.score(window, token, &labeled, has_quantity_column) else {
                continue;
            };
            log::trace!(
                "{} candidate {} score {:.3} [{}]",
                window.identifier.code,
                token.raw,
                scored.score,
                scored.signals.join(", ")
            );
            let replace = match &best {
                None => true,
                Some(current) => {
                    let wins = beats(&scored, current);
                    let (winner, loser) = if wins {
                        (&scored, current)
                    } else {
                        (current, &scored)
                    };
                    if winner.token.value != loser.token.value {
                        runner_up = Some(runner_up.map_or(loser.score, |r| r.max(loser.score)));
                    }
                    wins
                }
            };
            if replace {
                best = Some(scored);
            }
        }

        let best = best?;
        let max_score = self.weights.max_score().max(f64::EPSILON);
        let mut confidence = (best.score / max_score).clamp(0.0, 1.0);
        let tied = runner_up.is_some_and(|r| (best.score - r).abs() <= SCORE_EPSILON);
        if tied {
            confidence *= TIE_DAMPING;
        }

        let mut reasoning = format!(
            "{} ({:?}) on line {} scored {:.3}",
            best.token.raw, best.token.format, best.token.line, best.score
        );
        if !best.signals.is_empty() {
            let _ = write!(reasoning, ": {}", best.signals.join(", "));
        }
        if tied {
            reasoning.push_str("; tie broken by format/proximity/magnitude");
        }

        Some(ValueSelection {
            value: best.token.value,
            confidence,
            reasoning,
            offset: best.token.offset,
        })
    }
}

impl HeuristicSelector {
    fn score<'a>(
        &self,
        window: &ContextWindow<'_>,
        token: &'a NumericToken,
        labeled: &[Money],
        has_quantity_column: bool,
    ) -> Option<Scored<'a>> {
        let w = &self.weights;
        if !self.range.contains(token.value) {
            return None;
        }

        let doc = window.document;
        let (line_start, line_end) = line_bounds(doc, token.offset, token.end);
        let before = &doc[line_start..token.offset];
        let after = &doc[token.end..line_end];

        if after.trim_start().starts_with('%') {
            return None;
        }
        if token.line != window.anchor.line && TOTAL_LINE_RE.is_match(&doc[line_start..line_end]) {
            return None;
        }

        let mut signals = Vec::new();
        let distance = distance(window, token);
        let mut score = w.proximity * proximity(distance);

        if CURRENCY_BEFORE_RE.is_match(before) || CURRENCY_AFTER_RE.is_match(after) {
            score += w.currency;
            signals.push("currency");
        }

        let format_share = match token.format {
            NumberFormat::Swiss => 1.0,
            NumberFormat::Us | NumberFormat::European => 2.0 / 3.0,
            NumberFormat::Compact => 1.0 / 3.0,
            NumberFormat::Plain => 0.0,
        };
        if format_share > 0.0 {
            score += w.format * format_share;
            signals.push(match token.format {
                NumberFormat::Swiss => "swiss",
                NumberFormat::Compact => "compact",
                _ => "grouped",
            });
        }

        if VALUE_LABEL_RE.is_match(before) {
            score += w.value_label;
            signals.push("value label");
        }

        let last_in_row = !after.chars().any(|c| c.is_ascii_digit());
        if last_in_row {
            score += w.row_end;
            signals.push("row end");
        }

        if is_round(token.value) {
            score -= w.round_number;
            signals.push("round");
        }

        if QUANTITY_LABEL_RE.is_match(before) || QUANTITY_SUFFIX_RE.is_match(after) {
            score -= w.quantity;
            signals.push("labeled quantity");
        } else if has_quantity_column
            && LEADING_COLUMN_RE.is_match(before)
            && !after.trim().is_empty()
            && !CURRENCY_AFTER_RE.is_match(after)
        {
            score -= w.quantity;
            signals.push("quantity column");
        } else if labeled.contains(&token.value) {
            score -= w.quantity;
            signals.push("equals labeled quantity");
        }

        if REFERENCE_LABEL_RE.is_match(before) {
            score -= w.reference;
            signals.push("reference number");
        }

        if is_year_like(token) {
            score -= w.year_like;
            signals.push("year-like");
        }

        (score > 0.0).then_some(Scored {
            token,
            score,
            distance,
            signals,
        })
    }
}

/// `a` лучше `b` по оценке, а при равенстве по формату, затем по близости и величине.
fn beats(a: &Scored<'_>, b: &Scored<'_>) -> bool {
    if (a.score - b.score).abs() > SCORE_EPSILON {
        return a.score > b.score;
    }
    a.token
        .format
        .tie_rank()
        .cmp(&b.token.format.tie_rank())
        .then_with(|| b.distance.cmp(&a.distance))
        .then_with(|| a.token.value.cmp(&b.token.value))
        == Ordering::Greater
}

/// Расстояние до центра окна: (строки, байты).
fn distance(window: &ContextWindow<'_>, token: &NumericToken) -> (usize, usize) {
    let lines = token.line.abs_diff(window.anchor.line);
    let chars = if token.offset >= window.anchor_end() {
        token.offset - window.anchor_end()
    } else {
        window.anchor.offset.saturating_sub(token.end)
    };
    (lines, chars)
}

/// Близость в `(0, 1]`: внутри строки затухает по байтам, на других строках по числу строк.
#[allow(clippy::cast_precision_loss)]
fn proximity((lines, chars): (usize, usize)) -> f64 {
    if lines == 0 {
        1.0 - 0.2 * (chars.min(SAME_LINE_REACH) as f64 / SAME_LINE_REACH as f64)
    } else {
        0.8 / (1.0 + lines as f64)
    }
}

/// Начало строки, отстоящей на `lines` строк вверх от `offset`.
fn lines_above(doc: &str, offset: usize, lines: usize) -> usize {
    let mut start = offset;
    for _ in 0..lines {
        match doc[..start.saturating_sub(1)].rfind('\n') {
            Some(i) => start = i + 1,
            None => return 0,
        }
    }
    start
}

fn line_bounds(doc: &str, start: usize, end: usize) -> (usize, usize) {
    let line_start = doc[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = doc[end..].find('\n').map_or(doc.len(), |i| end + i);
    (line_start, line_end)
}

fn is_round(value: Money) -> bool {
    let step = Decimal::from(100_000);
    value.fract().is_zero() && (value % step).is_zero()
}

fn is_year_like(token: &NumericToken) -> bool {
    token.format == NumberFormat::Plain
        && token.raw.len() == 4
        && token
            .value
            .to_u32()
            .is_some_and(|y| (1900..=2100).contains(&y))
}

/// Значения полей, явно подписанных как количество или номинал.
fn labeled_quantities(text: &str) -> Vec<Money> {
    QUANTITY_FIELD_RE
        .captures_iter(text)
        .filter_map(|caps| parse_amount(&caps[1]))
        .collect()
}
