//! Контекстное окно вокруг вхождения идентификатора.

use crate::raw::LineIndex;
use crate::types::{Anchor, Identifier, NumericToken};

/// Ограниченный фрагмент документа вокруг одного вхождения ISIN.
///
/// Окно является представлением: оно заимствует текст, идентификатор и уже
/// найденные токены, ничего не копируя и не сканируя повторно.
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow<'a> {
    /// Идентификатор, вокруг которого построено окно.
    pub identifier: &'a Identifier,
    /// Вхождение, служащее центром окна.
    pub anchor: Anchor,
    /// Весь текст документа (для анализа соседства токенов).
    pub document: &'a str,
    /// Байтовое начало окна.
    pub start: usize,
    /// Байтовый конец окна.
    pub end: usize,
    /// Первая строка окна.
    pub first_line: usize,
    /// Последняя строка окна.
    pub last_line: usize,
    /// Токены, попадающие в окно, в порядке смещения.
    pub candidates: &'a [NumericToken],
}

impl<'a> ContextWindow<'a> {
    /// Текст окна.
    #[inline]
    pub fn text(&self) -> &'a str {
        &self.document[self.start..self.end]
    }

    /// Строки окна с их номерами в документе.
    pub fn lines(&self) -> impl Iterator<Item = (usize, &'a str)> + use<'a> {
        let first = self.first_line;
        self.text()
            .split('\n')
            .enumerate()
            .map(move |(i, line)| (first + i, line))
    }

    /// Строка документа, на которой стоит центр окна.
    pub fn anchor_line(&self) -> &'a str {
        self.lines()
            .find(|(n, _)| *n == self.anchor.line)
            .map_or("", |(_, line)| line)
    }

    /// Байтовое смещение конца кода идентификатора.
    #[inline]
    pub fn anchor_end(&self) -> usize {
        self.anchor.offset + self.identifier.code.len()
    }
}

/// Диапазон строк, за который окно не выходит.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineFence {
    /// Первая допустимая строка.
    pub first: usize,
    /// Последняя допустимая строка.
    pub last: usize,
}

impl LineFence {
    /// Без ограничений, кроме границ документа.
    pub const OPEN: Self = Self {
        first: 0,
        last: usize::MAX,
    };

    /// Ограда между соседними вхождениями идентификаторов.
    ///
    /// `anchor_lines`: отсортированные номера строк всех вхождений.
    /// Вхождения на той же строке, что и `line`, ограду не ставят.
    pub fn between_neighbours(anchor_lines: &[usize], line: usize) -> Self {
        let below = anchor_lines.partition_point(|&l| l < line);
        let above = anchor_lines.partition_point(|&l| l <= line);
        Self {
            first: below.checked_sub(1).map_or(0, |i| anchor_lines[i] + 1),
            last: anchor_lines.get(above).map_or(usize::MAX, |&l| l - 1),
        }
    }
}

/// Строит окно радиусом `radius_lines` строк вокруг вхождения `anchor`.
///
/// Окно обрезается по границам документа. `tokens` должны быть
/// упорядочены по смещению (как их возвращает `scan_numbers`).
pub fn build_window<'a>(
    identifier: &'a Identifier,
    anchor: Anchor,
    text: &'a str,
    index: &LineIndex,
    tokens: &'a [NumericToken],
    radius_lines: usize,
) -> ContextWindow<'a> {
    build_fenced_window(identifier, anchor, text, index, tokens, radius_lines, LineFence::OPEN)
}

/// То же, что [`build_window`], но окно дополнительно не выходит за `fence`.
pub fn build_fenced_window<'a>(
    identifier: &'a Identifier,
    anchor: Anchor,
    text: &'a str,
    index: &LineIndex,
    tokens: &'a [NumericToken],
    radius_lines: usize,
    fence: LineFence,
) -> ContextWindow<'a> {
    let first_line = anchor
        .line
        .saturating_sub(radius_lines)
        .max(fence.first.min(anchor.line));
    let last_line = anchor
        .line
        .saturating_add(radius_lines)
        .min(fence.last.max(anchor.line))
        .min(index.line_count() - 1);
    let (start, end) = index.span(first_line, last_line);

    let lo = tokens.partition_point(|t| t.offset < start);
    let hi = tokens.partition_point(|t| t.offset < end);

    ContextWindow {
        identifier,
        anchor,
        document: text,
        start,
        end,
        first_line,
        last_line,
        candidates: &tokens[lo..hi.max(lo)],
    }
}
