//! Исходный текст выписки и индекс строк над ним.

use crate::error::ExtractError;
use std::io::Read;

/// Исходный текст выписки (результат внешнего PDF-to-text).
#[derive(Debug, Clone)]
pub struct RawStatement {
    /// Полный текст документа.
    pub text: String,
}

impl RawStatement {
    /// Читает текст выписки из произвольного `Read`.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, ExtractError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(Self { text })
    }

    /// Создаёт выписку из готовой строки.
    #[inline]
    pub fn from_str(s: &str) -> Self {
        Self {
            text: s.to_string(),
        }
    }
}

/// Смещения начал строк документа для перевода байтовых позиций в номера строк.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    /// Строит индекс по тексту.
    pub fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            starts,
            len: text.len(),
        }
    }

    /// Количество строк (у пустого текста одна пустая строка).
    #[inline]
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Номер строки, содержащей байтовое смещение.
    pub fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset).saturating_sub(1)
    }

    /// Байтовый диапазон строк `first..=last`, обрезанный по границам документа.
    pub fn span(&self, first: usize, last: usize) -> (usize, usize) {
        let last = last.min(self.line_count() - 1);
        let first = first.min(last);
        let start = self.starts[first];
        let end = self.starts.get(last + 1).map_or(self.len, |&s| s - 1);
        (start, end.max(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_offsets_to_lines() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line_of(0), 0);
        assert_eq!(index.line_of(2), 0);
        assert_eq!(index.line_of(3), 1);
        assert_eq!(index.line_of(6), 2);
        assert_eq!(index.line_of(7), 3);
    }

    #[test]
    fn span_is_clamped() {
        let text = "ab\ncd\nef";
        let index = LineIndex::new(text);
        assert_eq!(index.span(0, 0), (0, 2));
        assert_eq!(index.span(1, 99), (3, 8));
        assert_eq!(&text[3..8], "cd\nef");
    }

    #[test]
    fn empty_text_has_one_line() {
        let index = LineIndex::new("");
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.span(0, 5), (0, 0));
    }

    #[test]
    fn reads_from_reader() {
        let raw = RawStatement::from_reader("ISIN CH0012032048".as_bytes()).unwrap();
        assert_eq!(raw.text, "ISIN CH0012032048");
    }
}
