#![warn(missing_docs)]
//! Извлечение позиций из текста банковских выписок: ISIN, наименование,
//! рыночная стоимость, валюта и уверенность, со сверкой итога портфеля.
//!
//! Все стадии — чистые функции без глобального изменяемого состояния,
//! поэтому документы можно обрабатывать параллельно в независимых потоках.

mod assembler;
mod error;
mod extractor;
mod identifier;
mod meta;
mod numbers;
mod raw;
mod reconcile;
mod selector;
mod types;
mod utils;
mod window;

pub use crate::assembler::{DEFAULT_CURRENCY, MAX_NAME_LEN, assemble};
pub use crate::error::ExtractError;
pub use crate::extractor::{
    DEFAULT_CONTEXT_RADIUS, DEFAULT_OUTLIER_THRESHOLD, ExtractOptions, StatementBuilder,
    process_document_text, process_document_text_with,
};
pub use crate::identifier::{is_valid_isin, scan_identifiers};
pub use crate::meta::parse_meta;
pub use crate::numbers::{MagnitudeRange, normalize, parse_amount, scan_numbers};
pub use crate::raw::{LineIndex, RawStatement};
pub use crate::reconcile::{accuracy_ratio, dedupe, find_outliers, reconcile};
pub use crate::selector::{HeuristicSelector, SCORE_EPSILON, ScoreWeights, ValueSelector};
pub use crate::types::*;
pub use crate::window::{ContextWindow, LineFence, build_fenced_window, build_window};
