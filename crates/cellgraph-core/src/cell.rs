use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;

use crate::error::{FormulaError, FormulaSyntaxError};
use crate::formula::{Formula, FormulaEngine};
use crate::position::Position;

/// Leading character that marks formula input
pub const FORMULA_SIGN: char = '=';
/// Leading character that forces literal text (e.g. `'=not a formula`)
pub const ESCAPE_SIGN: char = '\'';

/// The value a cell resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Error(FormulaError),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Text(String::new())
    }
}

impl From<Result<f64, FormulaError>> for CellValue {
    fn from(result: Result<f64, FormulaError>) -> Self {
        match result {
            Ok(n) => CellValue::Number(n),
            Err(e) => CellValue::Error(e),
        }
    }
}

impl CellValue {
    /// Coerce to a number the way a formula reading this value sees it.
    ///
    /// Empty text reads as `0`, text made only of ASCII digits reads as that
    /// number (`#VALUE!` if it overflows), and any other text is a `#VALUE!`
    /// error. Errors pass through.
    pub fn to_number(&self) -> Result<f64, FormulaError> {
        match self {
            CellValue::Number(n) => Ok(*n),
            CellValue::Text(s) if s.is_empty() => Ok(0.0),
            CellValue::Text(s) if s.bytes().all(|b| b.is_ascii_digit()) => {
                match s.parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(n),
                    _ => Err(FormulaError::Value),
                }
            }
            CellValue::Text(_) => Err(FormulaError::Value),
            CellValue::Error(e) => Err(*e),
        }
    }

    /// Display form used when printing values
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Error(e) => e.to_string(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// Classification of a cell's input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Empty,
    Text,
    Formula,
}

/// Parsed content of a cell
#[derive(Debug)]
pub enum CellContent<F> {
    Empty,
    /// Literal text with any leading escape marker removed
    Text(String),
    Formula {
        formula: F,
        /// Last evaluated result; `None` until evaluated or after invalidation
        cached_value: RefCell<Option<CellValue>>,
    },
}

/// One populated grid slot.
///
/// A cell is only meaningful inside the sheet that owns it: evaluating a
/// formula needs the sheet to resolve sibling positions.
#[derive(Debug)]
pub struct Cell<F> {
    raw_text: String,
    content: CellContent<F>,
}

impl<F: Formula> Cell<F> {
    /// Classify `text` into a cell, parsing it with `engine` if it is a formula
    pub fn parse<E>(text: impl Into<String>, engine: &E) -> Result<Self, FormulaSyntaxError>
    where
        E: FormulaEngine<Formula = F>,
    {
        let raw_text = text.into();

        let content = if raw_text.is_empty() {
            CellContent::Empty
        } else if raw_text.len() > 1 && raw_text.starts_with(FORMULA_SIGN) {
            CellContent::Formula {
                formula: engine.parse(&raw_text[FORMULA_SIGN.len_utf8()..])?,
                cached_value: RefCell::new(None),
            }
        } else if let Some(literal) = raw_text.strip_prefix(ESCAPE_SIGN) {
            CellContent::Text(literal.to_string())
        } else {
            CellContent::Text(raw_text.clone())
        };

        Ok(Cell { raw_text, content })
    }

    pub fn kind(&self) -> CellKind {
        match self.content {
            CellContent::Empty => CellKind::Empty,
            CellContent::Text(_) => CellKind::Text,
            CellContent::Formula { .. } => CellKind::Formula,
        }
    }

    pub fn content(&self) -> &CellContent<F> {
        &self.content
    }

    /// The exact text last supplied for this cell
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Text form for editing: the raw input, except that formulas are
    /// re-rendered in canonical form
    pub fn text(&self) -> String {
        match &self.content {
            CellContent::Formula { formula, .. } => {
                format!("{}{}", FORMULA_SIGN, formula.render())
            }
            CellContent::Empty | CellContent::Text(_) => self.raw_text.clone(),
        }
    }

    /// Positions this cell reads (empty unless it holds a formula)
    pub fn referenced_positions(&self) -> &[Position] {
        match &self.content {
            CellContent::Formula { formula, .. } => formula.referenced_positions(),
            CellContent::Empty | CellContent::Text(_) => &[],
        }
    }

    /// Whether this cell reads any other position
    pub fn is_referenced(&self) -> bool {
        !self.referenced_positions().is_empty()
    }

    /// Cached formula result, if any
    pub fn cached_value(&self) -> Option<CellValue> {
        match &self.content {
            CellContent::Formula { cached_value, .. } => cached_value.borrow().clone(),
            CellContent::Empty | CellContent::Text(_) => None,
        }
    }

    /// Drop the cached formula result. Returns whether anything was cached.
    pub fn invalidate(&self) -> bool {
        match &self.content {
            CellContent::Formula { cached_value, .. } => cached_value.borrow_mut().take().is_some(),
            CellContent::Empty | CellContent::Text(_) => false,
        }
    }

    /// Whether this is a formula with no cached result
    pub fn is_stale(&self) -> bool {
        match &self.content {
            CellContent::Formula { cached_value, .. } => cached_value.borrow().is_none(),
            CellContent::Empty | CellContent::Text(_) => false,
        }
    }

    /// Resolve the cell's value.
    ///
    /// Formulas return their cached result when present; otherwise `evaluate`
    /// computes it. Only an [`Evaluated::Final`] result is cached.
    pub(crate) fn value_with<V>(&self, evaluate: V) -> CellValue
    where
        V: FnOnce(&F) -> Evaluated,
    {
        match &self.content {
            CellContent::Empty => CellValue::default(),
            CellContent::Text(text) => CellValue::Text(text.clone()),
            CellContent::Formula {
                formula,
                cached_value,
            } => {
                if let Some(value) = cached_value.borrow().as_ref() {
                    return value.clone();
                }
                // No borrow is held while evaluating; the formula may pull in
                // other cells.
                match evaluate(formula) {
                    Evaluated::Final(value) => {
                        *cached_value.borrow_mut() = Some(value.clone());
                        value
                    }
                    Evaluated::Provisional(value) => value,
                }
            }
        }
    }
}

/// Outcome of evaluating a formula cell
#[derive(Debug)]
pub(crate) enum Evaluated {
    /// Holds until one of the cell's inputs changes
    Final(CellValue),
    /// Cut short by the evaluation guard; returned to the caller only
    Provisional(CellValue),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Resolver;

    /// Formula made of a single reference, e.g. `=B2`
    #[derive(Debug)]
    struct RefFormula(Vec<Position>);

    impl Formula for RefFormula {
        fn referenced_positions(&self) -> &[Position] {
            &self.0
        }

        fn evaluate(&self, resolve: &mut Resolver<'_>) -> Result<f64, FormulaError> {
            resolve(self.0[0])
        }

        fn render(&self) -> String {
            self.0[0].to_text()
        }
    }

    struct RefEngine;

    impl FormulaEngine for RefEngine {
        type Formula = RefFormula;

        fn parse(&self, expression: &str) -> Result<RefFormula, FormulaSyntaxError> {
            Position::from_text(expression.trim())
                .map(|pos| RefFormula(vec![pos]))
                .map_err(|e| FormulaSyntaxError::new(e.to_string(), 0))
        }
    }

    fn cell(text: &str) -> Cell<RefFormula> {
        Cell::parse(text, &RefEngine).unwrap()
    }

    #[test]
    fn test_classification() {
        assert_eq!(cell("").kind(), CellKind::Empty);
        assert_eq!(cell("hello").kind(), CellKind::Text);
        assert_eq!(cell("=").kind(), CellKind::Text);
        assert_eq!(cell("'=A1").kind(), CellKind::Text);
        assert_eq!(cell("=A1").kind(), CellKind::Formula);
    }

    #[test]
    fn test_escaped_text() {
        let c = cell("'=A1");
        assert_eq!(
            c.value_with(|_| unreachable!()),
            CellValue::Text("=A1".to_string())
        );
        assert_eq!(c.text(), "'=A1");
        assert!(!c.is_referenced());
    }

    #[test]
    fn test_formula_text_is_canonical() {
        let c = cell("= B2 ");
        assert_eq!(c.raw_text(), "= B2 ");
        assert_eq!(c.text(), "=B2");
        assert_eq!(c.referenced_positions(), &[Position::new(1, 1)]);
        assert!(c.is_referenced());
    }

    #[test]
    fn test_syntax_error_propagates() {
        assert!(Cell::parse("=not a ref", &RefEngine).is_err());
    }

    #[test]
    fn test_formula_value_is_cached_until_invalidated() {
        let c = cell("=A1");
        assert_eq!(c.cached_value(), None);

        let value = c.value_with(|_| Evaluated::Final(CellValue::Number(3.0)));
        assert_eq!(value, CellValue::Number(3.0));
        assert_eq!(c.cached_value(), Some(CellValue::Number(3.0)));

        // Cache hit: the evaluator is not consulted again
        assert_eq!(c.value_with(|_| unreachable!()), CellValue::Number(3.0));

        assert!(c.invalidate());
        assert!(!c.invalidate());
        assert_eq!(
            c.value_with(|_| Evaluated::Final(CellValue::Number(4.0))),
            CellValue::Number(4.0)
        );
    }

    #[test]
    fn test_provisional_value_is_not_cached() {
        let c = cell("=A1");
        assert!(c.is_stale());

        let interrupted = CellValue::Error(FormulaError::Other);
        assert_eq!(
            c.value_with(|_| Evaluated::Provisional(interrupted.clone())),
            interrupted
        );
        assert!(c.is_stale());
        assert_eq!(c.cached_value(), None);

        c.value_with(|_| Evaluated::Final(CellValue::Number(1.0)));
        assert!(!c.is_stale());
        assert!(!cell("text").is_stale());
    }

    #[test]
    fn test_to_number_coercion() {
        assert_eq!(CellValue::Number(2.5).to_number(), Ok(2.5));
        assert_eq!(CellValue::Text(String::new()).to_number(), Ok(0.0));
        assert_eq!(CellValue::Text("42".to_string()).to_number(), Ok(42.0));
        assert_eq!(CellValue::Text("4.2".to_string()).to_number(), Err(FormulaError::Value));
        assert_eq!(CellValue::Text("-1".to_string()).to_number(), Err(FormulaError::Value));
        assert_eq!(CellValue::Text("abc".to_string()).to_number(), Err(FormulaError::Value));
        assert_eq!(CellValue::Error(FormulaError::Div0).to_number(), Err(FormulaError::Div0));

        let huge = CellValue::Text("9".repeat(400));
        assert_eq!(huge.to_number(), Err(FormulaError::Value));
    }

    #[test]
    fn test_cell_value_as_text() {
        assert_eq!(CellValue::Number(42.0).as_text(), "42");
        assert_eq!(CellValue::Number(42.5).as_text(), "42.5");
        assert_eq!(CellValue::Error(FormulaError::Ref).as_text(), "#REF!");
        assert_eq!(CellValue::Text("hello".to_string()).as_text(), "hello");
    }

    #[test]
    fn test_cell_value_serialization() {
        let json = serde_json::to_string(&CellValue::Number(1.5)).unwrap();
        assert_eq!(json, r#"{"type":"Number","value":1.5}"#);

        let json = serde_json::to_string(&CellValue::Error(FormulaError::Div0)).unwrap();
        assert_eq!(json, r#"{"type":"Error","value":"Div0"}"#);
    }
}
