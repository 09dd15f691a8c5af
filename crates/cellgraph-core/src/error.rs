use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::position::Position;

/// Result alias for structural sheet operations
pub type SheetResult<T> = std::result::Result<T, SheetError>;

/// Errors that reject a sheet operation outright.
///
/// A call failing with any of these leaves cells, dependency edges and the
/// printable size exactly as they were.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SheetError {
    #[error("invalid position ({}, {})", .0.row, .0.col)]
    InvalidPosition(Position),

    #[error(transparent)]
    FormulaSyntax(#[from] FormulaSyntaxError),

    #[error("circular dependency through {0}")]
    CircularDependency(Position),
}

/// Malformed formula expression
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("formula syntax error at offset {offset}: {message}")]
pub struct FormulaSyntaxError {
    pub message: String,
    /// Byte offset into the expression (text after the leading `=`)
    pub offset: usize,
}

impl FormulaSyntaxError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        FormulaSyntaxError {
            message: message.into(),
            offset,
        }
    }
}

/// Text that is not a valid A1 reference inside the grid
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid cell reference: {0:?}")]
pub struct ParsePositionError(pub String);

/// Formula evaluation errors.
///
/// These are cell values, not failures: they are returned from value queries
/// and propagate into every formula that reads the cell holding them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormulaError {
    /// #REF! - Reference outside the grid
    Ref,
    /// #VALUE! - Referenced text is not a number
    Value,
    /// #DIV/0! - Division by zero or another non-finite result
    Div0,
    /// #NAME? - Unrecognized name
    Name,
    /// #ARG! - Invalid argument
    Arg,
    /// #ERROR! - Anything else, including runaway evaluation
    Other,
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::Ref => write!(f, "#REF!"),
            FormulaError::Value => write!(f, "#VALUE!"),
            FormulaError::Div0 => write!(f, "#DIV/0!"),
            FormulaError::Name => write!(f, "#NAME?"),
            FormulaError::Arg => write!(f, "#ARG!"),
            FormulaError::Other => write!(f, "#ERROR!"),
        }
    }
}
