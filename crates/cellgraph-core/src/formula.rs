//! Interface to the formula engine.
//!
//! The sheet only needs three things from a parsed formula: the positions it
//! reads, a way to evaluate it against sibling cells, and its canonical text.

use std::fmt;

use crate::error::{FormulaError, FormulaSyntaxError};
use crate::position::Position;

/// Resolves a referenced position to a number while a formula is evaluated
pub type Resolver<'a> = dyn FnMut(Position) -> Result<f64, FormulaError> + 'a;

/// Turns formula text into a [`Formula`]
pub trait FormulaEngine {
    type Formula: Formula;

    /// Parse an expression. `expression` excludes the leading `=`.
    fn parse(&self, expression: &str) -> Result<Self::Formula, FormulaSyntaxError>;
}

/// A parsed formula
pub trait Formula: fmt::Debug {
    /// Distinct valid positions read by this formula, in ascending order.
    ///
    /// References outside the grid are not listed; they evaluate to
    /// [`FormulaError::Ref`] instead.
    fn referenced_positions(&self) -> &[Position];

    /// Evaluate, pulling referenced values through `resolve`.
    ///
    /// The first error returned by `resolve` or raised by arithmetic aborts
    /// evaluation and becomes the result.
    fn evaluate(&self, resolve: &mut Resolver<'_>) -> Result<f64, FormulaError>;

    /// Canonical expression text, without the leading `=`
    fn render(&self) -> String;
}
