pub mod ast;
pub mod evaluator;
pub mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use evaluator::Evaluator;
pub use parser::parse_formula;

use cellgraph_core::{
    Formula, FormulaEngine, FormulaError, FormulaSyntaxError, Position, Resolver, Sheet,
};
use tracing::trace;

/// Formula engine for arithmetic over numbers and cell references
#[derive(Debug, Default, Clone, Copy)]
pub struct ArithmeticEngine;

impl FormulaEngine for ArithmeticEngine {
    type Formula = ParsedFormula;

    fn parse(&self, expression: &str) -> Result<ParsedFormula, FormulaSyntaxError> {
        let formula = ParsedFormula::parse(expression)?;
        trace!(expression, refs = formula.referenced.len(), "parsed formula");
        Ok(formula)
    }
}

/// A parsed arithmetic formula
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFormula {
    ast: Expr,
    /// Distinct in-grid references, ascending
    referenced: Vec<Position>,
}

impl ParsedFormula {
    /// Parse formula text (without the leading `=`)
    pub fn parse(expression: &str) -> Result<Self, FormulaSyntaxError> {
        let ast = parse_formula(expression)?;

        let mut referenced = Vec::new();
        ast.collect_references(&mut referenced);
        referenced.retain(Position::is_valid);
        referenced.sort();
        referenced.dedup();

        Ok(Self { ast, referenced })
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }
}

impl Formula for ParsedFormula {
    fn referenced_positions(&self) -> &[Position] {
        &self.referenced
    }

    fn evaluate(&self, resolve: &mut Resolver<'_>) -> Result<f64, FormulaError> {
        Evaluator::new(resolve).evaluate(&self.ast)
    }

    fn render(&self) -> String {
        self.ast.to_string()
    }
}

/// Create an empty sheet that evaluates arithmetic formulas
pub fn create_sheet() -> Sheet<ArithmeticEngine> {
    Sheet::new(ArithmeticEngine)
}
