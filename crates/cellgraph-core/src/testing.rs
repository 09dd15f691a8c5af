//! Minimal engine for unit tests: an expression is a `+`-separated list of
//! A1 references and non-negative numbers, evaluated as their sum.

use crate::error::{FormulaError, FormulaSyntaxError};
use crate::formula::{Formula, FormulaEngine, Resolver};
use crate::position::Position;

#[derive(Debug)]
pub(crate) struct SumFormula {
    refs: Vec<Position>,
    constant: f64,
}

impl Formula for SumFormula {
    fn referenced_positions(&self) -> &[Position] {
        &self.refs
    }

    fn evaluate(&self, resolve: &mut Resolver<'_>) -> Result<f64, FormulaError> {
        let mut total = self.constant;
        for pos in &self.refs {
            total += resolve(*pos)?;
        }
        Ok(total)
    }

    fn render(&self) -> String {
        let mut terms: Vec<String> = self.refs.iter().map(Position::to_text).collect();
        if self.constant != 0.0 || terms.is_empty() {
            terms.push(self.constant.to_string());
        }
        terms.join("+")
    }
}

#[derive(Debug)]
pub(crate) struct SumEngine;

impl FormulaEngine for SumEngine {
    type Formula = SumFormula;

    fn parse(&self, expression: &str) -> Result<SumFormula, FormulaSyntaxError> {
        let mut refs = Vec::new();
        let mut constant = 0.0;

        for term in expression.split('+').map(str::trim) {
            if let Ok(pos) = Position::from_text(term) {
                refs.push(pos);
            } else if let Ok(n) = term.parse::<f64>() {
                constant += n;
            } else {
                return Err(FormulaSyntaxError::new(format!("bad term {term:?}"), 0));
            }
        }

        refs.sort();
        refs.dedup();
        Ok(SumFormula { refs, constant })
    }
}
