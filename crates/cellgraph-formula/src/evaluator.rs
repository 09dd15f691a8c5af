use crate::ast::{BinaryOp, Expr, UnaryOp};
use cellgraph_core::{FormulaError, Position};

/// Evaluator for formula AST
pub struct Evaluator<F>
where
    F: FnMut(Position) -> Result<f64, FormulaError>,
{
    resolve: F,
}

impl<F> Evaluator<F>
where
    F: FnMut(Position) -> Result<f64, FormulaError>,
{
    pub fn new(resolve: F) -> Self {
        Self { resolve }
    }

    /// Evaluate an expression AST to a number.
    ///
    /// Operands are evaluated left to right and the first error wins.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<f64, FormulaError> {
        match expr {
            Expr::Number(n) => Ok(*n),
            Expr::CellRef(pos) => (self.resolve)(*pos),
            Expr::Binary { left, op, right } => {
                let left_val = self.evaluate(left)?;
                let right_val = self.evaluate(right)?;
                evaluate_binary(left_val, *op, right_val)
            }
            Expr::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                Ok(match op {
                    UnaryOp::Neg => -value,
                    UnaryOp::Pos => value,
                })
            }
        }
    }
}

fn evaluate_binary(left: f64, op: BinaryOp, right: f64) -> Result<f64, FormulaError> {
    let result = match op {
        BinaryOp::Add => left + right,
        BinaryOp::Sub => left - right,
        BinaryOp::Mul => left * right,
        BinaryOp::Div => {
            if right == 0.0 {
                return Err(FormulaError::Div0);
            }
            left / right
        }
    };

    // Overflow is reported the same way as division by zero
    if result.is_finite() {
        Ok(result)
    } else {
        Err(FormulaError::Div0)
    }
}
