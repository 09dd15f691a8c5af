//! Nom-based formula parser.
//!
//! Parses the arithmetic grammar (numbers, A1 references, `+ - * /`, unary
//! signs and parentheses) straight from the expression text to an [`Expr`].

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, one_of},
    combinator::{map, opt, recognize},
    multi::fold_many_m_n,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use cellgraph_core::{col_from_label, FormulaSyntaxError, Position};

// =============================================================================
// Helper Combinators
// =============================================================================

/// Skip whitespace
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Fail without trying other branches
fn failure(input: &str, kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, kind))
}

/// Parse a decimal number (integer, fraction and optional exponent)
fn parse_number(input: &str) -> IResult<&str, Expr> {
    let (rest, num_str) = recognize(tuple((
        take_while1(|c: char| c.is_ascii_digit()),
        opt(pair(char('.'), take_while(|c: char| c.is_ascii_digit()))),
        opt(tuple((
            one_of("eE"),
            opt(one_of("+-")),
            take_while1(|c: char| c.is_ascii_digit()),
        ))),
    )))(input)?;

    match num_str.parse::<f64>() {
        Ok(num) if num.is_finite() => Ok((rest, Expr::Number(num))),
        _ => Err(failure(input, nom::error::ErrorKind::Float)),
    }
}

/// Parse a cell reference (e.g., A1, AA10).
///
/// References past the grid edge still parse; they saturate instead of
/// overflowing and evaluate to `#REF!` later. Row `0` does not exist in A1
/// notation and is rejected.
fn parse_cell_ref(input: &str) -> IResult<&str, Expr> {
    let (rest, col_letters) = take_while1(|c: char| c.is_ascii_uppercase())(input)?;
    let (rest, row_digits) = take_while1(|c: char| c.is_ascii_digit())(rest)?;

    let col = col_from_label(col_letters).map_or(i32::MAX, |col| col.min(i32::MAX as u32) as i32);
    let row_number = row_digits.bytes().fold(0u64, |acc, digit| {
        acc.saturating_mul(10).saturating_add(u64::from(digit - b'0'))
    });
    if row_number == 0 {
        return Err(failure(input, nom::error::ErrorKind::Verify));
    }
    let row = (row_number - 1).min(i32::MAX as u64) as i32;

    Ok((rest, Expr::CellRef(Position::new(row, col))))
}

// =============================================================================
// Operator Parsers
// =============================================================================

fn parse_additive_op(input: &str) -> IResult<&str, BinaryOp> {
    let (input, op) = one_of("+-")(input)?;
    Ok((input, if op == '+' { BinaryOp::Add } else { BinaryOp::Sub }))
}

fn parse_multiplicative_op(input: &str) -> IResult<&str, BinaryOp> {
    let (input, op) = one_of("*/")(input)?;
    Ok((input, if op == '*' { BinaryOp::Mul } else { BinaryOp::Div }))
}

// =============================================================================
// Expression Parsers (Precedence Climbing)
// =============================================================================

/// Deepest nesting of parentheses and unary signs
const MAX_NESTING: usize = 256;

/// Tallest expression tree accepted
const MAX_HEIGHT: usize = 1024;

/// A parsed subexpression and the height of its tree
#[derive(Clone)]
struct Parsed {
    expr: Expr,
    height: usize,
}

impl Parsed {
    fn leaf(expr: Expr) -> Self {
        Self { expr, height: 1 }
    }

    fn unary(op: UnaryOp, operand: Parsed) -> Self {
        Self {
            expr: Expr::unary(op, operand.expr),
            height: operand.height + 1,
        }
    }

    fn binary(left: Parsed, (op, right): (BinaryOp, Parsed)) -> Self {
        Self {
            height: left.height.max(right.height) + 1,
            expr: Expr::binary(left.expr, op, right.expr),
        }
    }
}

/// One level deeper, or a failure past [`MAX_NESTING`]
fn nest(input: &str, depth: usize) -> Result<usize, nom::Err<nom::error::Error<&str>>> {
    if depth >= MAX_NESTING {
        Err(failure(input, nom::error::ErrorKind::TooLarge))
    } else {
        Ok(depth + 1)
    }
}

fn within_height<'a>(input: &'a str, rest: &'a str, parsed: Parsed) -> IResult<&'a str, Parsed> {
    if parsed.height > MAX_HEIGHT {
        Err(failure(input, nom::error::ErrorKind::TooLarge))
    } else {
        Ok((rest, parsed))
    }
}

/// Parse a primary expression (number, cell reference, parentheses)
fn parse_primary(input: &str, depth: usize) -> IResult<&str, Parsed> {
    let (input, _) = multispace0(input)?;

    if let Some(inner) = input.strip_prefix('(') {
        let depth = nest(input, depth)?;
        let (rest, parsed) = parse_additive(inner, depth)?;
        let (rest, _) = preceded(multispace0, char(')'))(rest)?;
        return Ok((rest, parsed));
    }

    alt((map(parse_number, Parsed::leaf), map(parse_cell_ref, Parsed::leaf)))(input)
}

/// Parse a unary expression (prefix - or +)
fn parse_unary(input: &str, depth: usize) -> IResult<&str, Parsed> {
    let (input, _) = multispace0(input)?;

    let (rest, sign) = opt(one_of("+-"))(input)?;
    let op = match sign {
        Some('-') => UnaryOp::Neg,
        Some(_) => UnaryOp::Pos,
        None => return parse_primary(input, depth),
    };
    let (rest, operand) = parse_unary(rest, nest(input, depth)?)?;
    within_height(input, rest, Parsed::unary(op, operand))
}

/// Parse multiplicative expressions (*, /)
fn parse_multiplicative(input: &str, depth: usize) -> IResult<&str, Parsed> {
    let (rest, init) = parse_unary(input, depth)?;

    let (rest, parsed) = fold_many_m_n(
        0,
        MAX_HEIGHT,
        pair(ws(parse_multiplicative_op), |i| parse_unary(i, depth)),
        move || init.clone(),
        Parsed::binary,
    )(rest)?;
    within_height(input, rest, parsed)
}

/// Parse additive expressions (+, -)
fn parse_additive(input: &str, depth: usize) -> IResult<&str, Parsed> {
    let (rest, init) = parse_multiplicative(input, depth)?;

    let (rest, parsed) = fold_many_m_n(
        0,
        MAX_HEIGHT,
        pair(ws(parse_additive_op), |i| parse_multiplicative(i, depth)),
        move || init.clone(),
        Parsed::binary,
    )(rest)?;
    within_height(input, rest, parsed)
}

/// Parse a complete expression
pub fn parse_expression(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    let (rest, parsed) = parse_additive(input, 0)?;
    Ok((rest, parsed.expr))
}

// =============================================================================
// Public API
// =============================================================================

/// Parse formula text (without the leading `=`) into an AST
pub fn parse_formula(expression: &str) -> Result<Expr, FormulaSyntaxError> {
    match parse_expression(expression) {
        Ok((remaining, expr)) => {
            let remaining = remaining.trim_start();
            if remaining.is_empty() {
                Ok(expr)
            } else {
                Err(FormulaSyntaxError::new(
                    format!("unexpected input {:?}", remaining),
                    expression.len() - remaining.len(),
                ))
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = expression.len() - e.input.len();
            let message = match e.code {
                nom::error::ErrorKind::Float => "number out of range".to_string(),
                nom::error::ErrorKind::Verify => "row numbers start at 1".to_string(),
                nom::error::ErrorKind::TooLarge => "formula is nested too deeply".to_string(),
                _ if e.input.is_empty() => "unexpected end of formula".to_string(),
                _ => format!("unexpected input {:?}", e.input),
            };
            Err(FormulaSyntaxError::new(message, offset))
        }
        Err(nom::Err::Incomplete(_)) => Err(FormulaSyntaxError::new(
            "unexpected end of formula",
            expression.len(),
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Expr, FormulaSyntaxError> {
        parse_formula(input)
    }

    #[test]
    fn test_number() {
        assert_eq!(parse("123"), Ok(Expr::Number(123.0)));
        assert_eq!(parse("3.25"), Ok(Expr::Number(3.25)));
        assert_eq!(parse("2."), Ok(Expr::Number(2.0)));
        assert_eq!(parse("1e10"), Ok(Expr::Number(1e10)));
        assert_eq!(parse("1.5e-3"), Ok(Expr::Number(1.5e-3)));
        assert_eq!(
            parse("-5"),
            Ok(Expr::unary(UnaryOp::Neg, Expr::Number(5.0)))
        );
    }

    #[test]
    fn test_cell_reference() {
        assert_eq!(parse("A1"), Ok(Expr::cell_ref(0, 0)));
        assert_eq!(parse("AA10"), Ok(Expr::cell_ref(9, 26)));
    }

    #[test]
    fn test_out_of_range_reference_still_parses() {
        assert_eq!(parse("XFE1"), Ok(Expr::cell_ref(0, 16_384)));
        assert_eq!(parse("A16385"), Ok(Expr::cell_ref(16_384, 0)));
        assert!(matches!(
            parse("ZZZZZZZZ99999999999999"),
            Ok(Expr::CellRef(pos)) if !pos.is_valid()
        ));
    }

    #[test]
    fn test_precedence() {
        // 1 + (2 * 3)
        assert_eq!(
            parse("1 + 2 * 3"),
            Ok(Expr::binary(
                Expr::Number(1.0),
                BinaryOp::Add,
                Expr::binary(Expr::Number(2.0), BinaryOp::Mul, Expr::Number(3.0)),
            ))
        );
    }

    #[test]
    fn test_left_associativity() {
        // (8 - 2) - 1
        assert_eq!(
            parse("8-2-1"),
            Ok(Expr::binary(
                Expr::binary(Expr::Number(8.0), BinaryOp::Sub, Expr::Number(2.0)),
                BinaryOp::Sub,
                Expr::Number(1.0),
            ))
        );
    }

    #[test]
    fn test_parentheses_and_whitespace() {
        let expr = parse("  ( A1 + 2 ) * -B3 ").unwrap();
        assert_eq!(expr.to_string(), "(A1+2)*-B3");
        assert_eq!(parse("((A1))"), Ok(Expr::cell_ref(0, 0)));
    }

    #[test]
    fn test_syntax_errors() {
        let inputs = [
            "", "   ", "1+", "(1", "1)", "A", "a1", "A0", "1 2", "SUM(A1)", "1e999", "A1:B2",
            "#REF!",
        ];
        for input in inputs {
            assert!(parse(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let parens = format!("{}1{}", "(".repeat(5000), ")".repeat(5000));
        let err = parse(&parens).unwrap_err();
        assert!(err.message.contains("nested too deeply"), "{err}");

        let signs = format!("{}1", "-".repeat(5000));
        assert!(parse(&signs).unwrap_err().message.contains("nested too deeply"));

        let chain = vec!["A1"; 5000].join("+");
        assert!(parse(&chain).unwrap_err().message.contains("nested too deeply"));
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let parens = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse(&parens), Ok(Expr::Number(1.0)));

        let chain = vec!["1"; 1000].join("+");
        assert!(parse(&chain).is_ok());
    }

    #[test]
    fn test_error_offset() {
        // The dangling operator is where parsing stopped
        let err = parse("1 + )").unwrap_err();
        assert_eq!(err.offset, 2);

        let err = parse("A1 B1").unwrap_err();
        assert_eq!(err.offset, 3);
    }
}
