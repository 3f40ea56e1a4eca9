use super::parser::{parse, Aggregate, BinaryOp, Expr, Reference};
use crate::error::{GradeError, GradeResult};

/// Supplies the numeric value behind an `@...` reference.
pub trait ReferenceValues {
    fn value_of(&mut self, reference: &Reference) -> GradeResult<f64>;
}

/// Round half to even, the convention used for every derived score.
pub fn round_score(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// Round half to even at `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

fn finite(value: f64, what: &str) -> GradeResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GradeError::invalid(format!("{} is not a finite number", what)))
    }
}

fn apply(op: BinaryOp, a: f64, b: f64) -> GradeResult<f64> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(GradeError::invalid("division by zero"));
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(GradeError::invalid("integer division by zero"));
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(GradeError::invalid("modulo by zero"));
            }
            // Result takes the sign of the divisor.
            a - b * (a / b).floor()
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(GradeError::invalid("zero raised to a negative power"));
            }
            a.powf(b)
        }
    };
    finite(value, "intermediate result")
}

fn aggregate(func: Aggregate, values: &[f64]) -> f64 {
    match func {
        Aggregate::Sum => values.iter().sum(),
        Aggregate::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

pub fn evaluate_tree(expr: &Expr, refs: &mut dyn ReferenceValues) -> GradeResult<f64> {
    match expr {
        Expr::Number(v) => Ok(*v),
        Expr::Reference(r) => refs.value_of(r),
        Expr::Call { func, args } => {
            if args.is_empty() {
                return Err(GradeError::invalid("function call needs at least one argument"));
            }
            let values = args
                .iter()
                .map(|a| evaluate_tree(a, refs))
                .collect::<GradeResult<Vec<f64>>>()?;
            finite(aggregate(*func, &values), "aggregate result")
        }
        Expr::Neg(inner) => Ok(-evaluate_tree(inner, refs)?),
        Expr::Binary { op, lhs, rhs } => {
            let a = evaluate_tree(lhs, refs)?;
            let b = evaluate_tree(rhs, refs)?;
            apply(*op, a, b)
        }
    }
}

/// Parse and evaluate `input`, rounding the result to an integer score.
pub fn evaluate(input: &str, refs: &mut dyn ReferenceValues) -> GradeResult<i64> {
    let expr = parse(input)?;
    let value = evaluate_tree(&expr, refs)?;
    Ok(round_score(finite(value, "expression result")?))
}
