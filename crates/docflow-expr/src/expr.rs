use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Power => "^",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Subtract => 1,
            Self::Multiply | Self::Divide => 2,
            Self::Power => 4,
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Subtract => lhs - rhs,
            Self::Multiply => lhs * rhs,
            Self::Divide => lhs / rhs,
            Self::Power => lhs.powf(rhs),
        }
    }
}

/// Expression tree.
///
/// `Tuple` is a parenthesized vector such as `(1, 2)`; `List` is a bare
/// top-level comma list such as `(0,0), (4,0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Symbol(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Apply {
        function: String,
        args: Vec<Expr>,
    },
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
}

impl Expr {
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn tuple_of_numbers(values: impl IntoIterator<Item = f64>) -> Self {
        Self::Tuple(values.into_iter().map(Self::Number).collect())
    }

    /// Numeric value of a constant expression.
    ///
    /// Returns `None` when the tree contains free symbols or is a vector.
    /// Arithmetic that is undefined (such as `0/0`) yields `Some(NaN)`.
    pub fn evaluate_to_constant(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Symbol(name) => match name.as_str() {
                "pi" | "π" => Some(std::f64::consts::PI),
                "e" => Some(std::f64::consts::E),
                "infinity" | "∞" => Some(f64::INFINITY),
                _ => None,
            },
            Self::Neg(operand) => operand.evaluate_to_constant().map(|value| -value),
            Self::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate_to_constant()?;
                let rhs = rhs.evaluate_to_constant()?;
                Some(op.apply(lhs, rhs))
            }
            Self::Apply { function, args } => {
                let [arg] = args.as_slice() else {
                    return None;
                };
                let arg = arg.evaluate_to_constant()?;
                let value = match function.as_str() {
                    "sqrt" => arg.sqrt(),
                    "sin" => arg.sin(),
                    "cos" => arg.cos(),
                    "tan" => arg.tan(),
                    "exp" => arg.exp(),
                    "ln" | "log" => arg.ln(),
                    "abs" => arg.abs(),
                    "floor" => arg.floor(),
                    "ceil" => arg.ceil(),
                    _ => return None,
                };
                Some(value)
            }
            Self::Tuple(_) | Self::List(_) => None,
        }
    }

    /// Entries of a tuple or list.
    pub fn components(&self) -> Option<&[Expr]> {
        match self {
            Self::Tuple(items) | Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Component `index` of a vector literal. A scalar is its own only component.
    pub fn component(&self, index: usize) -> Option<&Expr> {
        match self.components() {
            Some(items) => items.get(index),
            None if index == 0 => Some(self),
            None => None,
        }
    }

    /// Number of vector components (1 for scalars).
    pub fn dimension(&self) -> usize {
        self.components().map_or(1, <[Expr]>::len)
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Binary { op, .. } => op.precedence(),
            Self::Neg(_) => 3,
            Self::Number(value) if *value < 0.0 => 3,
            _ => u8::MAX,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: u8, strict: bool) -> fmt::Result {
        let own = self.precedence();
        if own < parent || (strict && own == parent) {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "∞" } else { "-∞" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", format_number(*value)),
            Self::Symbol(name) => write!(f, "{name}"),
            Self::Neg(operand) => {
                write!(f, "-")?;
                operand.fmt_operand(f, 3, false)
            }
            Self::Binary { op, lhs, rhs } => {
                let precedence = op.precedence();
                // `^` is right associative, the rest are left associative
                let right_assoc = *op == BinaryOp::Power;
                lhs.fmt_operand(f, precedence, right_assoc)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_operand(f, precedence, !right_assoc)
            }
            Self::Apply { function, args } => {
                write!(f, "{function}(")?;
                write_separated(f, args)?;
                write!(f, ")")
            }
            Self::Tuple(items) => {
                write!(f, "(")?;
                write_separated(f, items)?;
                write!(f, ")")
            }
            Self::List(items) => write_separated(f, items),
        }
    }
}

fn write_separated(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn evaluates_rational() {
        let expr = parse("37/3").unwrap();
        let value = expr.evaluate_to_constant().unwrap();
        assert!((value - 12.333_333_333_333_334).abs() < 1e-12);
    }

    #[test]
    fn symbolic_expression_has_no_constant() {
        let expr = parse("x + 1").unwrap();
        assert_eq!(expr.evaluate_to_constant(), None);
        assert_eq!(parse("2 pi").ok(), None);
    }

    #[test]
    fn tuple_components() {
        let expr = parse("(3, -4)").unwrap();
        assert_eq!(expr.dimension(), 2);
        assert_eq!(expr.component(1).and_then(Expr::evaluate_to_constant), Some(-4.0));
        assert_eq!(expr.component(2), None);

        let scalar = Expr::number(7.0);
        assert_eq!(scalar.component(0), Some(&scalar));
    }

    #[test]
    fn display_respects_precedence() {
        assert_eq!(parse("(1 + 2) * 3").unwrap().to_string(), "(1 + 2) * 3");
        assert_eq!(parse("1 - (2 - 3)").unwrap().to_string(), "1 - (2 - 3)");
        assert_eq!(parse("2^3^2").unwrap().to_string(), "2 ^ 3 ^ 2");
        assert_eq!(Expr::tuple_of_numbers([1.0, 2.5]).to_string(), "(1, 2.5)");
    }
}
