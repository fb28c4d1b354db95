use crate::expr::{BinaryOp, Expr};
use chumsky::{pratt::*, prelude::*};
use std::ops::Range;

pub type Span = SimpleSpan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub span: Range<usize>,
    pub message: String,
}

/// Parses math source such as `37/3`, `(1, 2)` or `(0,0), (4,0), (0,3)`.
pub fn parse(source: &str) -> Result<Expr, Vec<ParseError>> {
    let (output, errors) = parser().parse(source).into_output_errors();
    match output {
        Some(expr) if errors.is_empty() => Ok(expr),
        _ => Err(errors
            .into_iter()
            .map(|error| ParseError {
                span: error.span().into_range(),
                message: error.to_string(),
            })
            .collect()),
    }
}

fn parser<'src>() -> impl Parser<'src, &'src str, Expr, extra::Err<Rich<'src, char, Span>>> {
    let identifier = any()
        .filter(|character: &char| character.is_alphabetic() || *character == 'π' || *character == '∞')
        .then(
            any()
                .filter(|character: &char| character.is_alphanumeric() || *character == '_')
                .repeated(),
        )
        .to_slice();

    let expression = recursive(|expression| {
        let number = text::int(10)
            .then(just('.').then(text::digits(10)).or_not())
            .to_slice()
            .from_str()
            .unwrapped()
            .map(Expr::Number);

        let arguments = expression
            .clone()
            .separated_by(just(',').padded())
            .collect::<Vec<_>>()
            .delimited_by(just('(').padded(), just(')').padded());

        let call = identifier
            .clone()
            .then(arguments)
            .map(|(function, args): (&str, Vec<Expr>)| Expr::Apply {
                function: function.to_string(),
                args,
            });

        let grouped = expression
            .clone()
            .separated_by(just(',').padded())
            .at_least(1)
            .collect::<Vec<_>>()
            .delimited_by(just('(').padded(), just(')').padded())
            .map(|mut items: Vec<Expr>| {
                if items.len() == 1 {
                    items.remove(0)
                } else {
                    Expr::Tuple(items)
                }
            });

        let symbol = identifier.map(|name: &str| Expr::Symbol(name.to_string()));

        let atom = choice((number, call, grouped, symbol)).padded();

        atom.pratt((
            prefix(3, just('-').padded(), |_, operand, _| match operand {
                Expr::Number(value) => Expr::Number(-value),
                operand => Expr::Neg(Box::new(operand)),
            }),
            infix(right(4), just('^').padded(), |l, _, r, _| {
                Expr::binary(BinaryOp::Power, l, r)
            }),
            infix(left(2), just('*').padded(), |l, _, r, _| {
                Expr::binary(BinaryOp::Multiply, l, r)
            }),
            infix(left(2), just('/').padded(), |l, _, r, _| {
                Expr::binary(BinaryOp::Divide, l, r)
            }),
            infix(left(1), just('+').padded(), |l, _, r, _| {
                Expr::binary(BinaryOp::Add, l, r)
            }),
            infix(left(1), just('-').padded(), |l, _, r, _| {
                Expr::binary(BinaryOp::Subtract, l, r)
            }),
        ))
    });

    expression
        .separated_by(just(',').padded())
        .at_least(1)
        .collect::<Vec<_>>()
        .map(|mut items: Vec<Expr>| {
            if items.len() == 1 {
                items.remove(0)
            } else {
                Expr::List(items)
            }
        })
        .padded()
        .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(expr.evaluate_to_constant(), Some(7.0));
        let expr = parse("-2^2").unwrap();
        assert_eq!(expr.evaluate_to_constant(), Some(-4.0));
        let expr = parse("2^3^2").unwrap();
        assert_eq!(expr.evaluate_to_constant(), Some(512.0));
    }

    #[test]
    fn parses_vertex_list() {
        let expr = parse("(0,0), (4,0), (0,3)").unwrap();
        let vertices = expr.components().unwrap();
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1], Expr::tuple_of_numbers([4.0, 0.0]));
    }

    #[test]
    fn parses_function_calls() {
        let expr = parse("sqrt(16) + abs(-2)").unwrap();
        assert_eq!(expr.evaluate_to_constant(), Some(6.0));
    }

    #[test]
    fn reports_error_span() {
        let errors = parse("3 +").unwrap_err();
        assert!(!errors.is_empty());
        assert!(errors[0].span.start <= 3);
    }
}
