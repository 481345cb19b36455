//! turns a String expression into a symbolic expression
//!
//! # Example
//! ```rust, ignore
//! use dae_reduce::symbolic::symbolic_engine::Expr;
//! let input = "x^2.3 * log(x + y + y^2.6) - der(m)";
//! let parsed_expression = Expr::parse_expression(input)?;
//! ```
//!
//! Grammar, loosest binding first:
//! ```text
//!   expression := term (('+' | '-') term)*
//!   term       := unary (('*' | '/') unary)*
//!   unary      := ('-' | '+') unary | power
//!   power      := atom ('^' unary)?            right associative
//!   atom       := number | function '(' expression ')' | 'der' '(' ident ')'
//!               | ident | '(' expression ')'
//! ```
//! so `-x^2` reads as `-(x^2)` and `a^b^c` as `a^(b^c)`.

use crate::symbolic::symbolic_engine::Expr;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit0, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded},
};

/// Skips surrounding whitespace.
fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

/// Identifier: `[A-Za-z_][A-Za-z0-9_.]*`
pub fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_"), tag(".")))),
    ))
    .parse(input)
}

/// Unsigned decimal number with optional fraction and exponent.
fn number(input: &str) -> IResult<&str, f64> {
    let mantissa = alt((
        recognize(pair(digit1, opt(pair(char('.'), digit0)))),
        recognize(pair(char('.'), digit1)),
    ));
    let exponent = opt(recognize((one_of("eE"), opt(one_of("+-")), digit1)));
    map_res(recognize(pair(mantissa, exponent)), |s: &str| s.parse::<f64>()).parse(input)
}

fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Const(val) => Expr::Const(-val),
        other => -other,
    }
}

fn function_call(name: &str, arg: Expr) -> Option<Expr> {
    let b = arg.boxed();
    let call = match name {
        "exp" => Expr::Exp(b),
        "ln" | "log" => Expr::Ln(b),
        "sin" => Expr::sin(b),
        "cos" => Expr::cos(b),
        "tan" | "tg" => Expr::tg(b),
        "asin" | "arcsin" => Expr::arcsin(b),
        "acos" | "arccos" => Expr::arccos(b),
        "atan" | "arctg" => Expr::arctg(b),
        "sqrt" => Expr::Pow(b, Expr::Const(0.5).boxed()),
        _ => return None,
    };
    Some(call)
}

/// Variable, derivative handle, or function call.
fn call_or_variable(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = identifier(input)?;
    let (after_ws, _) = multispace0(rest)?;
    let open: IResult<&str, char> = char('(').parse(after_ws);
    let Ok((inner, _)) = open else {
        return Ok((rest, Expr::Var(name.to_string())));
    };
    if name == "der" {
        let (inner, state) = ws(identifier).parse(inner)?;
        let (inner, _) = char(')').parse(inner)?;
        return Ok((inner, Expr::der(state)));
    }
    let (inner, arg) = expression(inner)?;
    let (inner, _) = ws(char(')')).parse(inner)?;
    match function_call(name, arg) {
        Some(call) => Ok((inner, call)),
        None => Err(nom::Err::Failure(Error::new(input, ErrorKind::Tag))),
    }
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        map(number, Expr::Const),
        call_or_variable,
        delimited(char('('), expression, ws(char(')'))),
    )))
    .parse(input)
}

fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(ws(char('^')), unary)).parse(input)?;
    match exponent {
        Some(exp) => Ok((input, base.pow(exp))),
        None => Ok((input, base)),
    }
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), negate),
        preceded(ws(char('+')), unary),
        power,
    ))
    .parse(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, (first, rest)) = pair(unary, many0(pair(ws(one_of("*/")), unary))).parse(input)?;
    let folded = rest.into_iter().fold(first, |acc, (op, rhs)| match op {
        '*' => acc * rhs,
        _ => acc / rhs,
    });
    Ok((input, folded))
}

/// Full infix expression; usable as a building block by other nom parsers.
pub fn expression(input: &str) -> IResult<&str, Expr> {
    let (input, (first, rest)) = pair(term, many0(pair(ws(one_of("+-")), term))).parse(input)?;
    let folded = rest.into_iter().fold(first, |acc, (op, rhs)| match op {
        '+' => acc + rhs,
        _ => acc - rhs,
    });
    Ok((input, folded))
}

/// Parses a complete string; trailing input is an error.
pub fn parse_expression_func(input: &str) -> Result<Expr, String> {
    all_consuming(ws(expression))
        .parse(input)
        .map(|(_, expr)| expr)
        .map_err(|e| format!("cannot parse expression '{}': {}", input.trim(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(s: &str) -> Expr {
        Expr::Var(s.to_string())
    }

    #[test]
    fn test_parse_constant() {
        assert_eq!(parse_expression_func("1.0").unwrap(), Expr::Const(1.0));
        assert_eq!(parse_expression_func(" 2.5e-3 ").unwrap(), Expr::Const(2.5e-3));
        assert_eq!(parse_expression_func("-4").unwrap(), Expr::Const(-4.0));
    }

    #[test]
    fn test_parse_variable() {
        assert_eq!(parse_expression_func("x").unwrap(), var("x"));
        assert_eq!(parse_expression_func("vol.m_in").unwrap(), var("vol.m_in"));
    }

    #[test]
    fn test_parse_derivative_handle() {
        assert_eq!(parse_expression_func("der( m )").unwrap(), var("der(m)"));
        let e = parse_expression_func("der(x) + 2*x").unwrap();
        assert_eq!(e, var("der(x)") + Expr::Const(2.0) * var("x"));
    }

    #[test]
    fn test_precedence_and_associativity() {
        let e = parse_expression_func("a - b - c").unwrap();
        assert_eq!(e, (var("a") - var("b")) - var("c"));
        let e = parse_expression_func("a + b*c^2").unwrap();
        assert_eq!(e, var("a") + var("b") * var("c").pow(Expr::Const(2.0)));
        let e = parse_expression_func("a^b^c").unwrap();
        assert_eq!(e, var("a").pow(var("b").pow(var("c"))));
        let e = parse_expression_func("-x^2").unwrap();
        assert_eq!(e, -(var("x").pow(Expr::Const(2.0))));
        let e = parse_expression_func("a/b*c").unwrap();
        assert_eq!(e, (var("a") / var("b")) * var("c"));
    }

    #[test]
    fn test_parse_functions() {
        assert_eq!(parse_expression_func("exp(x)").unwrap(), var("x").exp());
        assert_eq!(parse_expression_func("log(x)").unwrap(), var("x").ln());
        assert_eq!(parse_expression_func("tan(x)").unwrap(), Expr::tg(var("x").boxed()));
        assert_eq!(
            parse_expression_func("sqrt(x)").unwrap(),
            var("x").pow(Expr::Const(0.5))
        );
        let e = parse_expression_func("sin(cos(x) * (y + 1))").unwrap();
        let vars = e.all_arguments_are_variables();
        assert_eq!(vars, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_invalid_expression() {
        assert!(parse_expression_func("").is_err());
        assert!(parse_expression_func("x +").is_err());
        assert!(parse_expression_func("(x + y").is_err());
        assert!(parse_expression_func("foo(x)").is_err());
        assert!(parse_expression_func("x y").is_err());
    }
}
