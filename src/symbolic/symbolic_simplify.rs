//! # Symbolic Expression Simplification Module
//!
//! Bottom-up simplification of `Expr` trees produced by differentiation and
//! substitution. The rewrites are deliberately local and value-preserving:
//!
//! 1. **Constant Folding**: arithmetic and function calls on numerical constants
//! 2. **Algebraic Identities**: x + 0 = x, x * 1 = x, x * 0 = 0, x - x = 0, x / 1 = x
//! 3. **Constant Collection**: (c1 * x) * c2 = (c1 * c2) * x, -1 * (-1 * x) = x
//! 4. **Power Rules**: x ^ 1 = x, x ^ 0 = 1
//!
//! No rule divides by a symbolic quantity or reorders operands of non-constant
//! terms, so a simplified expression evaluates to the same value as the original
//! wherever the original is defined.

use crate::symbolic::symbolic_engine::Expr;

impl Expr {
    //___________________________________SIMPLIFICATION____________________________________

    /// Main simplification method: constant folding plus algebraic identities,
    /// applied once, bottom-up.
    ///
    /// # Examples
    /// ```rust, ignore
    /// let e = Expr::parse_expression("1*x + 0*y - (2 - 2)")?.simplify();
    /// assert_eq!(e, Expr::Var("x".to_string()));
    /// ```
    pub fn simplify(&self) -> Expr {
        let node = self.map_args(|e| e.simplify());
        if let Some(folded) = fold_constants(&node) {
            return folded;
        }
        match node {
            Expr::Add(lhs, rhs) => match (lhs.as_const(), rhs.as_const()) {
                (Some(a), _) if a == 0.0 => *rhs,
                (_, Some(b)) if b == 0.0 => *lhs,
                _ => Expr::Add(lhs, rhs),
            },
            Expr::Sub(lhs, rhs) => {
                if lhs == rhs {
                    return Expr::Const(0.0);
                }
                match (lhs.as_const(), rhs.as_const()) {
                    (_, Some(b)) if b == 0.0 => *lhs,
                    (Some(a), _) if a == 0.0 => negate(*rhs),
                    _ => Expr::Sub(lhs, rhs),
                }
            }
            Expr::Mul(lhs, rhs) => simplify_product(*lhs, *rhs),
            Expr::Div(lhs, rhs) => match (lhs.as_const(), rhs.as_const()) {
                (Some(a), _) if a == 0.0 => Expr::Const(0.0),
                (_, Some(b)) if b == 1.0 => *lhs,
                (_, Some(b)) if b == -1.0 => negate(*lhs),
                _ => Expr::Div(lhs, rhs),
            },
            Expr::Pow(base, exp) => match exp.as_const() {
                Some(e) if e == 0.0 => Expr::Const(1.0),
                Some(e) if e == 1.0 => *base,
                _ => Expr::Pow(base, exp),
            },
            other => other,
        }
    }
}

/// Evaluates the node when all of its arguments are constants.
/// Division by zero and non-finite results are left unfolded.
fn fold_constants(expr: &Expr) -> Option<Expr> {
    let args = expr.args();
    if args.is_empty() || args.iter().any(|a| a.as_const().is_none()) {
        return None;
    }
    let value = expr.eval_expression(&[], &[]).ok()?;
    if value.is_finite() { Some(Expr::Const(value)) } else { None }
}

/// `-1 * e` with the sign folded into a leading constant when there is one.
fn negate(expr: Expr) -> Expr {
    simplify_product(Expr::Const(-1.0), expr)
}

fn simplify_product(lhs: Expr, rhs: Expr) -> Expr {
    match (lhs.as_const(), rhs.as_const()) {
        (Some(a), _) if a == 0.0 => return Expr::Const(0.0),
        (_, Some(b)) if b == 0.0 => return Expr::Const(0.0),
        (Some(a), _) if a == 1.0 => return rhs,
        (_, Some(b)) if b == 1.0 => return lhs,
        _ => {}
    }
    // c1 * (c2 * x) = (c1 * c2) * x, and the mirrored placements
    let (constant, other) = match (lhs.as_const(), rhs.as_const()) {
        (Some(c), None) => (c, rhs),
        (None, Some(c)) => (c, lhs),
        _ => return Expr::Mul(lhs.boxed(), rhs.boxed()),
    };
    if let Expr::Mul(inner_lhs, inner_rhs) = &other {
        let nested = match (inner_lhs.as_const(), inner_rhs.as_const()) {
            (Some(c), _) => Some((c, inner_rhs.as_ref())),
            (_, Some(c)) => Some((c, inner_lhs.as_ref())),
            _ => None,
        };
        if let Some((c, rest)) = nested {
            return simplify_product(Expr::Const(constant * c), rest.clone());
        }
    }
    if constant == 1.0 {
        return other;
    }
    Expr::Mul(Expr::Const(constant).boxed(), other.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Expr {
        Expr::parse_expression(s).unwrap()
    }

    #[test]
    fn test_simplify_identities() {
        assert_eq!(parse("1*x + 0*y - (2 - 2)").simplify(), Expr::Var("x".to_string()));
        assert_eq!(parse("x^1").simplify(), Expr::Var("x".to_string()));
        assert_eq!(parse("(x+y)^0").simplify(), Expr::Const(1.0));
        assert_eq!(parse("z/1").simplify(), Expr::Var("z".to_string()));
        assert_eq!(parse("sin(x) - sin(x)").simplify(), Expr::Const(0.0));
    }

    #[test]
    fn test_simplify_constant_folding() {
        assert_eq!(parse("2*3 + exp(0) - 4/2").simplify(), Expr::Const(5.0));
        assert_eq!(parse("2^3").simplify(), Expr::Const(8.0));
        // 1/0 stays symbolic
        assert!(matches!(parse("1/0").simplify(), Expr::Div(_, _)));
    }

    #[test]
    fn test_simplify_collects_constants() {
        let e = Expr::Mul(
            Expr::Const(-1.0).boxed(),
            Expr::Mul(Expr::Const(-1.0).boxed(), Expr::Var("x".to_string()).boxed()).boxed(),
        );
        assert_eq!(e.simplify(), Expr::Var("x".to_string()));
        let e = parse("(2*x)*3").simplify();
        assert_eq!(
            e,
            Expr::Mul(Expr::Const(6.0).boxed(), Expr::Var("x".to_string()).boxed())
        );
    }

    #[test]
    fn test_simplify_derivative_of_linear_term() {
        let d = parse("der(x) - 2*x + z").diff("der(x)").simplify();
        assert_eq!(d, Expr::Const(1.0));
        let d = parse("x*x").diff("x").simplify();
        assert!(d.contains_variable("x"));
    }
}
