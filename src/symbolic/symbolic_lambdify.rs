use crate::symbolic::symbolic_engine::Expr;

/// Index-addressed evaluator compiled from an `Expr`.
///
/// Variables are resolved to slots of the argument slice once, at compile time,
/// so evaluation is a plain tree walk with no name lookups. This is what the
/// simulator calls at every integrator stage.
#[derive(Clone, Debug)]
pub enum Lambda {
    Var(usize),
    Const(f64),
    Add(Box<Lambda>, Box<Lambda>),
    Sub(Box<Lambda>, Box<Lambda>),
    Mul(Box<Lambda>, Box<Lambda>),
    Div(Box<Lambda>, Box<Lambda>),
    Pow(Box<Lambda>, Box<Lambda>),
    Exp(Box<Lambda>),
    Ln(Box<Lambda>),
    Sin(Box<Lambda>),
    Cos(Box<Lambda>),
    Tg(Box<Lambda>),
    ArcSin(Box<Lambda>),
    ArcCos(Box<Lambda>),
    ArcTg(Box<Lambda>),
}

impl Expr {
    /// Compiles the expression against an ordered argument list.
    ///
    /// Fails with the name of the first variable that has no slot in `vars`.
    pub fn compile(&self, vars: &[&str]) -> Result<Lambda, String> {
        let c = |e: &Expr| e.compile(vars).map(Box::new);
        let lambda = match self {
            Expr::Var(name) => {
                let idx = vars
                    .iter()
                    .position(|&v| v == name)
                    .ok_or_else(|| format!("unresolved variable {}", name))?;
                Lambda::Var(idx)
            }
            Expr::Const(v) => Lambda::Const(*v),
            Expr::Add(a, b) => Lambda::Add(c(a)?, c(b)?),
            Expr::Sub(a, b) => Lambda::Sub(c(a)?, c(b)?),
            Expr::Mul(a, b) => Lambda::Mul(c(a)?, c(b)?),
            Expr::Div(a, b) => Lambda::Div(c(a)?, c(b)?),
            Expr::Pow(a, b) => Lambda::Pow(c(a)?, c(b)?),
            Expr::Exp(e) => Lambda::Exp(c(e)?),
            Expr::Ln(e) => Lambda::Ln(c(e)?),
            Expr::sin(e) => Lambda::Sin(c(e)?),
            Expr::cos(e) => Lambda::Cos(c(e)?),
            Expr::tg(e) => Lambda::Tg(c(e)?),
            Expr::arcsin(e) => Lambda::ArcSin(c(e)?),
            Expr::arccos(e) => Lambda::ArcCos(c(e)?),
            Expr::arctg(e) => Lambda::ArcTg(c(e)?),
        };
        Ok(lambda)
    }
}

impl Lambda {
    #[inline(always)]
    pub fn eval(&self, args: &[f64]) -> f64 {
        match self {
            Lambda::Var(i) => args[*i],
            Lambda::Const(v) => *v,
            Lambda::Add(a, b) => a.eval(args) + b.eval(args),
            Lambda::Sub(a, b) => a.eval(args) - b.eval(args),
            Lambda::Mul(a, b) => a.eval(args) * b.eval(args),
            Lambda::Div(a, b) => a.eval(args) / b.eval(args),
            Lambda::Pow(a, b) => a.eval(args).powf(b.eval(args)),
            Lambda::Exp(e) => e.eval(args).exp(),
            Lambda::Ln(e) => e.eval(args).ln(),
            Lambda::Sin(e) => e.eval(args).sin(),
            Lambda::Cos(e) => e.eval(args).cos(),
            Lambda::Tg(e) => e.eval(args).tan(),
            Lambda::ArcSin(e) => e.eval(args).asin(),
            Lambda::ArcCos(e) => e.eval(args).acos(),
            Lambda::ArcTg(e) => e.eval(args).atan(),
        }
    }

    /// Highest argument slot the evaluator reads, if any.
    pub fn max_slot(&self) -> Option<usize> {
        match self {
            Lambda::Var(i) => Some(*i),
            Lambda::Const(_) => None,
            Lambda::Add(a, b)
            | Lambda::Sub(a, b)
            | Lambda::Mul(a, b)
            | Lambda::Div(a, b)
            | Lambda::Pow(a, b) => a.max_slot().max(b.max_slot()),
            Lambda::Exp(e)
            | Lambda::Ln(e)
            | Lambda::Sin(e)
            | Lambda::Cos(e)
            | Lambda::Tg(e)
            | Lambda::ArcSin(e)
            | Lambda::ArcCos(e)
            | Lambda::ArcTg(e) => e.max_slot(),
        }
    }
}
